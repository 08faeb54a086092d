use std::io;
use std::ptr;

/// A coroutine stack: an anonymous private mapping with a guard page.
///
/// The lowest page of the mapping is made inaccessible, so running off the
/// end of the stack faults instead of silently corrupting a neighbor. The
/// usable region is everything above it; stacks grow down from [`top`].
///
/// [`top`]: Stack::top
pub(crate) struct Stack {
    base: *mut u8,
    len: usize,
    page: usize,
}

impl Stack {
    /// Maps a stack with at least `size` usable bytes.
    ///
    /// `size` is rounded up to whole pages; one extra page is mapped for
    /// the guard.
    pub(crate) fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        let usable = size.max(1).div_ceil(page) * page;
        let len = usable + page;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_FLAGS,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let stack = Stack {
            base: base.cast(),
            len,
            page,
        };

        if unsafe { libc::mprotect(base, page, libc::PROT_NONE) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(stack)
    }

    /// Highest address of the stack, page aligned.
    pub(crate) fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.len) }
    }

    /// Usable bytes, excluding the guard page.
    pub(crate) fn size(&self) -> usize {
        self.len - self.page
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.cast(), self.len) };
        debug_assert_eq!(rc, 0, "munmap failed: {}", io::Error::last_os_error());
    }
}

#[cfg(target_os = "linux")]
const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK;

#[cfg(not(target_os = "linux"))]
const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

fn page_size() -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 { page as usize } else { 4096 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_rounds_up_to_pages() {
        let page = page_size();
        let stack = Stack::new(page + 1).unwrap();

        assert_eq!(stack.size(), 2 * page);
        assert_eq!(stack.top() as usize % page, 0);
    }

    #[test]
    fn usable_region_is_writable() {
        let stack = Stack::new(16 * 1024).unwrap();
        let bottom = unsafe { stack.top().sub(stack.size()) };

        unsafe {
            bottom.write(0xAB);
            stack.top().sub(1).write(0xCD);
            assert_eq!(bottom.read(), 0xAB);
        }
    }
}
