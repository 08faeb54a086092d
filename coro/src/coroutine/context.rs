//! Execution context switching.
//!
//! This is the only place that manipulates stack pointers and registers
//! directly. Everything above it works on [`Context`] values and the
//! status of coroutine records.
//!
//! A suspended context is a stack pointer. The callee-saved registers (and
//! on x86_64 the SSE/x87 control words) are spilled onto the suspended
//! stack itself, so switching is: push registers, store `sp` into `from`,
//! load `sp` from `to`, pop registers, return.
//!
//! A fresh context is a stack primed with the frame [`switch`] expects to
//! pop, whose return address is a small trampoline that moves the entry
//! argument into the first argument register and calls the entry function.

use super::stack::Stack;

use std::ffi::c_void;
use std::ptr;

/// Function a fresh context starts in. It must never return.
pub(crate) type Entry = extern "C" fn(*mut c_void) -> !;

/// A saved execution context.
#[repr(transparent)]
pub(crate) struct Context {
    sp: *mut u8,
}

impl Context {
    /// A context with nothing saved in it yet.
    ///
    /// Switching *from* an empty context fills it; switching *to* one is
    /// undefined behavior.
    pub(crate) const fn empty() -> Self {
        Self {
            sp: ptr::null_mut(),
        }
    }

    /// Primes `stack` so that the first switch into the returned context
    /// calls `entry(arg)` on that stack.
    ///
    /// # Safety
    ///
    /// `stack` must outlive every switch into the returned context, and
    /// `arg` must be valid for whatever `entry` does with it.
    pub(crate) unsafe fn prepare(stack: &Stack, entry: Entry, arg: *mut c_void) -> Self {
        unsafe { arch::prepare(stack.top(), entry, arg) }
    }
}

/// Saves the running context into `from` and resumes `to`.
///
/// Returns when some later switch resumes `from`.
///
/// # Safety
///
/// `from` must be valid for writes and `to` must hold a context that was
/// either prepared or saved by a previous switch and not resumed since.
/// Nothing borrowed across the call may be invalidated by the code that
/// runs on the other side.
#[inline(always)]
pub(crate) unsafe fn switch(from: *mut Context, to: *const Context) {
    unsafe { arch::switch(from, to) }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::{Context, Entry};

    use std::arch::naked_asm;
    use std::ffi::c_void;

    /// MXCSR with all exceptions masked, round-to-nearest.
    const MXCSR_DEFAULT: u64 = 0x1f80;

    /// x87 control word: extended precision, all exceptions masked.
    const FPCW_DEFAULT: u64 = 0x037f;

    #[unsafe(naked)]
    pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
        naked_asm!(
            "push rbp",
            "push rbx",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            "sub rsp, 8",
            "stmxcsr dword ptr [rsp]",
            "fnstcw word ptr [rsp + 4]",
            "mov [rdi], rsp",
            "mov rsp, [rsi]",
            "ldmxcsr dword ptr [rsp]",
            "fldcw word ptr [rsp + 4]",
            "add rsp, 8",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop rbx",
            "pop rbp",
            "ret",
        )
    }

    /// First code a fresh context runs: `entry(arg)` with r13 = entry, r12 = arg.
    #[unsafe(naked)]
    unsafe extern "C" fn trampoline() {
        naked_asm!("mov rdi, r12", "call r13", "ud2")
    }

    pub(super) unsafe fn prepare(top: *mut u8, entry: Entry, arg: *mut c_void) -> Context {
        // `top` is page aligned. The return slot sits so that after `ret`
        // pops it, rsp is 16-byte aligned again, as `call` requires.
        unsafe {
            let ret_slot = top.sub(24);
            let sp = ret_slot.sub(7 * 8);
            let frame = sp as *mut u64;

            frame.write(MXCSR_DEFAULT | (FPCW_DEFAULT << 32));
            frame.add(1).write(0); // r15
            frame.add(2).write(0); // r14
            frame.add(3).write(entry as usize as u64); // r13
            frame.add(4).write(arg as usize as u64); // r12
            frame.add(5).write(0); // rbx
            frame.add(6).write(0); // rbp
            frame.add(7).write(trampoline as usize as u64);

            Context { sp }
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::{Context, Entry};

    use std::arch::naked_asm;
    use std::ffi::c_void;

    /// Bytes spilled per switch: x19-x30 and d8-d15.
    const FRAME_SIZE: usize = 160;

    #[unsafe(naked)]
    pub(super) unsafe extern "C" fn switch(_from: *mut Context, _to: *const Context) {
        naked_asm!(
            "sub sp, sp, #160",
            "stp x19, x20, [sp, #0]",
            "stp x21, x22, [sp, #16]",
            "stp x23, x24, [sp, #32]",
            "stp x25, x26, [sp, #48]",
            "stp x27, x28, [sp, #64]",
            "stp x29, x30, [sp, #80]",
            "stp d8, d9, [sp, #96]",
            "stp d10, d11, [sp, #112]",
            "stp d12, d13, [sp, #128]",
            "stp d14, d15, [sp, #144]",
            "mov x9, sp",
            "str x9, [x0]",
            "ldr x9, [x1]",
            "mov sp, x9",
            "ldp x19, x20, [sp, #0]",
            "ldp x21, x22, [sp, #16]",
            "ldp x23, x24, [sp, #32]",
            "ldp x25, x26, [sp, #48]",
            "ldp x27, x28, [sp, #64]",
            "ldp x29, x30, [sp, #80]",
            "ldp d8, d9, [sp, #96]",
            "ldp d10, d11, [sp, #112]",
            "ldp d12, d13, [sp, #128]",
            "ldp d14, d15, [sp, #144]",
            "add sp, sp, #160",
            "ret",
        )
    }

    /// First code a fresh context runs: `entry(arg)` with x20 = entry, x19 = arg.
    #[unsafe(naked)]
    unsafe extern "C" fn trampoline() {
        naked_asm!("mov x0, x19", "blr x20", "brk #1")
    }

    pub(super) unsafe fn prepare(top: *mut u8, entry: Entry, arg: *mut c_void) -> Context {
        unsafe {
            let sp = top.sub(FRAME_SIZE);
            let frame = sp as *mut u64;

            for slot in 0..FRAME_SIZE / 8 {
                frame.add(slot).write(0);
            }

            frame.write(arg as usize as u64); // x19
            frame.add(1).write(entry as usize as u64); // x20
            frame.add(11).write(trampoline as usize as u64); // x30

            Context { sp }
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("coro only supports x86_64 and aarch64");

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    thread_local! {
        static MAIN: Cell<*mut Context> = const { Cell::new(ptr::null_mut()) };
        static SIDE: Cell<*mut Context> = const { Cell::new(ptr::null_mut()) };
        static TRACE: Cell<u32> = const { Cell::new(0) };
    }

    extern "C" fn bounce(arg: *mut c_void) -> ! {
        let step = arg as u32;

        loop {
            TRACE.with(|t| t.set(t.get() * 10 + step));
            let (main, side) = (MAIN.with(Cell::get), SIDE.with(Cell::get));
            unsafe { switch(side, main) };
        }
    }

    #[test]
    fn switch_round_trips_between_stacks() {
        let stack = Stack::new(64 * 1024).unwrap();
        let mut main = Context::empty();
        let mut side = unsafe { Context::prepare(&stack, bounce, 7usize as *mut c_void) };

        MAIN.with(|c| c.set(&mut main));
        SIDE.with(|c| c.set(&mut side));

        for _ in 0..3 {
            unsafe { switch(&mut main, &side) };
        }

        assert_eq!(TRACE.with(Cell::get), 777);
    }

    #[test]
    fn floating_point_survives_a_switch() {
        extern "C" fn compute(_: *mut c_void) -> ! {
            let x = std::hint::black_box(1.5f64);
            TRACE.with(|t| t.set((x * 4.0) as u32));
            let (main, side) = (MAIN.with(Cell::get), SIDE.with(Cell::get));
            unsafe { switch(side, main) };
            unreachable!();
        }

        let stack = Stack::new(64 * 1024).unwrap();
        let mut main = Context::empty();
        let mut side = unsafe { Context::prepare(&stack, compute, ptr::null_mut()) };

        MAIN.with(|c| c.set(&mut main));
        SIDE.with(|c| c.set(&mut side));

        let before = std::hint::black_box(2.25f64);
        unsafe { switch(&mut main, &side) };

        assert_eq!(before * 2.0, 4.5);
        assert_eq!(TRACE.with(Cell::get), 6);
    }
}
