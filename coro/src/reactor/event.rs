/// Readiness of one registered descriptor, as reported by the poller.
///
/// Several kernel events for the same descriptor within one wait are
/// merged into a single `Readiness`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Readiness {
    /// Token the descriptor was registered with.
    pub(crate) token: u64,

    /// Readable, or the peer hung up, or an error is pending.
    pub(crate) readable: bool,

    /// Writable, or an error is pending.
    pub(crate) writable: bool,
}
