//! Shared signals between the supervisor and its worker threads.
//!
//! Replaces what would otherwise be a global mutable `is_connected` flag and
//! a global event: both become explicit values threaded through to each
//! worker, scoped to a single Established attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A set-once-per-failure signal. `crossbeam_channel`'s bounded(1) queue
/// gives us "set" (try_send, idempotent once full), "wait with timeout"
/// (recv_timeout) and "clear" (the receive itself drains it) for free.
#[derive(Clone)]
pub struct ErrorSignal {
    tx: crossbeam_channel::Sender<()>,
    rx: crossbeam_channel::Receiver<()>,
}

impl ErrorSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        ErrorSignal { tx, rx }
    }

    /// Sets the signal. A second call before it is observed is a no-op --
    /// at most one error signal is delivered per Established session.
    pub fn set(&self) {
        let _ = self.tx.try_send(());
    }

    /// Blocks up to `timeout` for the signal. Returns `true` if it fired,
    /// draining it so the next Established cycle starts clean.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

impl Default for ErrorSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// `true` once the supervisor has torn down the current session; checked at
/// the top of every worker thread's loop so shutdown is prompt even mid-sleep.
#[derive(Clone)]
pub struct ConnectedFlag(Arc<AtomicBool>);

impl ConnectedFlag {
    pub fn new() -> Self {
        ConnectedFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for ConnectedFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_signal_fires_at_most_once_until_drained() {
        let sig = ErrorSignal::new();
        sig.set();
        sig.set(); // no-op, queue already full
        assert!(sig.wait(Duration::from_millis(10)));
        assert!(!sig.wait(Duration::from_millis(10)));
    }

    #[test]
    fn connected_flag_starts_true() {
        let flag = ConnectedFlag::new();
        assert!(flag.is_connected());
        flag.disconnect();
        assert!(!flag.is_connected());
    }
}
