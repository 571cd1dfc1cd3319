//! Liveness monitor (E): polls session status once per second while
//! Established, raising the error signal on the first non-established
//! outcome and then exiting -- it never polls again for that session.

use std::thread;
use std::time::Duration;

use crate::context::{ConnectedFlag, ErrorSignal};
use crate::vpn_control::{self, VpnControl, ESTABLISHED_VALUE};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the poll loop on the calling thread; callers spawn this on its own
/// `thread::spawn`. Returns once the session is no longer connected, either
/// because it raised the error signal itself or because the caller flipped
/// `connected` first (teardown already in progress).
pub fn run(vpn: &VpnControl, connected: &ConnectedFlag, error_signal: &ErrorSignal) {
    tracing::debug!("liveness monitor started");
    while connected.is_connected() {
        match vpn.status("Session Status") {
            Ok((true, Some(value), raw)) if value == ESTABLISHED_VALUE => {
                if let Some((out, inc)) = vpn_control::extract_throughput(&raw) {
                    tracing::info!(outgoing_bytes = out, incoming_bytes = inc, "session throughput");
                }
            }
            Ok((valid, value, _)) => {
                tracing::error!(valid, ?value, "liveness check failed, raising session error");
                error_signal.set();
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "liveness check command failed, raising session error");
                error_signal.set();
                return;
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    tracing::debug!("liveness monitor stopping, connection already torn down");
}

#[cfg(test)]
mod tests {
    use super::ESTABLISHED_VALUE;

    #[test]
    fn established_marker_matches_distilled_source_literal() {
        assert_eq!(ESTABLISHED_VALUE, "Connection Completed (Session Established)");
    }
}
