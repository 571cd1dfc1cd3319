//! Session state, relay blacklist and the host-mutation ledger.

use std::collections::HashSet;
use std::fmt;

/// The supervisor's top-level state. Transitions live in the supervisor
/// binary's `core` module; this type is the value they operate on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Selecting,
    Connecting,
    EstablishingRoutes { relay_ip: String },
    Established {
        relay_ip: String,
        /// The tunnel address DHCP assigned on the tunnel interface.
        assigned_ip: String,
        /// The tunnel's own gateway, from the same DHCP lease -- not the
        /// upstream WAN gateway used transiently for the host route.
        gateway_ip: String,
    },
    TearingDown,
    Fatal,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Selecting => write!(f, "selecting"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::EstablishingRoutes { relay_ip } => write!(f, "establishing-routes({relay_ip})"),
            SessionState::Established { relay_ip, .. } => write!(f, "established({relay_ip})"),
            SessionState::TearingDown => write!(f, "tearing-down"),
            SessionState::Fatal => write!(f, "fatal"),
        }
    }
}

/// Relay IPs the supervisor will not select again this process lifetime.
#[derive(Clone, Debug, Default)]
pub struct Blacklist(HashSet<String>);

impl Blacklist {
    pub fn new() -> Self {
        Blacklist(HashSet::new())
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.0.contains(ip)
    }

    pub fn insert(&mut self, ip: impl Into<String>) {
        self.0.insert(ip.into());
    }

    /// Clears every entry except `keep` -- used once a session is
    /// successfully established, so the relay currently in use stays
    /// excluded from re-selection after a later failure.
    pub fn reset_to(&mut self, keep: &str) {
        self.0.clear();
        self.0.insert(keep.to_string());
    }
}

/// One completed host-mutation step, pushed as bring-up progresses so
/// teardown can revert exactly what was installed, in reverse order.
///
/// NAT is not tracked here: it is installed once for the process lifetime
/// (see the supervisor's top-level `run` loop), not per relay attempt, so
/// its teardown is not part of the per-cycle ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    HostRouteInstalled { relay_ip: String },
    TunAddrAssigned,
    DefaultRouteInstalled,
}

/// The host-mutation ledger for the current bring-up attempt cycle.
#[derive(Clone, Debug, Default)]
pub struct Ledger(Vec<Step>);

impl Ledger {
    pub fn new() -> Self {
        Ledger(Vec::new())
    }

    pub fn push(&mut self, step: Step) {
        self.0.push(step);
    }

    /// Steps in reverse-installation order, for teardown.
    pub fn rev(&self) -> impl Iterator<Item = &Step> {
        self.0.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_reset_to_keeps_only_named_entry() {
        let mut bl = Blacklist::new();
        bl.insert("10.0.0.1");
        bl.insert("10.0.0.2");
        bl.reset_to("10.0.0.2");
        assert!(!bl.contains("10.0.0.1"));
        assert!(bl.contains("10.0.0.2"));
    }

    #[test]
    fn ledger_reverses_for_teardown() {
        let mut ledger = Ledger::new();
        ledger.push(Step::HostRouteInstalled { relay_ip: "1.2.3.4".into() });
        ledger.push(Step::TunAddrAssigned);
        ledger.push(Step::DefaultRouteInstalled);
        let steps: Vec<&Step> = ledger.rev().collect();
        assert_eq!(steps[0], &Step::DefaultRouteInstalled);
        assert_eq!(steps[2], &Step::HostRouteInstalled { relay_ip: "1.2.3.4".into() });
    }
}
