//! The supervisor state machine: select a relay, bring up the tunnel,
//! configure routing, monitor liveness, and fail over on degradation.

use std::thread;
use std::time::Duration;

use relaygate_lib::config::Config;
use relaygate_lib::context::{ConnectedFlag, ErrorSignal};
use relaygate_lib::directory::{self, Relay};
use relaygate_lib::logging::RecordLog;
use relaygate_lib::netconfig::NetworkConfigurator;
use relaygate_lib::state::{Blacklist, Ledger, SessionState, Step};
use relaygate_lib::vpn_control::{VpnControl, ESTABLISHED_VALUE};
use relaygate_lib::{dhcp_refresher, monitor, Fatal};

/// Session establishment is retried at this interval, up to
/// `CONNECT_MAX_ATTEMPTS` times, before the relay is given up on.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_MAX_ATTEMPTS: u64 = 5;
/// `wait_until`'s wall-clock budget for `CONNECT_MAX_ATTEMPTS` polls at
/// `CONNECT_POLL_INTERVAL`: it checks once before ever sleeping, so the
/// budget is one interval short of the full attempt count.
const CONNECT_TIMEOUT: Duration = Duration::from_secs((CONNECT_MAX_ATTEMPTS - 1) * CONNECT_POLL_INTERVAL.as_secs());
/// Backoff between relay-selection attempts when the directory has nothing
/// eligible left to offer.
const SELECT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// How long the error-signal wait blocks per iteration; short enough that
/// shutdown requests are noticed promptly.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Supervisor {
    config: Config,
    vpn: VpnControl,
    netconfig: NetworkConfigurator,
    log: RecordLog,
    blacklist: Blacklist,
    state: SessionState,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let vpn = VpnControl::new(config.vpncmd_binary.clone());
        let netconfig = NetworkConfigurator {
            lan_cidr: config.lan_cidr.clone(),
            upstream_iface: config.upstream_iface.clone(),
            tun_iface: config.tun_iface.clone(),
            lease_path: config.lease_path.clone(),
        };
        let log = RecordLog::new(config.log_dir.clone(), config.debug);

        Supervisor {
            config,
            vpn,
            netconfig,
            log,
            blacklist: Blacklist::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs until `shutdown` fires, failing over between relays as needed.
    /// NAT is installed once here, for the whole process lifetime, and
    /// removed only when this loop returns -- failover between relays
    /// leaves it in place. Returns once a clean shutdown has been handled,
    /// or once a host mutation could not be undone (`SessionState::Fatal`).
    pub fn run(&mut self, shutdown: &crossbeam_channel::Receiver<()>) {
        self.state = SessionState::Idle;
        if let Err(e) = self.netconfig.nat_install() {
            self.log.error("fatal", &e.0);
            self.state = SessionState::Fatal;
            return;
        }

        loop {
            if shutdown.try_recv().is_ok() {
                self.log.status("shutdown requested, exiting");
                self.netconfig.nat_remove();
                return;
            }

            match self.cycle(shutdown) {
                Cycle::ShuttingDown => {
                    self.netconfig.nat_remove();
                    return;
                }
                Cycle::FailedOver => continue,
                Cycle::Fatal(e) => {
                    self.log.error("fatal", &e.0);
                    self.netconfig.nat_remove();
                    self.state = SessionState::Fatal;
                    return;
                }
            }
        }
    }

    /// One full select -> connect -> establish -> monitor -> teardown pass.
    fn cycle(&mut self, shutdown: &crossbeam_channel::Receiver<()>) -> Cycle {
        self.state = SessionState::Selecting;
        let relay = match self.select_relay(shutdown) {
            Some(relay) => relay,
            None => return Cycle::ShuttingDown,
        };
        // Blacklisted immediately on selection, before the first connect
        // attempt: a crash or fatal error mid-establish must never leave
        // this relay eligible for re-selection next cycle.
        self.blacklist.insert(relay.ip.clone());

        self.state = SessionState::Connecting;
        if !self.connect(&relay) {
            self.log.status(&format!("relay {} did not establish, trying next", relay.host()));
            let _ = self.vpn.disconnect();
            return Cycle::FailedOver;
        }

        self.state = SessionState::EstablishingRoutes { relay_ip: relay.ip.clone() };
        let mut ledger = Ledger::new();
        let established = match self.establish_routes(&relay, &mut ledger) {
            Ok(established) => established,
            Err(fatal) => {
                self.revert_routes(&ledger);
                let _ = self.vpn.disconnect();
                return Cycle::Fatal(fatal);
            }
        };

        self.blacklist.reset_to(&relay.ip);
        self.state = SessionState::Established {
            relay_ip: relay.ip.clone(),
            assigned_ip: established.assigned_ip,
            gateway_ip: established.gateway_ip,
        };
        self.log.log(&format!("established via {}", relay.host()));

        let connected = ConnectedFlag::new();
        let error_signal = ErrorSignal::new();

        let monitor_handle = {
            let vpn = VpnControl::new(self.config.vpncmd_binary.clone());
            let connected = connected.clone();
            let error_signal = error_signal.clone();
            thread::spawn(move || monitor::run(&vpn, &connected, &error_signal))
        };
        let dhcp_handle = {
            let netconfig = self.netconfig.clone();
            let connected = connected.clone();
            thread::spawn(move || dhcp_refresher::run(&netconfig, &connected))
        };

        let outcome = self.wait_for_degradation(shutdown, &error_signal);

        connected.disconnect();
        let _ = monitor_handle.join();
        let _ = dhcp_handle.join();

        self.state = SessionState::TearingDown;
        self.revert_routes(&ledger);
        let _ = self.vpn.disconnect();

        match outcome {
            WaitOutcome::Shutdown => Cycle::ShuttingDown,
            WaitOutcome::Degraded => {
                self.log.status(&format!("session on {} degraded, selecting a new relay", relay.host()));
                Cycle::FailedOver
            }
        }
    }

    fn select_relay(&mut self, shutdown: &crossbeam_channel::Receiver<()>) -> Option<Relay> {
        loop {
            if shutdown.try_recv().is_ok() {
                return None;
            }

            let relays = match directory::fetch_and_rank(
                &self.config.directory_url,
                self.config.country_filter.as_deref(),
                self.config.port_filter,
            ) {
                Ok(relays) => relays,
                Err(e) => {
                    self.log.error("directory", &e.to_string());
                    thread::sleep(SELECT_RETRY_DELAY);
                    continue;
                }
            };

            if let Some(relay) = relays.into_iter().find(|r| !self.blacklist.contains(&r.ip)) {
                self.log.log(&format!("selected relay {} (score unknown or ranked highest eligible)", relay.host()));
                return Some(relay);
            }

            self.log.status("no eligible relay in directory, retrying");
            thread::sleep(SELECT_RETRY_DELAY);
        }
    }

    /// Sets the account to `relay` and attempts to connect, polling session
    /// status at 1 s intervals up to [`CONNECT_MAX_ATTEMPTS`] times via
    /// `VpnControl::wait_until`. A `vpncmd` command failure or rejection is
    /// treated the same as a timeout: both just mean "try the next relay",
    /// nothing has mutated host state yet.
    fn connect(&self, relay: &Relay) -> bool {
        if !self.vpn.set(&relay.host()).unwrap_or(false) {
            return false;
        }
        if !self.vpn.connect().unwrap_or(false) {
            return false;
        }
        self.vpn
            .wait_until(
                |valid, value| valid && value == Some(ESTABLISHED_VALUE),
                Some(CONNECT_TIMEOUT),
                CONNECT_POLL_INTERVAL,
            )
            .unwrap_or(false)
    }

    /// Brings up routing for an already-established tunnel, pushing each
    /// completed host mutation to `ledger` as it goes so a failure partway
    /// through can be unwound precisely. Does not touch NAT: that is the
    /// supervisor's responsibility for the whole process lifetime.
    ///
    /// Order matches the grounding source's `ipconfig()`: DHCP lease first,
    /// then the upstream default-gateway lookup used only to route around
    /// it, then the host route, tunnel address and default-via-tunnel route.
    fn establish_routes(&self, relay: &Relay, ledger: &mut Ledger) -> Result<Established, Fatal> {
        let lease = self
            .netconfig
            .dhcp_acquire(true)
            .ok_or_else(|| Fatal::new("dhcp lease acquisition failed".to_string()))?;

        let upstream_gw = self.netconfig.get_default_gw()?;
        self.netconfig.add_host_route(&relay.ip, &upstream_gw)?;
        ledger.push(Step::HostRouteInstalled { relay_ip: relay.ip.clone() });

        self.netconfig.add_tun_addr(&lease.fixed_address)?;
        ledger.push(Step::TunAddrAssigned);

        self.netconfig.add_default_via_tun(&lease.router)?;
        ledger.push(Step::DefaultRouteInstalled);

        self.netconfig.wan_ip_sanity_check();

        Ok(Established {
            assigned_ip: lease.fixed_address,
            gateway_ip: lease.router,
        })
    }

    fn wait_for_degradation(&self, shutdown: &crossbeam_channel::Receiver<()>, error_signal: &ErrorSignal) -> WaitOutcome {
        loop {
            if shutdown.try_recv().is_ok() {
                return WaitOutcome::Shutdown;
            }
            if error_signal.wait(SIGNAL_POLL_INTERVAL) {
                return WaitOutcome::Degraded;
            }
        }
    }

    /// Walks `ledger` in reverse and undoes exactly the steps it records --
    /// nothing more. Safe to call on an empty ledger. NAT is never touched
    /// here -- it persists across failover.
    fn revert_routes(&self, ledger: &Ledger) {
        for step in ledger.rev() {
            match step {
                Step::DefaultRouteInstalled => self.netconfig.remove_default_route(),
                Step::TunAddrAssigned => self.netconfig.flush_tun_addr(),
                Step::HostRouteInstalled { relay_ip } => self.netconfig.remove_host_route(relay_ip),
            }
        }
    }
}

struct Established {
    assigned_ip: String,
    gateway_ip: String,
}

enum Cycle {
    ShuttingDown,
    FailedOver,
    Fatal(Fatal),
}

enum WaitOutcome {
    Shutdown,
    Degraded,
}
