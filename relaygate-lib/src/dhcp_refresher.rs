//! DHCP refresher (F): re-acquires the tunnel's DHCP lease every 300s while
//! Established. Purely advisory -- failures are logged, never escalated.

use std::thread;
use std::time::Duration;

use crate::context::ConnectedFlag;
use crate::netconfig::NetworkConfigurator;

const TICK: Duration = Duration::from_secs(1);
const REFRESH_EVERY_TICKS: u32 = 300;

/// Runs on its own thread until `connected` goes false. Ticks every second
/// so shutdown is prompt, but only acts on the 300th tick.
pub fn run(netconfig: &NetworkConfigurator, connected: &ConnectedFlag) {
    tracing::debug!("dhcp refresher started");
    let mut ticks = 0u32;
    while connected.is_connected() {
        thread::sleep(TICK);
        if !connected.is_connected() {
            break;
        }
        ticks += 1;
        if ticks >= REFRESH_EVERY_TICKS {
            ticks = 0;
            tracing::debug!("reobtaining dhcp lease");
            if netconfig.dhcp_acquire(false).is_none() {
                tracing::warn!("dhcp refresh failed, will retry next cycle");
            }
        }
    }
    tracing::debug!("dhcp refresher stopping");
}
