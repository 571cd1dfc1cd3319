//! Network configurator: NAT, routes and DHCP on the tunnel interface.
//!
//! Every bring-up operation here is fatal on failure (the caller should
//! treat an `Err` as "stop, clean up, exit non-zero") except `nat_remove`
//! and the `remove_*`/`flush_*` teardown steps, which only ever log a
//! warning -- reverting host state must never itself become a reason to
//! abort a cleanup in progress.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::error::Fatal;
use crate::process;

const DHCP_RETRY_DELAY: Duration = Duration::from_millis(500);
/// The VPNGate-assigned tunnel address is never accompanied by a usable
/// subnet mask in the DHCP offer; `/16` matches the distilled source's
/// hard-coded choice for this specific provider's addressing. See
/// DESIGN.md for why this is kept rather than parsed from the lease.
const TUNNEL_ADDR_PREFIX: &str = "/16";

#[derive(Clone, Debug)]
pub struct NetworkConfigurator {
    pub lan_cidr: String,
    pub upstream_iface: String,
    pub tun_iface: String,
    pub lease_path: PathBuf,
}

/// A DHCP lease: both fields are required, or the lease is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    pub fixed_address: String,
    pub router: String,
}

impl NetworkConfigurator {
    pub fn nat_install(&self) -> Result<(), Fatal> {
        let out = process::run(&[
            "iptables", "-t", "nat", "-A", "POSTROUTING", "-s", &self.lan_cidr, "-o", &self.tun_iface, "-j", "MASQUERADE",
        ])
        .map_err(|e| Fatal::new(e.to_string()))?;
        if !out.success() {
            return Err(Fatal::new(format!("iptables nat install failed: {}", out.stderr)));
        }
        Ok(())
    }

    pub fn nat_remove(&self) {
        match process::run(&[
            "iptables", "-t", "nat", "-D", "POSTROUTING", "-s", &self.lan_cidr, "-o", &self.tun_iface, "-j", "MASQUERADE",
        ]) {
            Ok(out) if !out.success() => tracing::warn!(stderr = %out.stderr, "iptables nat remove failed"),
            Err(e) => tracing::warn!(error = %e, "iptables nat remove failed"),
            Ok(_) => {}
        }
    }

    /// Runs `dhclient` against the tunnel interface and parses the lease
    /// file it writes. In `looping` mode, retries until both lease fields
    /// are present; otherwise returns `None` on the first incomplete lease.
    pub fn dhcp_acquire(&self, looping: bool) -> Option<Lease> {
        loop {
            if let Err(e) = fs::write(&self.lease_path, "") {
                tracing::warn!(error = %e, path = ?self.lease_path, "failed to truncate lease file");
                if !looping {
                    return None;
                }
                thread::sleep(DHCP_RETRY_DELAY);
                continue;
            }

            let lease_path_str = self.lease_path.to_string_lossy().into_owned();
            let out = match process::run(&[
                "dhclient", "-v", "-sf", "/bin/true", "-lf", &lease_path_str, &self.tun_iface,
            ]) {
                Ok(out) => out,
                Err(e) => {
                    tracing::error!(error = %e, "dhclient failed to spawn");
                    return None;
                }
            };
            if !out.success() {
                tracing::error!(stderr = %out.stderr, "dhclient exited non-zero");
                return None;
            }

            let lease_text = fs::read_to_string(&self.lease_path).unwrap_or_default();
            match parse_lease(&lease_text) {
                Some(lease) => return Some(lease),
                None => {
                    tracing::error!("dhcp lease missing fixed-address or routers");
                    if !looping {
                        return None;
                    }
                }
            }
        }
    }

    pub fn get_default_gw(&self) -> Result<String, Fatal> {
        let out = process::run(&["ip", "route", "show", "default", "dev", &self.upstream_iface])
            .map_err(|e| Fatal::new(e.to_string()))?;
        extract_default_via(&out.stdout).ok_or_else(|| {
            Fatal::new(format!("no default route found on {}", self.upstream_iface))
        })
    }

    pub fn add_host_route(&self, relay_ip: &str, via_gw: &str) -> Result<(), Fatal> {
        let out = process::run(&["ip", "route", "add", relay_ip, "via", via_gw, "dev", &self.upstream_iface])
            .map_err(|e| Fatal::new(e.to_string()))?;
        if !out.success() {
            return Err(Fatal::new(format!("ip route add (host route) failed: {}", out.stderr)));
        }
        Ok(())
    }

    pub fn add_tun_addr(&self, fixed_address: &str) -> Result<(), Fatal> {
        let cidr = format!("{fixed_address}{TUNNEL_ADDR_PREFIX}");
        let out = process::run(&["ip", "addr", "add", &cidr, "dev", &self.tun_iface]).map_err(|e| Fatal::new(e.to_string()))?;
        if !out.success() {
            return Err(Fatal::new(format!("ip addr add failed: {}", out.stderr)));
        }
        Ok(())
    }

    pub fn add_default_via_tun(&self, gateway: &str) -> Result<(), Fatal> {
        let out = process::run(&["ip", "route", "add", "default", "via", gateway, "dev", &self.tun_iface])
            .map_err(|e| Fatal::new(e.to_string()))?;
        if !out.success() {
            return Err(Fatal::new(format!("ip route add default failed: {}", out.stderr)));
        }
        Ok(())
    }

    /// Best-effort sanity check of the resulting WAN IP. Failures are
    /// logged only -- this step has no bearing on whether bring-up
    /// succeeded.
    pub fn wan_ip_sanity_check(&self) {
        match process::run(&["curl", "-s", "inet-ip.info"]) {
            Ok(out) if out.success() => tracing::info!(wan_ip = %out.stdout.trim(), "ip configuration ok"),
            Ok(out) => tracing::warn!(stderr = %out.stderr, "wan ip sanity check failed"),
            Err(e) => tracing::warn!(error = %e, "wan ip sanity check failed to run"),
        }
    }

    /// Removes the default route added over the tunnel interface. Never
    /// fatal -- errors are logged warnings.
    pub fn remove_default_route(&self) {
        match process::run(&["ip", "route", "del", "default", "dev", &self.tun_iface]) {
            Ok(out) if !out.success() => tracing::warn!(stderr = %out.stderr, "ip route del default failed"),
            Err(e) => tracing::warn!(error = %e, "ip route del default failed"),
            Ok(_) => {}
        }
    }

    /// Flushes the tunnel interface's addresses. Never fatal -- errors are
    /// logged warnings.
    pub fn flush_tun_addr(&self) {
        match process::run(&["ip", "addr", "flush", "dev", &self.tun_iface]) {
            Ok(out) if !out.success() => tracing::warn!(stderr = %out.stderr, "ip addr flush failed"),
            Err(e) => tracing::warn!(error = %e, "ip addr flush failed"),
            Ok(_) => {}
        }
    }

    /// Removes the host route to `relay_ip`. Never fatal -- errors are
    /// logged warnings.
    pub fn remove_host_route(&self, relay_ip: &str) {
        match process::run(&["ip", "route", "del", relay_ip]) {
            Ok(out) if !out.success() => tracing::warn!(stderr = %out.stderr, "ip route del failed"),
            Err(e) => tracing::warn!(error = %e, "ip route del failed"),
            Ok(_) => {}
        }
    }
}

fn extract_default_via(stdout: &str) -> Option<String> {
    let idx = stdout.find("default via ")?;
    let rest = &stdout[idx + "default via ".len()..];
    let ip: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if ip.is_empty() { None } else { Some(ip) }
}

/// Takes the *last* occurrence of each field, per the liveness of the lease
/// file (dhclient appends a new lease block on renewal).
fn parse_lease(text: &str) -> Option<Lease> {
    let fixed_address = last_captured(text, "fixed-address ")?;
    let router = last_captured(text, "option routers ")?;
    Some(Lease { fixed_address, router })
}

fn last_captured(text: &str, prefix: &str) -> Option<String> {
    text.match_indices(prefix)
        .last()
        .and_then(|(idx, _)| {
            let rest = &text[idx + prefix.len()..];
            let end = rest.find(';')?;
            Some(rest[..end].trim().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_default_via_gateway() {
        let stdout = "default via 192.168.0.1 dev eth0 \n";
        assert_eq!(extract_default_via(stdout).as_deref(), Some("192.168.0.1"));
    }

    #[test]
    fn missing_default_route_is_none() {
        assert_eq!(extract_default_via("RTNETLINK answers: error\n"), None);
    }

    #[test]
    fn lease_parsing_takes_last_occurrence() {
        let text = "lease {\n  fixed-address 10.1.2.2;\n  option routers 10.1.2.254;\n}\nlease {\n  fixed-address 10.1.2.3;\n  option routers 10.1.2.1;\n}\n";
        let lease = parse_lease(text).expect("lease present");
        assert_eq!(lease.fixed_address, "10.1.2.3");
        assert_eq!(lease.router, "10.1.2.1");
    }

    #[test]
    fn lease_missing_either_field_is_none() {
        let text = "lease {\n  fixed-address 10.1.2.3;\n}\n";
        assert_eq!(parse_lease(text), None);
    }
}
