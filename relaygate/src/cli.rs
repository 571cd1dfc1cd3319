use clap::Parser;

use std::path::PathBuf;

use relaygate_lib::config;

/// VPNGate relay gateway supervisor -- selects, connects and monitors a
/// community relay, failing over automatically on degradation.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = config::ENV_VAR, default_value = config::DEFAULT_PATH)]
    pub config_path: PathBuf,

    /// Enable verbose console log coloring (mirrors the `debug` config key)
    #[arg(long)]
    pub debug: bool,

    /// LAN CIDR to masquerade behind the tunnel (overrides config file)
    #[arg(long)]
    pub lan_cidr: Option<String>,

    /// Upstream (WAN-facing) interface (overrides config file)
    #[arg(long)]
    pub upstream_iface: Option<String>,

    /// Tunnel interface name (overrides config file)
    #[arg(long)]
    pub tun_iface: Option<String>,

    /// Restrict relay selection to this country code (overrides config file)
    #[arg(long)]
    pub country_filter: Option<String>,

    /// Restrict relay selection to this TCP port (overrides config file)
    #[arg(long)]
    pub port_filter: Option<u16>,

    /// Relay directory URL (overrides config file)
    #[arg(long)]
    pub directory_url: Option<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    /// Layers CLI overrides on top of the file/defaults-derived `Config`,
    /// the same precedence order the directory/netconfig modules assume.
    pub fn apply(&self, mut cfg: config::Config) -> config::Config {
        if self.debug {
            cfg.debug = true;
        }
        if let Some(v) = &self.lan_cidr {
            cfg.lan_cidr = v.clone();
        }
        if let Some(v) = &self.upstream_iface {
            cfg.upstream_iface = v.clone();
        }
        if let Some(v) = &self.tun_iface {
            cfg.tun_iface = v.clone();
        }
        if self.country_filter.is_some() {
            cfg.country_filter = self.country_filter.clone();
        }
        if self.port_filter.is_some() {
            cfg.port_filter = self.port_filter;
        }
        if let Some(v) = &self.directory_url {
            cfg.directory_url = v.clone();
        }
        cfg
    }
}
