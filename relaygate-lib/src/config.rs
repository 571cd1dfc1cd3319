//! Layered configuration: compiled-in defaults, optionally overridden by an
//! on-disk TOML file. CLI flags are layered on top of this by each binary's
//! own `cli` module, the same precedence order the teacher's config loader
//! uses for its own (larger) settings surface.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PATH: &str = "/etc/relaygate/config.toml";
pub const ENV_VAR: &str = "RELAYGATE_CONFIG";

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error reading `{path}`: {source}")]
    IO { path: PathBuf, source: std::io::Error },
    #[error("failed parsing `{path}`: {source}")]
    Toml { path: PathBuf, source: toml::de::Error },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub lan_cidr: String,
    pub upstream_iface: String,
    pub tun_iface: String,
    pub country_filter: Option<String>,
    pub port_filter: Option<u16>,
    pub directory_url: String,
    pub debug: bool,
    pub vpncmd_binary: String,
    pub lease_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lan_cidr: "192.168.19.0/24".to_string(),
            upstream_iface: "eth0".to_string(),
            tun_iface: "vpn_vpngate".to_string(),
            country_filter: Some("JP".to_string()),
            port_filter: None,
            directory_url: "https://www.vpngate.net/api/iphone/".to_string(),
            debug: false,
            vpncmd_binary: "vpncmd".to_string(),
            lease_path: PathBuf::from("lease.txt"),
            log_dir: PathBuf::from("log"),
        }
    }
}

/// Mirrors [`Config`] but every field is optional, so a TOML file only
/// needs to name the fields it overrides.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    lan_cidr: Option<String>,
    upstream_iface: Option<String>,
    tun_iface: Option<String>,
    country_filter: Option<String>,
    port_filter: Option<u16>,
    directory_url: Option<String>,
    debug: Option<bool>,
    vpncmd_binary: Option<String>,
    lease_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl Config {
    fn apply(mut self, partial: PartialConfig) -> Self {
        if let Some(v) = partial.lan_cidr {
            self.lan_cidr = v;
        }
        if let Some(v) = partial.upstream_iface {
            self.upstream_iface = v;
        }
        if let Some(v) = partial.tun_iface {
            self.tun_iface = v;
        }
        if partial.country_filter.is_some() {
            self.country_filter = partial.country_filter;
        }
        if partial.port_filter.is_some() {
            self.port_filter = partial.port_filter;
        }
        if let Some(v) = partial.directory_url {
            self.directory_url = v;
        }
        if let Some(v) = partial.debug {
            self.debug = v;
        }
        if let Some(v) = partial.vpncmd_binary {
            self.vpncmd_binary = v;
        }
        if let Some(v) = partial.lease_path {
            self.lease_path = v;
        }
        if let Some(v) = partial.log_dir {
            self.log_dir = v;
        }
        self
    }
}

/// Loads configuration: compiled defaults, overridden by `path` if it
/// exists. A missing file at `path` is not an error -- defaults apply.
pub fn read(path: &Path) -> Result<Config, Error> {
    let defaults = Config::default();

    match path.try_exists() {
        Ok(false) => {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(defaults);
        }
        Err(e) => return Err(Error::IO { path: path.to_path_buf(), source: e }),
        Ok(true) => {}
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::IO { path: path.to_path_buf(), source: e })?;
    let partial: PartialConfig = toml::from_str(&content).map_err(|e| Error::Toml { path: path.to_path_buf(), source: e })?;
    Ok(defaults.apply(partial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = read(Path::new("/nonexistent/relaygate-config-test.toml")).expect("defaults apply");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "lan_cidr = \"10.0.0.0/24\"\ndebug = true\n").expect("write");

        let cfg = read(&path).expect("parses");
        assert_eq!(cfg.lan_cidr, "10.0.0.0/24");
        assert!(cfg.debug);
        assert_eq!(cfg.upstream_iface, Config::default().upstream_iface);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml {{{").expect("write");
        assert!(matches!(read(&path), Err(Error::Toml { .. })));
    }
}
