//! The connectivity probe (H): independent HTTP trace + DNS checks, each
//! producing a dated, append-only log record. Shared between the `probe`
//! binary's two worker threads.

use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::logging::now_tokyo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckCode {
    Ok = 0,
    Exception = 1,
    ParseFail = 2,
    BadStatus = 3,
}

impl CheckCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

fn ip_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^ip=(\S+)").expect("valid regex"))
}

/// GETs `url` and reports the CDN trace's `ip=` line and round-trip time,
/// or a failure code per §4.H.
pub fn web_check(url: &str, timeout: Duration) -> (CheckCode, String) {
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => return (CheckCode::Exception, e.to_string()),
    };

    let start = Instant::now();
    let resp = match client.get(url).send() {
        Ok(r) => r,
        Err(e) => return (CheckCode::Exception, e.to_string()),
    };

    if resp.status().as_u16() != 200 {
        return (CheckCode::BadStatus, resp.status().as_u16().to_string());
    }

    let body = match resp.text() {
        Ok(b) => b,
        Err(e) => return (CheckCode::Exception, e.to_string()),
    };
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match ip_line_regex().captures(&body) {
        Some(caps) => (CheckCode::Ok, format!("{}; {:.3}", &caps[1], elapsed_ms)),
        None => (CheckCode::ParseFail, "Parse error".to_string()),
    }
}

/// Resolves `domain`'s A records against `nameservers`, reporting the
/// addresses and round-trip time, or a failure code per §4.H.
pub fn dns_check(domain: &str, nameservers: &[&str], timeout: Duration) -> (CheckCode, String) {
    use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
    use hickory_resolver::Resolver;
    use std::net::SocketAddr;

    let mut config = ResolverConfig::new();
    for ns in nameservers {
        let Ok(addr) = format!("{ns}:53").parse::<SocketAddr>() else {
            return (CheckCode::Exception, format!("invalid nameserver address: {ns}"));
        };
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
    }
    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;

    let resolver = match Resolver::new(config, opts) {
        Ok(r) => r,
        Err(e) => return (CheckCode::Exception, e.to_string()),
    };

    let start = Instant::now();
    match resolver.lookup_ip(domain) {
        Ok(lookup) => {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            let addrs: Vec<String> = lookup.iter().map(|ip| ip.to_string()).collect();
            (CheckCode::Ok, format!("{}; {:.3}", addrs.join(", "), elapsed_ms))
        }
        Err(e) => (CheckCode::Exception, e.to_string()),
    }
}

/// Appends one record to `check_log/<channel>-YYYY-MM-DD.txt` and prints it
/// to stdout. The file's date is always today's Asia/Tokyo date.
pub struct ProbeLog {
    dir: PathBuf,
}

impl ProbeLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ProbeLog { dir: dir.into() }
    }

    pub fn record(&self, channel: &str, code: CheckCode, msg: &str) {
        let ts = now_tokyo().to_rfc3339();
        let line = format!("{ts}; {}; {msg}", code.as_u8());
        println!("[{channel}] {line}");

        let path = channel_log_path(&self.dir, channel);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create check_log directory");
                return;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(error = %e, "failed to write probe log");
                }
            }
            Err(e) => tracing::warn!(error = %e, path = ?path, "failed to open probe log"),
        }
    }
}

fn channel_log_path(dir: &Path, channel: &str) -> PathBuf {
    dir.join(format!("{channel}-{}.txt", now_tokyo().format("%Y-%m-%d")))
}
