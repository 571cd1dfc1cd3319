use clap::Parser;

use std::time::Duration;

const DEFAULT_CHECK_URL: &str = "http://104.16.132.229/cdn-cgi/trace";
const DEFAULT_DNS_DOMAIN: &str = "www.google.com";
const DEFAULT_DNS_NAMESERVER: &str = "1.1.1.1";
const DEFAULT_INTERVAL_SECS: u64 = 5;
const DEFAULT_LOG_DIR: &str = "check_log";

/// Standalone connectivity probe: periodically exercises a web and a DNS
/// path independently of the supervisor, logging each outcome.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// URL polled for the web channel
    #[arg(long, default_value = DEFAULT_CHECK_URL)]
    pub check_url: String,

    /// Domain resolved for the dns channel
    #[arg(long, default_value = DEFAULT_DNS_DOMAIN)]
    pub dns_domain: String,

    /// Nameserver queried for the dns channel
    #[arg(long, default_value = DEFAULT_DNS_NAMESERVER)]
    pub dns_nameserver: String,

    /// Seconds between checks on each channel
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Directory check records are appended to
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: String,
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_probe_targets() -> anyhow::Result<()> {
        let args = Cli::try_parse_from(["relaygate-probe"])?;
        assert_eq!(args.check_url, DEFAULT_CHECK_URL);
        assert_eq!(args.dns_domain, DEFAULT_DNS_DOMAIN);
        assert_eq!(args.dns_nameserver, DEFAULT_DNS_NAMESERVER);
        assert_eq!(args.interval(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn interval_override_is_honored() -> anyhow::Result<()> {
        let args = Cli::try_parse_from(["relaygate-probe", "--interval-secs", "15"])?;
        assert_eq!(args.interval(), Duration::from_secs(15));
        Ok(())
    }
}
