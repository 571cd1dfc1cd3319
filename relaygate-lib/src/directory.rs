//! Directory client: fetches the relay catalog CSV and ranks it.

use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// One row of the directory, after parsing and with the TCP port resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub hostname: String,
    pub ip: String,
    pub port: u16,
    pub score: Option<i64>,
    pub ping_ms: Option<i64>,
    pub speed_bps: Option<i64>,
    pub country: String,
    pub sessions: Option<i64>,
    pub uptime_secs: Option<i64>,
    pub operator: String,
}

impl Relay {
    pub fn host(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"remote \d{1,3}(?:\.\d{1,3}){3} (\d+)").expect("valid regex"))
}

/// Fetches the directory CSV, retrying forever on transport failure, then
/// parses, filters and ranks it.
pub fn fetch_and_rank(
    url: &str,
    country_filter: Option<&str>,
    port_filter: Option<u16>,
) -> Result<Vec<Relay>, Error> {
    let body = fetch_with_retry(url)?;
    Ok(rank(parse_csv(&body, country_filter, port_filter)))
}

fn fetch_with_retry(url: &str) -> Result<String, Error> {
    loop {
        match reqwest::blocking::get(url).and_then(|resp| resp.error_for_status()).and_then(|resp| resp.text()) {
            Ok(body) => return Ok(body),
            Err(e) => {
                tracing::warn!(error = %e, "directory fetch failed, retrying");
                thread::sleep(RETRY_DELAY);
            }
        }
    }
}

/// Parses the directory CSV body (two header rows, one terminal sentinel
/// row dropped) and applies the optional country/port filters. Does not
/// sort -- see [`rank`].
fn parse_csv(body: &str, country_filter: Option<&str>, port_filter: Option<u16>) -> Vec<Relay> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(body.as_bytes());

    let records: Vec<csv::StringRecord> = reader.records().filter_map(Result::ok).collect();
    let body_rows = if records.len() > 2 { &records[2..records.len() - 1] } else { &[] };

    let mut relays = Vec::new();
    for row in body_rows {
        let Some(relay) = parse_row(row) else { continue };
        if let Some(country) = country_filter {
            if relay.country != country {
                continue;
            }
        }
        if let Some(port) = port_filter {
            if relay.port != port {
                continue;
            }
        }
        relays.push(relay);
    }
    relays
}

fn parse_row(row: &csv::StringRecord) -> Option<Relay> {
    let field = |i: usize| row.get(i).unwrap_or("");

    let config_b64 = field(14);
    let port = match extract_tcp_port(config_b64) {
        Some(port) => port,
        None => {
            tracing::warn!(hostname = %field(0), "relay has no extractable TCP port, dropping");
            return None;
        }
    };

    Some(Relay {
        hostname: field(0).to_string(),
        ip: field(1).to_string(),
        port,
        score: parse_optional_int(field(2)),
        ping_ms: parse_optional_int(field(3)),
        speed_bps: parse_optional_int(field(4)),
        country: field(6).to_string(),
        sessions: parse_optional_int(field(7)),
        uptime_secs: parse_optional_int(field(8)),
        operator: field(12).to_string(),
    })
}

/// Base64-decodes an OpenVPN config blob and extracts its TCP port, if the
/// config uses `proto tcp` and carries a `remote <ip> <port>` directive.
fn extract_tcp_port(b64: &str) -> Option<u16> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(b64.trim()).ok()?;
    let text = String::from_utf8_lossy(&decoded);
    if !text.contains("proto tcp") {
        return None;
    }
    let caps = port_regex().captures(&text)?;
    caps.get(1)?.as_str().parse().ok()
}

/// A bare `-` denotes "unknown" and must parse as absent, never zero.
fn parse_optional_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if s == "-" || s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

/// Sorts by score descending, stable on ties. Relays with no score sort
/// last, grouped among themselves in their original relative order.
fn rank(mut relays: Vec<Relay>) -> Vec<Relay> {
    relays.sort_by(|a, b| b.score.cmp(&a.score));
    relays
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openvpn_config_b64(proto: &str, remote: &str) -> String {
        let config = format!("proto {proto}\nremote {remote}\n");
        base64::engine::general_purpose::STANDARD.encode(config)
    }

    fn csv_row(hostname: &str, ip: &str, score: &str, country: &str, config_b64: &str) -> String {
        // HostName,IP,Score,Ping,Speed,CountryLong,CountryShort,NumVpnSessions,
        // Uptime,TotalUsers,TotalTraffic,LogType,Operator,Message,OpenVPN_ConfigData_Base64
        format!(
            "{hostname},{ip},{score},12,100000,Japan,{country},3,999,1,1,none,OP,msg,{config_b64}"
        )
    }

    fn csv_body(rows: &[String]) -> String {
        let mut body = String::from("header1\nheader2\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        body.push_str("*\n");
        body
    }

    #[test]
    fn drops_relays_without_extractable_tcp_port() {
        let udp_cfg = openvpn_config_b64("udp", "10.0.0.1 1194");
        let body = csv_body(&[csv_row("host-a", "10.0.0.1", "100", "JP", &udp_cfg)]);
        let relays = parse_csv(&body, None, None);
        assert!(relays.is_empty());
    }

    #[test]
    fn parses_unknown_dash_fields_as_absent() {
        let tcp_cfg = openvpn_config_b64("tcp", "10.0.0.1 443");
        let row = format!(
            "host-a,10.0.0.1,-,-,-,Japan,JP,-,-,1,1,none,OP,msg,{tcp_cfg}"
        );
        let body = csv_body(&[row]);
        let relays = parse_csv(&body, None, None);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].score, None);
        assert_eq!(relays[0].ping_ms, None);
    }

    #[test]
    fn ranking_is_non_increasing_and_stable_on_ties() {
        let cfg = openvpn_config_b64("tcp", "10.0.0.1 443");
        let rows = vec![
            csv_row("a", "10.0.0.1", "50", "JP", &cfg),
            csv_row("b", "10.0.0.2", "90", "JP", &cfg),
            csv_row("c", "10.0.0.3", "90", "JP", &cfg),
        ];
        let body = csv_body(&rows);
        let ranked = rank(parse_csv(&body, None, None));
        let hostnames: Vec<&str> = ranked.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(hostnames, vec!["b", "c", "a"]);
    }

    #[test]
    fn applies_country_and_port_filters_by_strict_equality() {
        let cfg_jp = openvpn_config_b64("tcp", "10.0.0.1 443");
        let cfg_us = openvpn_config_b64("tcp", "10.0.0.2 1194");
        let rows = vec![
            csv_row("a", "10.0.0.1", "50", "JP", &cfg_jp),
            csv_row("b", "10.0.0.2", "90", "US", &cfg_us),
        ];
        let body = csv_body(&rows);
        let relays = parse_csv(&body, Some("JP"), None);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].hostname, "a");

        let relays = parse_csv(&body, None, Some(443));
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].hostname, "a");
    }

    #[test]
    fn drops_header_rows_and_terminal_sentinel() {
        let cfg = openvpn_config_b64("tcp", "10.0.0.1 443");
        let body = csv_body(&[csv_row("a", "10.0.0.1", "50", "JP", &cfg)]);
        assert_eq!(body.lines().count(), 4); // 2 header + 1 data + sentinel
        let relays = parse_csv(&body, None, None);
        assert_eq!(relays.len(), 1);
    }
}
