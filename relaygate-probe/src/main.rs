use std::thread;
use std::time::Duration;

use relaygate_lib::probe::{self, ProbeLog};

mod cli;

const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one channel's check/sleep loop forever on the calling thread. The
/// web check's own HTTP timeout is the poll interval itself, matching the
/// grounding source's `requests.get(url, timeout=INTERVAL)`.
fn run_web(check_url: String, interval: Duration, log: ProbeLog) {
    loop {
        let (code, msg) = probe::web_check(&check_url, interval);
        log.record("web", code, &msg);
        thread::sleep(interval);
    }
}

fn run_dns(domain: String, nameserver: String, interval: Duration, log: ProbeLog) {
    loop {
        let (code, msg) = probe::dns_check(&domain, &[nameserver.as_str()], DNS_TIMEOUT);
        log.record("dns", code, &msg);
        thread::sleep(interval);
    }
}

fn main() {
    let args = cli::parse();

    tracing_subscriber::fmt::init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting {}", env!("CARGO_PKG_NAME"));

    let interval = args.interval();
    let web_log = ProbeLog::new(args.log_dir.clone());
    let dns_log = ProbeLog::new(args.log_dir.clone());

    let web_handle = {
        let url = args.check_url.clone();
        thread::spawn(move || run_web(url, interval, web_log))
    };
    let dns_handle = {
        let domain = args.dns_domain.clone();
        let nameserver = args.dns_nameserver.clone();
        thread::spawn(move || run_dns(domain, nameserver, interval, dns_log))
    };

    // Both loops run forever; a join only returns if a worker thread panics.
    let _ = web_handle.join();
    let _ = dns_handle.join();
}
