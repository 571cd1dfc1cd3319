mod common;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use relaygate_lib::directory;

/// Serves `body` as a single plain-HTTP response to the next connection
/// accepted on an ephemeral local port, returning that port.
fn serve_once(body: String) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
    });

    port
}

#[test]
fn fetches_and_ranks_a_live_served_directory() {
    let rows = vec![
        common::directory_row("low", "10.0.0.1", 10, "JP", "tcp", "10.0.0.1 443"),
        common::directory_row("high", "10.0.0.2", 90, "JP", "tcp", "10.0.0.2 443"),
        common::directory_row("us", "10.0.0.3", 100, "US", "tcp", "10.0.0.3 443"),
    ];
    let body = common::directory_csv(&rows);
    let port = serve_once(body);

    let relays = directory::fetch_and_rank(&format!("http://127.0.0.1:{port}/"), Some("JP"), None).expect("fetch succeeds");

    let hostnames: Vec<&str> = relays.iter().map(|r| r.hostname.as_str()).collect();
    assert_eq!(hostnames, vec!["high", "low"]);
}
