use base64::Engine;

/// Builds a synthetic `vpncmd` success transcript with one `key | value`
/// line, mirroring the real CLI's tabular output.
pub fn vpncmd_transcript(key: &str, value: &str) -> String {
    format!("Command Name  |AccountStatusGet\n{key}        |{value}\nThe command completed successfully.\n")
}

/// Builds a synthetic VPNGate directory CSV body: two header rows, the
/// given data rows, and the terminal sentinel row.
pub fn directory_csv(rows: &[String]) -> String {
    let mut body = String::from("header1\nheader2\n");
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    body.push_str("*\n");
    body
}

/// One CSV data row with a base64-encoded OpenVPN config carrying the given
/// protocol and `remote` directive.
pub fn directory_row(hostname: &str, ip: &str, score: i64, country: &str, proto: &str, remote: &str) -> String {
    let config = format!("proto {proto}\nremote {remote}\n");
    let config_b64 = base64::engine::general_purpose::STANDARD.encode(config);
    format!("{hostname},{ip},{score},12,100000,Japan,{country},3,999,1,1,none,OP,msg,{config_b64}")
}
