use std::fs;
use std::os::unix::fs::PermissionsExt;

use relaygate_lib::vpn_control::VpnControl;

/// Writes a fake `vpncmd` shell script that answers each subcommand with a
/// canned transcript, so `VpnControl` can be exercised against a real
/// subprocess without a live VPNGate session.
fn fake_vpncmd(dir: &std::path::Path) -> std::path::PathBuf {
    let script = dir.join("vpncmd");
    fs::write(
        &script,
        r#"#!/bin/sh
case "$4" in
  accountset) echo "The command completed successfully." ;;
  accountconnect) echo "The command completed successfully." ;;
  accountdisconnect) echo "The command completed successfully." ;;
  accountstatusget)
    echo "Session Status        |Connection Completed (Session Established)"
    echo "Outgoing Data Size     |1,000 bytes"
    echo "Incoming Data Size     |2,000 bytes"
    echo "The command completed successfully."
    ;;
esac
"#,
    )
    .expect("write fake vpncmd");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    script
}

#[test]
fn full_connect_and_status_cycle_against_a_real_subprocess() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = fake_vpncmd(dir.path());
    let vpn = VpnControl::new(script.to_string_lossy().into_owned());

    assert!(vpn.set("1.2.3.4:443").expect("set"));
    assert!(vpn.connect().expect("connect"));

    let (valid, value, raw) = vpn.status("Session Status").expect("status");
    assert!(valid);
    assert_eq!(value.as_deref(), Some("Connection Completed (Session Established)"));
    assert!(raw.contains("Outgoing Data Size"));

    assert!(vpn.disconnect().expect("disconnect"));
}
