//! The three user-visible log classes (log / status / error), each written
//! colored to stdout and mirrored uncolored to a daily rolling file. This
//! sits alongside `tracing` rather than replacing it: `tracing` carries the
//! low-level process/IO diagnostics an operator tunes with `RUST_LOG`; this
//! module carries the handful of state-machine-relevant lines an operator
//! always wants to see.

use chrono::{DateTime, FixedOffset, TimeZone};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const CURSOR_UP_CLEAR: &str = "\x1b[1A\x1b[2K";

/// Japan Standard Time has no DST, so a fixed UTC+9 offset is exact --
/// avoids pulling in a full tz database for a single, unchanging offset.
fn tokyo_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid fixed offset")
}

pub fn now_tokyo() -> DateTime<FixedOffset> {
    tokyo_offset().from_utc_datetime(&chrono::Utc::now().naive_utc())
}

pub struct RecordLog {
    log_dir: PathBuf,
    debug: bool,
    overwrite_active: AtomicBool,
}

impl RecordLog {
    pub fn new(log_dir: impl Into<PathBuf>, debug: bool) -> Self {
        RecordLog {
            log_dir: log_dir.into(),
            debug,
            overwrite_active: AtomicBool::new(false),
        }
    }

    pub fn log(&self, msg: &str) {
        self.overwrite_active.store(false, Ordering::SeqCst);
        if self.debug {
            println!("{GREEN}{msg}{RESET}");
        } else {
            println!("{msg}");
        }
        self.append(&format!("[{}] {msg}", now_tokyo().to_rfc3339()));
    }

    /// A throughput line that overwrites its own previous line, the way the
    /// distilled source's `is_overwrite_active` flag does.
    pub fn status(&self, msg: &str) {
        if self.overwrite_active.swap(true, Ordering::SeqCst) {
            print!("{CURSOR_UP_CLEAR}");
        }
        println!("{msg}");
        let _ = std::io::stdout().flush();
        self.append(&format!("[{}] {msg}", now_tokyo().to_rfc3339()));
    }

    pub fn error(&self, errtype: &str, errmsg: &str) {
        self.overwrite_active.store(false, Ordering::SeqCst);
        println!("{RED}{errtype}: {errmsg}{RESET}");
        self.append(&format!("[{}] ERROR {errtype}: {errmsg}", now_tokyo().to_rfc3339()));
    }

    fn append(&self, line: &str) {
        let path = daily_log_path(&self.log_dir, now_tokyo());
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create log directory");
                return;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(error = %e, "failed to write daily log");
                }
            }
            Err(e) => tracing::warn!(error = %e, path = ?path, "failed to open daily log"),
        }
    }
}

fn daily_log_path(log_dir: &Path, dt: DateTime<FixedOffset>) -> PathBuf {
    log_dir.join(format!("log-{}.txt", dt.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_log_path_uses_tokyo_date() {
        let dt = tokyo_offset().with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let path = daily_log_path(Path::new("log"), dt);
        assert_eq!(path, PathBuf::from("log/log-2026-01-02.txt"));
    }

    #[test]
    fn log_appends_a_line_to_the_daily_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let record_log = RecordLog::new(dir.path(), false);
        record_log.log("hello world");

        let today = now_tokyo();
        let path = daily_log_path(dir.path(), today);
        let content = std::fs::read_to_string(path).expect("log file written");
        assert!(content.contains("hello world"));
    }
}
