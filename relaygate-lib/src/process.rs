//! Command runner: the one place in the codebase that spawns a process.
//!
//! Never fails for a non-zero exit code -- the caller gets the full
//! `{exit, stdout, stderr}` triple and decides what a failure means. Only a
//! failure to spawn the child at all (missing binary, permission denied) is
//! surfaced as an `Error`.

use thiserror::Error;

use std::io;
use std::process::Command;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn `{argv0}`: {source}")]
    Spawn { argv0: String, source: io::Error },
}

/// Captured result of running an external command.
#[derive(Debug, Clone)]
pub struct Output {
    pub exit: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit == Some(0)
    }
}

/// Run `argv` to completion, capturing stdout/stderr with the platform's
/// default (lossy UTF-8) encoding. Logs the invocation at debug level and
/// the captured output at trace level.
pub fn run(argv: &[&str]) -> Result<Output, Error> {
    let Some((bin, args)) = argv.split_first() else {
        return Ok(Output {
            exit: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        });
    };

    tracing::debug!(argv = %argv.join(" "), "running command");

    let output = Command::new(bin).args(args).output().map_err(|source| Error::Spawn {
        argv0: bin.to_string(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    tracing::trace!(argv = %argv.join(" "), exit = ?output.status.code(), %stdout, %stderr, "command finished");

    Ok(Output {
        exit: output.status.code(),
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_success_exit() {
        let out = run(&["printf", "hello"]).expect("spawns");
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn never_errors_on_non_zero_exit() {
        let out = run(&["false"]).expect("spawns");
        assert!(!out.success());
        assert_eq!(out.exit, Some(1));
    }

    #[test]
    fn surfaces_spawn_failure_for_missing_binary() {
        let err = run(&["relaygate-definitely-not-a-real-binary"]).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
