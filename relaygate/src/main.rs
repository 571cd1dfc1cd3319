use ctrlc::Error as CtrlcError;
use std::process;

use relaygate_lib::config;

mod cli;
mod core;

fn ctrlc_channel() -> Result<crossbeam_channel::Receiver<()>, exitcode::ExitCode> {
    let (sender, receiver) = crossbeam_channel::bounded(2);
    match ctrlc::set_handler(move || match sender.send(()) {
        Ok(_) => (),
        Err(e) => {
            tracing::error!(error = ?e, "sending shutdown signal");
        }
    }) {
        Ok(_) => Ok(receiver),
        Err(CtrlcError::NoSuchSignal(signal_type)) => {
            tracing::error!(?signal_type, "no such signal");
            Err(exitcode::OSERR)
        }
        Err(CtrlcError::MultipleHandlers) => {
            tracing::error!("multiple handlers");
            Err(exitcode::UNAVAILABLE)
        }
        Err(CtrlcError::System(e)) => {
            tracing::error!(error = ?e, "system error");
            Err(exitcode::IOERR)
        }
    }
}

/// NAT, routing and DHCP bring-up all require root; fail fast with a clear
/// message rather than letting the first `iptables` call fail obscurely.
#[cfg(unix)]
fn require_root() -> Result<(), exitcode::ExitCode> {
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("must run as root to configure NAT, routing and DHCP");
        return Err(exitcode::NOPERM);
    }
    Ok(())
}

fn daemon(args: &cli::Cli) -> exitcode::ExitCode {
    if let Err(exit) = require_root() {
        return exit;
    }

    let ctrlc_receiver = match ctrlc_channel() {
        Ok(receiver) => receiver,
        Err(exit) => return exit,
    };

    let cfg = match config::read(&args.config_path) {
        Ok(cfg) => args.apply(cfg),
        Err(e) => {
            tracing::error!(error = ?e, "failed to read configuration");
            return exitcode::CONFIG;
        }
    };

    let mut supervisor = core::Supervisor::new(cfg);

    tracing::info!("entering supervision loop");
    supervisor.run(&ctrlc_receiver);

    if matches!(supervisor.state(), relaygate_lib::state::SessionState::Fatal) {
        exitcode::SOFTWARE
    } else {
        exitcode::OK
    }
}

fn main() {
    let args = cli::parse();

    tracing_subscriber::fmt::init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting {}", env!("CARGO_PKG_NAME"));

    let exit = daemon(&args);

    if exit != exitcode::OK {
        tracing::warn!("abnormal exit");
    }

    process::exit(exit)
}
