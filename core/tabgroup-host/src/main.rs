//! Native-messaging host for the tab grouper.
//!
//! The browser launches this process when the extension connects and kills it
//! whenever it likes. Stdin and stdout carry length-prefixed JSON frames; all
//! browser APIs are reached through bridge calls answered by the extension.

use clap::Parser;
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info, warn};

use tabgroup_core::Coordinator;
use tabgroup_protocol::ActionResponse;

mod bridge;
mod config;
mod logging;

use bridge::{Bridge, Next};
use config::HostConfig;

#[derive(Parser, Debug)]
#[command(name = "tabgroup-host")]
#[command(about = "Native-messaging host that groups, tracks and auto-collapses browser tabs")]
#[command(version)]
struct Cli {
    /// Origin of the calling extension, passed by the browser
    origin: Option<String>,

    /// Config file (defaults to ~/.tabgroup/host.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for daily log files (defaults to ~/.tabgroup/logs)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Native window handle some browsers pass on Windows
    #[arg(long, hide = true)]
    parent_window: Option<i64>,
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.log_dir.clone());

    let config = match config::load_host_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load host config; using defaults");
            HostConfig::default()
        }
    };
    info!(origin = ?cli.origin, "Tab group host started");

    let (tx, rx) = mpsc::channel();
    bridge::spawn_reader(io::stdin(), tx);
    let bridge = Bridge::new(io::stdout(), rx, config.bridge.call_timeout());
    let mut coordinator = Coordinator::with_system_clock(bridge, config.coordinator_config());

    if let Err(err) = serve(&mut coordinator, config.bridge.idle_tick()) {
        error!(error = %err, "Tab group host stopped");
        std::process::exit(1);
    }
    info!("Extension disconnected; exiting");
}

/// Processes inbound frames one at a time until stdin closes. Deferred tasks
/// run after every item and on idle ticks.
fn serve<W: Write>(
    coordinator: &mut Coordinator<Bridge<W>>,
    idle_tick: Duration,
) -> Result<(), String> {
    coordinator.on_process_start();

    loop {
        match coordinator.host().next_inbound(idle_tick) {
            Next::Event(event) => coordinator.handle_event(event),
            Next::Action {
                request_id,
                message,
            } => {
                let response = coordinator.handle_message(message);
                respond(coordinator.host(), request_id, &response)?;
            }
            Next::Idle => {}
            Next::Closed => return Ok(()),
        }
        coordinator.run_due_tasks();
    }
}

fn respond<W: Write>(
    bridge: &Bridge<W>,
    request_id: u64,
    response: &ActionResponse,
) -> Result<(), String> {
    let body = serde_json::to_value(response)
        .map_err(|err| format!("Failed to serialize response: {}", err))?;

    match bridge.respond(request_id, body) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => {
            warn!(request_id, error = %err, "Response too large; sending error instead");
            let fallback: Value =
                serde_json::to_value(ActionResponse::failure("Response too large"))
                    .map_err(|err| format!("Failed to serialize response: {}", err))?;
            bridge
                .respond(request_id, fallback)
                .map_err(|err| format!("Failed to write response: {}", err))
        }
        Err(err) => Err(format!("Failed to write response: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_browser_origin_argument() {
        let cli =
            Cli::try_parse_from(["tabgroup-host", "chrome-extension://abcdef/"]).expect("parse");
        assert_eq!(cli.origin.as_deref(), Some("chrome-extension://abcdef/"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_accepts_windows_parent_window_flag() {
        let cli = Cli::try_parse_from([
            "tabgroup-host",
            "chrome-extension://abcdef/",
            "--parent-window=0",
        ])
        .expect("parse");
        assert_eq!(cli.parent_window, Some(0));
    }

    #[test]
    fn cli_accepts_config_and_log_dir() {
        let cli = Cli::try_parse_from([
            "tabgroup-host",
            "--config",
            "/tmp/host.toml",
            "--log-dir",
            "/tmp/logs",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/host.toml")));
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
    }
}
