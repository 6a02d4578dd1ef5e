mod archive;
mod bank;
mod batch;
mod config;
mod error;
mod evaluate;
mod ipc;
mod report;
mod roster;

use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_logging(filter: &str) {
    // stdout carries IPC responses; logs go to stderr only.
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("feedbackd=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .init();
}

fn main() {
    let config = match config::Config::from_env() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("feedbackd: {e:#}");
            std::process::exit(2);
        }
    };
    init_logging(&config.log_filter);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        duplicate_policy = config.duplicate_policy.as_str(),
        "feedbackd ready"
    );

    let mut state = ipc::AppState { config };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
