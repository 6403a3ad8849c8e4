mod calc;
mod config;
mod db;
mod draft;
mod i18n;
mod ipc;
mod logging;
mod subjects;
mod tokens;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();
    logging::init(&cli.log).context("invalid log filter")?;
    let runtime = cli.runtime()?;

    let mut state = ipc::AppState::new(runtime);
    if let Some(path) = cli.workspace.as_deref() {
        ipc::select_workspace(&mut state, path)
            .with_context(|| format!("open workspace {}", path.display()))?;
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        public_url = %state.runtime.public_url,
        "edgraded ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed; shutting down");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparsable request line");
                json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
            }
        };

        writeln!(stdout, "{resp}").context("write response")?;
        stdout.flush().context("flush response")?;
    }
    Ok(())
}
