mod backup;
mod calc;
mod config;
mod db;
mod ipc;
mod logging;
mod provider;
mod record;
mod sheet;

use std::io::{self, BufRead, Write};

fn main() {
    let config = config::Config::from_env();
    logging::init_logging(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resultd starting");

    let mut state = ipc::AppState::new(config.export_file_name.clone());
    if let Some(path) = config.workspace.as_ref() {
        // A bad configured workspace must not stop the sidecar; the host can
        // still select one.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::warn!(
                workspace = %path.display(),
                error = %e,
                "could not open configured workspace"
            );
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                // No id to echo back.
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

    tracing::info!("resultd exiting");
}
