mod auth;
mod calc;
mod config;
mod db;
mod export;
mod ipc;
mod logging;
mod risk;
mod roster;
mod scope;
mod settings;

use log::{error, warn};
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("komezad: invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(cfg.log_level, cfg.log_dir.as_deref()) {
        eprintln!("komezad: logging disabled: {e:#}");
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            error!(
                "event=workspace_select module=core status=error path={} error={:#}",
                path.to_string_lossy(),
                e
            );
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut input = stdin.lock();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("event=stdin_read module=ipc status=error error={}", e);
                break;
            }
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        // Invalid UTF-8 is reported like any other malformed line.
        let req: ipc::Request = match serde_json::from_slice(&buf) {
            Ok(v) => v,
            Err(e) => {
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
