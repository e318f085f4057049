//! Process logging for the daemon.
//!
//! stdout carries protocol responses, so log output goes to stderr unless a
//! log directory is configured, in which case rotating files are used.
//! Events are `key=value` lines starting with `event=`. Passwords and student
//! names are never logged.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "komezad";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: Option<PathBuf>,
    _logger: LoggerHandle,
}

/// Starts the logger once per process. A second call with the same settings
/// is a no-op; different settings are rejected.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let level = normalize_level(level).map_err(anyhow::Error::msg)?;
    let log_dir = log_dir.map(Path::to_path_buf);

    let state = LOGGING_STATE.get_or_try_init(|| -> anyhow::Result<LoggingState> {
        let mut logger = Logger::try_with_str(level)?;
        logger = match log_dir.as_deref() {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                logger
                    .log_to_file(FileSpec::default().directory(dir).basename(LOG_FILE_BASENAME))
                    .rotate(
                        Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                        Naming::Numbers,
                        Cleanup::KeepLogFiles(MAX_LOG_FILES),
                    )
                    .write_mode(WriteMode::BufferAndFlush)
                    .append()
                    .format_for_files(flexi_logger::detailed_format)
            }
            None => logger
                .log_to_stderr()
                .format_for_stderr(flexi_logger::detailed_format),
        };
        let handle = logger.start()?;

        install_panic_hook();
        info!(
            "event=app_start module=core status=ok version={} level={} target={}",
            env!("CARGO_PKG_VERSION"),
            level,
            log_dir
                .as_ref()
                .map(|d| d.to_string_lossy().to_string())
                .unwrap_or_else(|| "stderr".to_string())
        );

        Ok(LoggingState {
            level,
            log_dir: log_dir.clone(),
            _logger: handle,
        })
    })?;

    if state.level != level || state.log_dir != log_dir {
        anyhow::bail!(
            "logging already initialized with level `{}`; refusing to reconfigure",
            state.level
        );
    }
    Ok(())
}

pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
