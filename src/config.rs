use crate::logging;
use anyhow::bail;
use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "KOMEZA_WORKSPACE";
pub const ENV_LOG_LEVEL: &str = "KOMEZA_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "KOMEZA_LOG_DIR";

/// Startup configuration. Runtime policy lives in the workspace `settings`
/// table instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_level = match non_empty(ENV_LOG_LEVEL) {
            Some(raw) => logging::normalize_level(&raw).map_err(anyhow::Error::msg)?,
            None => logging::default_log_level(),
        };

        let log_dir = non_empty(ENV_LOG_DIR).map(PathBuf::from);
        if let Some(dir) = &log_dir {
            if !dir.is_absolute() {
                bail!(
                    "{} must be an absolute path, got `{}`",
                    ENV_LOG_DIR,
                    dir.to_string_lossy()
                );
            }
        }

        Ok(Config {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_level,
            log_dir,
        })
    }
}
