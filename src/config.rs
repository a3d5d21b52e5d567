//! Layered runtime configuration (§4.N), grounded on the teacher's
//! `CtfConfig`/`PluginConfig` shape: a TOML file, optionally overridden
//! by environment variables, then by explicit fields a collaborator/CLI
//! sets directly. Scoped to this core's own concerns rather than an
//! ingest destination.

use crate::error::ErrorKind;
use crate::types::{LogLevel, RetryDurationUs, SessionNotFoundAction};
use serde::Deserialize;
use std::env;
use std::path::Path;

pub const CONFIG_ENV_VAR: &str = "BABELTRACE_CORE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("environment variable '{0}' could not be parsed: {1}")]
    BadEnvVar(String, String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Read { .. } => ErrorKind::Io,
            Error::Parse { .. } => ErrorKind::InvalidArgument,
            Error::BadEnvVar(..) => ErrorKind::InvalidArgument,
        }
    }
}

/// The on-disk/TOML shape (`[core]` table), every field optional so a
/// partial file only overrides what it mentions.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct CoreFileConfig {
    retry_duration_us: Option<RetryDurationUs>,
    session_not_found_action: Option<SessionNotFoundAction>,
    mmap_window_packets: Option<u64>,
    log_level: Option<LogLevel>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct FileConfig {
    core: CoreFileConfig,
}

/// Fully-resolved runtime configuration (§4.N). Construct via
/// [`RuntimeConfig::load`], then apply explicit overrides with the
/// `with_*` builders (a collaborator/CLI's explicit flags always win).
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    pub retry_duration_us: RetryDurationUs,
    pub session_not_found_action: SessionNotFoundAction,
    pub mmap_window_packets: u64,
    pub log_level: LogLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            retry_duration_us: RetryDurationUs::default(),
            session_not_found_action: SessionNotFoundAction::default(),
            mmap_window_packets: 2048,
            log_level: LogLevel::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads from `config_path` if given, else from `$BABELTRACE_CORE_CONFIG`
    /// if set, else falls back to defaults — matching the teacher's
    /// `CtfConfig::load_merge_with_opts` precedence order.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Error> {
        let file_cfg = if let Some(path) = config_path {
            Some(Self::read_file(path)?)
        } else if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            Some(Self::read_file(Path::new(&env_path))?)
        } else {
            None
        };

        let mut cfg = Self::default();
        if let Some(file_cfg) = file_cfg {
            if let Some(v) = file_cfg.core.retry_duration_us {
                cfg.retry_duration_us = v;
            }
            if let Some(v) = file_cfg.core.session_not_found_action {
                cfg.session_not_found_action = v;
            }
            if let Some(v) = file_cfg.core.mmap_window_packets {
                cfg.mmap_window_packets = v;
            }
            if let Some(v) = file_cfg.core.log_level {
                cfg.log_level = v;
            }
        }
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<FileConfig, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_retry_duration_us(mut self, v: RetryDurationUs) -> Self {
        self.retry_duration_us = v;
        self
    }

    pub fn with_session_not_found_action(mut self, v: SessionNotFoundAction) -> Self {
        self.session_not_found_action = v;
        self
    }

    pub fn with_mmap_window_packets(mut self, v: u64) -> Self {
        self.mmap_window_packets = v;
        self
    }

    pub fn with_log_level(mut self, v: LogLevel) -> Self {
        self.log_level = v;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
[core]
retry-duration-us = 250000
session-not-found-action = "end"
mmap-window-packets = 4096
log-level = "debug"
"#;

    #[test]
    fn loads_and_overrides_defaults_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        let mut f = File::create(&path).unwrap();
        f.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();
        f.flush().unwrap();

        let cfg = RuntimeConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.retry_duration_us, RetryDurationUs(250000));
        assert_eq!(cfg.session_not_found_action, SessionNotFoundAction::End);
        assert_eq!(cfg.mmap_window_packets, 4096);
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn loads_from_env_var_when_no_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        let mut f = File::create(&path).unwrap();
        f.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();
        f.flush().unwrap();

        env::set_var(CONFIG_ENV_VAR, &path);
        let cfg = RuntimeConfig::load(None).unwrap();
        env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(cfg.mmap_window_packets, 4096);
    }

    #[test]
    fn defaults_when_nothing_provided() {
        let cfg = RuntimeConfig::load(None).unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn explicit_builder_overrides_file_value() {
        let cfg = RuntimeConfig::default().with_mmap_window_packets(99);
        assert_eq!(cfg.mmap_window_packets, 99);
    }
}
