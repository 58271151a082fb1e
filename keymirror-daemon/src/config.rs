//! Daemon configuration.
//!
//! Loaded from `~/.keymirror/config.yaml` (or an explicit path); a missing
//! file yields the defaults. Any field may be omitted. Environment variables
//! override the file:
//!
//! | Variable                     | Field              |
//! |------------------------------|--------------------|
//! | `KEYMIRROR_LOG_LEVEL`        | `log_level`        |
//! | `KEYMIRROR_MANIFESTS_DIR`    | `manifests_dir`    |
//! | `KEYMIRROR_STORE_DIR`        | `store_dir`        |
//! | `KEYMIRROR_POLL_INTERVAL_MS` | `poll_interval_ms` |
//! | `KEYMIRROR_REDIS_URL`        | `redis_url`        |
//!
//! With `redis_url` set the daemon mirrors into Redis; otherwise into the
//! file store under `store_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use keymirror_sync::SyncOptions;

use crate::error::{io_err, DaemonError};
use crate::paths;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MANAGED_ANNOTATION: &str = "keymirror.dev/managed";

/// Effective daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    pub manifests_dir: PathBuf,
    pub store_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// Annotation a manifest must carry to be mirrored.
    pub managed_annotation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

/// On-disk shape: every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    log_level: Option<String>,
    log_json: Option<bool>,
    manifests_dir: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    managed_annotation: Option<String>,
    redis_url: Option<String>,
}

impl DaemonConfig {
    /// Defaults rooted at `home`.
    pub fn defaults_at(home: &Path) -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            manifests_dir: paths::manifests_dir(home),
            store_dir: paths::store_dir(home),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            managed_annotation: DEFAULT_MANAGED_ANNOTATION.to_string(),
            redis_url: None,
        }
    }

    /// Load from `path` (default `<home>/.keymirror/config.yaml`) and apply
    /// overrides from `env`.
    pub fn load_at(
        home: &Path,
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DaemonError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| paths::config_path(home));
        let file = read_config_file(&path)?;

        let defaults = Self::defaults_at(home);
        let mut config = Self {
            log_level: file.log_level.unwrap_or(defaults.log_level),
            log_json: file.log_json.unwrap_or(defaults.log_json),
            manifests_dir: file.manifests_dir.unwrap_or(defaults.manifests_dir),
            store_dir: file.store_dir.unwrap_or(defaults.store_dir),
            poll_interval_ms: file.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            managed_annotation: file
                .managed_annotation
                .unwrap_or(defaults.managed_annotation),
            redis_url: file.redis_url.or(defaults.redis_url),
        };
        config.apply_env(env)?;

        if config.poll_interval_ms == 0 {
            return Err(DaemonError::Config {
                path,
                reason: "poll_interval_ms must be greater than zero".to_string(),
            });
        }
        if config.managed_annotation.trim().is_empty() {
            return Err(DaemonError::Config {
                path,
                reason: "managed_annotation must not be empty".to_string(),
            });
        }
        Ok(config)
    }

    /// `load_at` convenience wrapper using `dirs::home_dir()` and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, DaemonError> {
        let home = dirs::home_dir().ok_or(DaemonError::HomeNotFound)?;
        Self::load_at(&home, path, |var| std::env::var(var).ok())
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, DaemonError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            poll_interval: self.poll_interval(),
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), DaemonError> {
        if let Some(level) = env("KEYMIRROR_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dir) = env("KEYMIRROR_MANIFESTS_DIR") {
            self.manifests_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("KEYMIRROR_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(url) = env("KEYMIRROR_REDIS_URL") {
            self.redis_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        if let Some(raw) = env("KEYMIRROR_POLL_INTERVAL_MS") {
            self.poll_interval_ms = raw.trim().parse().map_err(|_| DaemonError::InvalidEnv {
                var: "KEYMIRROR_POLL_INTERVAL_MS",
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, DaemonError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ConfigFile::default());
        }
        Err(err) => return Err(io_err(path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| DaemonError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
