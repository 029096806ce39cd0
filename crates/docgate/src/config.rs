//! Configuration for the docgate server

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main docgate configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission queue limits
    #[serde(default)]
    pub queue: QueueConfig,
    /// External program registry and execution limits
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Document storage layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Outcome history log
    #[serde(default)]
    pub history: HistoryConfig,
}

impl GateConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// API key required on the /api surface; absent disables the check
    #[serde(default)]
    pub api_key: Option<String>,
    /// Body limit for multipart uploads, bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Interval for the background inbox scan; absent disables it
    #[serde(default)]
    pub scan_interval_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            max_upload_size: default_max_upload_size(),
            scan_interval_secs: None,
        }
    }
}

/// Admission queue limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Concurrency limit; 1 keeps external programs globally serialized
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Pending-unit ceiling; submissions beyond it are rejected
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// External program registry and execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Root directory for per-client programs (`<dir>/<client>/<client>.py`)
    #[serde(default = "default_scripts_dir")]
    pub dir: PathBuf,
    /// Explicit client -> program path entries; win over the convention
    #[serde(default)]
    pub programs: HashMap<String, PathBuf>,
    /// Extensions the runner is allowed to execute
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
    /// Per-program timeout table, keyed by basename, in milliseconds
    #[serde(default)]
    pub timeouts_ms: HashMap<String, u64>,
    /// Fallback timeout for programs with no table entry
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Byte cap for captured stdout/stderr; excess output is dropped
    #[serde(default = "default_capture_limit")]
    pub capture_limit: usize,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_scripts_dir(),
            programs: HashMap::new(),
            supported_extensions: default_supported_extensions(),
            timeouts_ms: HashMap::new(),
            default_timeout_ms: default_timeout_ms(),
            capture_limit: default_capture_limit(),
        }
    }
}

impl ScriptsConfig {
    /// Timeout for a program basename, falling back to the default.
    pub fn timeout_for(&self, basename: &str) -> Duration {
        self.timeouts_ms
            .get(basename)
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(Duration::from_millis(self.default_timeout_ms))
    }
}

/// Document storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base working directory with one subdirectory per client
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Outcome history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    /// Records older than this are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            retention_days: default_retention_days(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8085
}
fn default_max_upload_size() -> usize {
    50 * 1024 * 1024 // 50MB
}
fn default_max_concurrent() -> usize {
    1
}
fn default_max_queue_size() -> usize {
    20
}
fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}
fn default_supported_extensions() -> Vec<String> {
    ["py", "sh", "bat", "cmd", "exe"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_timeout_ms() -> u64 {
    180_000 // 3 minutes
}
fn default_capture_limit() -> usize {
    20_000
}
fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_history_path() -> PathBuf {
    PathBuf::from("data/history.jsonl")
}
fn default_retention_days() -> i64 {
    30
}
fn default_prune_interval_secs() -> u64 {
    21_600 // 6 hours
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GateConfig::default();
        assert_eq!(config.queue.max_concurrent, 1);
        assert_eq!(config.queue.max_queue_size, 20);
        assert_eq!(config.scripts.capture_limit, 20_000);
        assert_eq!(
            config.scripts.timeout_for("anything.py"),
            Duration::from_millis(180_000)
        );
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [server]
            port = 9000
            api_key = "secret"

            [queue]
            max_queue_size = 5

            [scripts.timeouts_ms]
            "acmegas.py" = 60000
        "#;
        let config: GateConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.queue.max_queue_size, 5);
        assert_eq!(config.queue.max_concurrent, 1);
        assert_eq!(
            config.scripts.timeout_for("acmegas.py"),
            Duration::from_millis(60_000)
        );
        assert_eq!(
            config.scripts.timeout_for("other.py"),
            Duration::from_millis(180_000)
        );
    }
}
