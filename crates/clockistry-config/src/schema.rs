//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Socket and directory locations
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Document store backend
    #[serde(default)]
    pub store: RawStoreConfig,

    /// Timer lifecycle behaviour
    #[serde(default)]
    pub timer: RawTimerConfig,

    /// IPC limits
    #[serde(default)]
    pub ipc: RawIpcConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the SQLite database
    pub data_dir: Option<PathBuf>,
}

/// Store settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStoreConfig {
    /// "sqlite" (default) or "memory"
    pub backend: Option<String>,

    /// Explicit database file; defaults to `<data_dir>/clockistry.db`
    pub database_path: Option<PathBuf>,

    /// Upper bound on a single store call, in milliseconds
    pub io_timeout_ms: Option<u64>,
}

/// Timer settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTimerConfig {
    /// "conditional" (default), "per_user_lock" or "unguarded"
    pub start_guard: Option<String>,
}

/// IPC settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawIpcConfig {
    /// Per-client request budget
    pub requests_per_second: Option<u32>,
}
