//! Default paths for clockistryd components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/clockistry/clockistryd.sock` or `/tmp/clockistry-$USER/clockistryd.sock`
//! - Data: `$XDG_DATA_HOME/clockistry` or `~/.local/share/clockistry`
//! - Config: `$XDG_CONFIG_HOME/clockistry/config.toml` or `~/.config/clockistry/config.toml`

use std::path::PathBuf;

const SOCKET_FILENAME: &str = "clockistryd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "clockistry";

/// Default socket path.
///
/// `$XDG_RUNTIME_DIR/clockistry/clockistryd.sock`, falling back to
/// `/tmp/clockistry-$USER/clockistryd.sock`. The `CLOCKISTRY_SOCKET` override
/// is applied by the daemon's command line, not here.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Default data directory, without the `CLOCKISTRY_DATA_DIR` override.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
