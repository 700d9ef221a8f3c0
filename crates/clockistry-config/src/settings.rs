//! Validated settings structures

use crate::schema::RawConfig;
use clockistry_util::{data_dir_without_env, socket_path_without_env};
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single store call
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-client IPC budget (requests per second)
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 30;

const DATABASE_FILENAME: &str = "clockistry.db";

/// Validated settings ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceSettings,
    pub store: StoreSettings,
    pub timer: TimerSettings,
    pub ipc: IpcSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let service = ServiceSettings {
            socket_path: raw
                .service
                .socket_path
                .unwrap_or_else(socket_path_without_env),
            data_dir: raw.service.data_dir.unwrap_or_else(data_dir_without_env),
        };

        let store = StoreSettings {
            backend: raw
                .store
                .backend
                .as_deref()
                .and_then(StoreBackend::parse)
                .unwrap_or_default(),
            database_path: raw.store.database_path,
            io_timeout: raw
                .store
                .io_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_IO_TIMEOUT),
        };

        let timer = TimerSettings {
            start_guard: raw
                .timer
                .start_guard
                .as_deref()
                .and_then(StartGuard::parse)
                .unwrap_or_default(),
        };

        let ipc = IpcSettings {
            requests_per_second: raw
                .ipc
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
        };

        Self {
            service,
            store,
            timer,
            ipc,
        }
    }

    /// Database file, honouring an explicit `database_path` over `data_dir`
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| self.service.data_dir.join(DATABASE_FILENAME))
    }
}

/// Socket and directory locations
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            socket_path: socket_path_without_env(),
            data_dir: data_dir_without_env(),
        }
    }
}

/// Which document store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub database_path: Option<PathBuf>,
    pub io_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_path: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// How `start_timer` protects the one-running-timer-per-user slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartGuard {
    /// Single conditional write in the store; holds across processes
    #[default]
    Conditional,
    /// Query-then-write serialized per user inside this process
    PerUserLock,
    /// Plain query-then-write; concurrent starts can both succeed
    Unguarded,
}

impl StartGuard {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "conditional" => Some(Self::Conditional),
            "per_user_lock" => Some(Self::PerUserLock),
            "unguarded" => Some(Self::Unguarded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conditional => "conditional",
            Self::PerUserLock => "per_user_lock",
            Self::Unguarded => "unguarded",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimerSettings {
    pub start_guard: StartGuard,
}

#[derive(Debug, Clone)]
pub struct IpcSettings {
    pub requests_per_second: u32,
}

impl Default for IpcSettings {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_defaults_into_data_dir() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [service]
            data_dir = "/srv/clockistry"
            "#,
        )
        .unwrap();

        let settings = Settings::from_raw(raw);
        assert_eq!(
            settings.database_path(),
            PathBuf::from("/srv/clockistry/clockistry.db")
        );
        assert_eq!(settings.store.io_timeout, DEFAULT_IO_TIMEOUT);
        assert_eq!(settings.timer.start_guard, StartGuard::Conditional);
    }

    #[test]
    fn start_guard_names_round_trip() {
        for guard in [StartGuard::Conditional, StartGuard::PerUserLock, StartGuard::Unguarded] {
            assert_eq!(StartGuard::parse(guard.as_str()), Some(guard));
        }
        assert_eq!(StartGuard::parse("Per_User_Lock"), Some(StartGuard::PerUserLock));
    }
}
