//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::{StartGuard, StoreBackend};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Unknown store backend '{0}' (expected \"sqlite\" or \"memory\")")]
    UnknownBackend(String),

    #[error("Unknown start guard '{0}' (expected \"conditional\", \"per_user_lock\" or \"unguarded\")")]
    UnknownStartGuard(String),

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(backend) = &config.store.backend
        && StoreBackend::parse(backend).is_none()
    {
        errors.push(ValidationError::UnknownBackend(backend.clone()));
    }

    if config.store.io_timeout_ms == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "store.io_timeout_ms",
        });
    }

    if let Some(guard) = &config.timer.start_guard
        && StartGuard::parse(guard).is_none()
    {
        errors.push(ValidationError::UnknownStartGuard(guard.clone()));
    }

    if config.ipc.requests_per_second == Some(0) {
        errors.push(ValidationError::MustBePositive {
            field: "ipc.requests_per_second",
        });
    }

    let memory_backend = config
        .store
        .backend
        .as_deref()
        .and_then(StoreBackend::parse)
        == Some(StoreBackend::Memory);
    if memory_backend && config.store.database_path.is_some() {
        errors.push(ValidationError::GlobalError(
            "store.database_path has no effect with the memory backend".into(),
        ));
    }

    errors
}
