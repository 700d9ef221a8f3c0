//! Config validation CLI tool
//!
//! Validates a clockistryd configuration file and reports any errors.

use clockistry_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a clockistryd configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match clockistry_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", clockistry_config::CURRENT_CONFIG_VERSION);
            println!("  Socket:         {}", settings.service.socket_path.display());
            println!("  Store backend:  {:?}", settings.store.backend);
            if settings.store.backend == clockistry_config::StoreBackend::Sqlite {
                println!("  Database:       {}", settings.database_path().display());
            }
            println!("  I/O timeout:    {} ms", settings.store.io_timeout.as_millis());
            println!("  Start guard:    {}", settings.timer.start_guard.as_str());
            println!("  Rate limit:     {} req/s per client", settings.ipc.requests_per_second);
            ExitCode::SUCCESS
        }
        Err(clockistry_config::ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Configuration has {} error(s):", errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            ExitCode::from(1)
        }
    }
}
