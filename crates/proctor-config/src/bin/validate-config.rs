//! Config validation CLI tool
//!
//! Validates a proctor configuration file and reports any errors.

use proctor_util::{default_config_path, format_countdown};
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
            eprintln!("Validates a proctor configuration file.");
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

    match proctor_config::load_config(&config_path) {
        Ok(policy) => {
            let session = &policy.session;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", proctor_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", policy.service.data_dir.display());
            println!("  Escalation threshold: {}", session.escalation_threshold);
            println!(
                "  Proctoring poll: every {}s",
                session.proctoring_poll_interval.as_secs()
            );
            println!("  Autosave: every {}s", session.autosave_interval.as_secs());

            if !session.warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &session.warnings {
                    println!(
                        "  - at {} remaining [{:?}] {}",
                        format_countdown(warning.seconds_before),
                        warning.severity,
                        warning.message.as_deref().unwrap_or("")
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();

            match &e {
                proctor_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                }
                _ => eprintln!("Error: {}", e),
            }

            ExitCode::from(1)
        }
    }
}
