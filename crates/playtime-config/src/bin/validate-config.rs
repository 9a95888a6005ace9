//! Config validation CLI tool
//!
//! Validates a playtimed configuration file and reports any errors.

use playtime_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn template_status(template: &Option<String>) -> &str {
    template.as_deref().unwrap_or("(not configured)")
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a playtimed configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match playtime_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", playtime_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", config.service.data_dir.display());
            println!("  Tick interval: {:?}", config.service.tick_interval);
            println!("  Flush every: {} ticks", config.service.flush_every_ticks);
            println!(
                "  Rewards: {}",
                if config.rewards.enabled { "enabled" } else { "disabled" }
            );

            let rules = &config.rewards.rules;
            if !rules.is_empty() {
                println!();
                println!("Rules:");
                for index in 0..rules.len() {
                    match rules.get(index) {
                        Some(rule) => match rule.reward_kind() {
                            Ok(kind) => println!(
                                "  #{} after {}h: {} ({})",
                                index, rule.threshold_hours, kind, rule.payload
                            ),
                            Err(e) => println!("  #{} ignored: {}", index, e),
                        },
                        None => println!("  #{} skipped: malformed line", index),
                    }
                }
            }

            println!();
            println!("Grant templates:");
            println!("  group: {}", template_status(&config.grants.group_command));
            println!(
                "  permission: {}",
                template_status(&config.grants.permission_command)
            );
            println!("  command: {}", template_status(&config.grants.console_command));

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                playtime_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                playtime_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                playtime_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                playtime_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        playtime_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
