//! Configuration management command
//!
//! Provides CLI interface to view and edit the configuration file.

use crate::system_config::{self, SystemConfig};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

const KEYS: &[(&str, &[&str])] = &[
    (
        "proxy",
        &["project_id", "debuggee_id", "key_file", "concurrency", "event_capacity"],
    ),
    ("log", &["level", "file"]),
    ("simulate", &["poll_timeout_ms", "hit_probability", "agent_delay_ms"]),
];

/// List all configuration values
pub async fn run_list(config_path: &Path) -> Result<()> {
    let config = system_config::load(config_path)?;

    println!("{}", "Stakeout Configuration".bold());
    let location = config_path.display().to_string();
    if config_path.exists() {
        println!("{}: {}\n", "Location".dimmed(), location.dimmed());
    } else {
        println!("{}: {} {}\n", "Location".dimmed(), location.dimmed(), "(not created, showing defaults)".yellow());
    }

    for (index, (section, keys)) in KEYS.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("{}", format!("[{}]", section).yellow());
        for key in keys.iter() {
            let value = config.get(&format!("{}.{}", section, key)).unwrap_or_default();
            if value.is_empty() {
                println!("  {} = {}", key.cyan(), "(unset)".dimmed());
            } else {
                println!("  {} = {}", key.cyan(), value);
            }
        }
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  proxy.concurrency: 1-{}", proxy::config::MAX_CONCURRENCY);
    println!("  proxy.event_capacity: >= 1");
    println!("  simulate.poll_timeout_ms: 1-600,000");
    println!("  simulate.hit_probability: 0.0-1.0");
    println!("  simulate.agent_delay_ms: 0-60,000");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(config_path: &Path, key: &str) -> Result<()> {
    let config = system_config::load(config_path)?;

    match config.get(key) {
        Some(value) => println!("{}", value),
        None => anyhow::bail!(
            "Unknown config key: {}. Use 'stakeout config list' to see available keys.",
            key
        ),
    }
    Ok(())
}

/// Set a configuration value
pub async fn run_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config: SystemConfig = system_config::load(config_path)?;
    config.set(key, value)?;
    system_config::save(config_path, &config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(config_path: &Path, create: bool) -> Result<()> {
    if create && system_config::init_if_missing(config_path)? {
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}
