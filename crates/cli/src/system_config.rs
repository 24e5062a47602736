//! User-level configuration file
//!
//! Lives at `$CONFIG_DIR/stakeout/config.toml` unless `--config` points
//! elsewhere. A missing file means defaults.

use anyhow::{Context, Result};
use proxy::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub proxy: ProxyConfig,
    pub log: LogConfig,
    pub simulate: SimulateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace (default: warn)
    pub level: String,

    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulateConfig {
    /// Server-side long-poll window of the simulated backend (default: 2000)
    pub poll_timeout_ms: u64,

    /// Chance the agent captures a breakpoint instead of deleting it (default: 0.8)
    pub hit_probability: f64,

    /// Delay between agent actions (default: 300)
    pub agent_delay_ms: u64,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 2000,
            hit_probability: 0.8,
            agent_delay_ms: 300,
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        self.proxy.validate()?;
        self.log_level()?;

        if !(1..=600_000).contains(&self.simulate.poll_timeout_ms) {
            anyhow::bail!("simulate.poll_timeout_ms must be between 1 and 600000");
        }
        if !(0.0..=1.0).contains(&self.simulate.hit_probability) {
            anyhow::bail!("simulate.hit_probability must be between 0.0 and 1.0");
        }
        if self.simulate.agent_delay_ms > 60_000 {
            anyhow::bail!("simulate.agent_delay_ms must be at most 60000");
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level> {
        self.log
            .level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level: {}", self.log.level))
    }

    /// Value of a dotted key such as `proxy.concurrency`
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "proxy.project_id" => display_opt(self.proxy.project_id.as_deref()),
            "proxy.debuggee_id" => display_opt(self.proxy.debuggee_id.as_deref()),
            "proxy.key_file" => display_opt(self.proxy.key_file.as_deref().and_then(Path::to_str)),
            "proxy.concurrency" => self.proxy.concurrency.to_string(),
            "proxy.event_capacity" => self.proxy.event_capacity.to_string(),
            "log.level" => self.log.level.clone(),
            "log.file" => display_opt(self.log.file.as_deref().and_then(Path::to_str)),
            "simulate.poll_timeout_ms" => self.simulate.poll_timeout_ms.to_string(),
            "simulate.hit_probability" => self.simulate.hit_probability.to_string(),
            "simulate.agent_delay_ms" => self.simulate.agent_delay_ms.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a dotted key; the result is validated before it is kept
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "proxy.project_id" => updated.proxy.project_id = non_empty(value),
            "proxy.debuggee_id" => updated.proxy.debuggee_id = non_empty(value),
            "proxy.key_file" => updated.proxy.key_file = non_empty(value).map(PathBuf::from),
            "proxy.concurrency" => {
                updated.proxy.concurrency = value
                    .parse()
                    .context("Invalid value: must be a positive integer")?;
            }
            "proxy.event_capacity" => {
                updated.proxy.event_capacity = value
                    .parse()
                    .context("Invalid value: must be a positive integer")?;
            }
            "log.level" => updated.log.level = value.to_lowercase(),
            "log.file" => updated.log.file = non_empty(value).map(PathBuf::from),
            "simulate.poll_timeout_ms" => {
                updated.simulate.poll_timeout_ms = value
                    .parse()
                    .context("Invalid value: must be a positive integer")?;
            }
            "simulate.hit_probability" => {
                updated.simulate.hit_probability = value
                    .parse()
                    .context("Invalid value: must be a number between 0.0 and 1.0")?;
            }
            "simulate.agent_delay_ms" => {
                updated.simulate.agent_delay_ms = value
                    .parse()
                    .context("Invalid value: must be a non-negative integer")?;
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Use 'stakeout config list' to see available keys.",
                key
            ),
        }

        updated.validate().context("Invalid configuration value")?;
        *self = updated;
        Ok(())
    }
}

fn display_opt(value: Option<&str>) -> String {
    value.unwrap_or("").to_string()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Default config location, if the platform has a config directory
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stakeout").join("config.toml"))
}

/// Load from `path`, falling back to defaults when the file does not exist
pub fn load(path: &Path) -> Result<SystemConfig> {
    if !path.exists() {
        return Ok(SystemConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SystemConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

pub fn save(path: &Path, config: &SystemConfig) -> Result<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(())
}

/// Write the defaults to `path` unless a file is already there
///
/// Returns true if the file was created.
pub fn init_if_missing(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save(path, &SystemConfig::default())?;
    Ok(true)
}

pub fn example_config() -> &'static str {
    r#"# Stakeout configuration

[proxy]
# Skip authorization and use this project
# project_id = "my-project"
# Debuggee to manage breakpoints on
# debuggee_id = "gcp:1234:abcd"
# Service-account key file
# key_file = "/path/to/key.json"
# Max simultaneous backend calls when resolving or deleting (1-256)
concurrency = 10
# Buffered breakpointHit notifications per subscriber
event_capacity = 16

[log]
# error, warn, info, debug or trace
level = "warn"
# file = "/tmp/stakeout.log"

[simulate]
# Long-poll window of the simulated backend
poll_timeout_ms = 2000
# Chance the simulated agent captures a breakpoint instead of deleting it
hit_probability = 0.8
# Delay between simulated agent actions
agent_delay_ms = 300
"#
}
