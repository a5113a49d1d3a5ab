//! Configuration File Handling
//!
//! Config files are flattened into `section -> key -> value` strings. The
//! `[base]` section holds binary-wide defaults (logging, colour); `[bus]`
//! holds [`BusConfig`] keys in kebab-case.
//!
//! ```toml
//! [base]
//! log-format = "json"
//!
//! [bus]
//! health-check-timeout-ms = 250
//! health-scope = "registered"
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{Context, Result};
use log::{debug, info};
use toml::Value;
use crate::bus::{BusConfig, HealthScope};

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

const BUS_SECTION: &str = "bus";

pub struct ConfigManager {
    config: Configuration,
    config_file_path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn from_config(config: Configuration) -> Self {
        Self { config, config_file_path: None }
    }

    /// Load the first config file found by discovery, or an empty configuration
    pub fn load() -> Result<Self> {
        debug!("Starting configuration discovery");

        for path in discover_config_files() {
            debug!("Attempting to load config from: {}", path.display());
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        info!("No configuration file found, using defaults");
        Ok(Self::from_config(Configuration::new()))
    }

    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        Ok(Self { config, config_file_path: Some(path) })
    }

    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Value from `section`, falling back to `[base]`
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        self.config
            .get(section)
            .and_then(|s| s.get(key))
            .or_else(|| self.config.get("base").and_then(|s| s.get(key)))
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }

    /// Parse `section.key` with `FromStr`
    pub fn get_parsed<T>(&self, section: &str, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.config.get(section).and_then(|s| s.get(key)) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid {}.{} value '{}': {}", section, key, raw, e)),
            None => Ok(None),
        }
    }

    /// Bus settings from the `[bus]` section over the defaults
    pub fn get_bus_config(&self) -> Result<BusConfig> {
        let mut config = BusConfig::default();

        if let Some(timeout) = self.get_parsed::<u64>(BUS_SECTION, "health-check-timeout-ms")? {
            config.health_check_timeout_ms = timeout;
        }
        if let Some(scope) = self.get_parsed::<HealthScope>(BUS_SECTION, "health-scope")? {
            config.health_scope = scope;
        }
        if let Some(timeout) = self.get_parsed::<u64>(BUS_SECTION, "shutdown-timeout-ms")? {
            config.shutdown_timeout_ms = timeout;
        }
        if let Some(interval) = self.get_parsed::<u64>(BUS_SECTION, "health-interval-ms")? {
            config.health_interval_ms = Some(interval);
        }
        if let Some(limit) = self.get_parsed::<usize>(BUS_SECTION, "max-subscriptions")? {
            config.max_subscriptions = Some(limit);
        }
        if let Some(report) = self.get_parsed::<bool>(BUS_SECTION, "report-handler-errors")? {
            config.report_handler_errors = report;
        }
        if let Some(rate) = self.get_parsed::<f64>(BUS_SECTION, "degraded-error-rate")? {
            config.degraded_error_rate = rate;
        }

        config.validate().context("Bus configuration validation failed")?;
        Ok(config)
    }
}

/// Config file candidates in order of precedence
fn discover_config_files() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = env::var("MODULEBUS_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("modulebus").join("config.toml"));
    }
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".modulebus.toml"));
    }
    paths.push(PathBuf::from("./.modulebus.toml"));

    debug!("Config discovery paths: {:?}", paths);
    paths
}

fn parse_toml_config(content: &str) -> Result<Configuration> {
    let toml_value: Value = content.parse().context("Failed to parse TOML content")?;

    let mut config = Configuration::new();
    if let Value::Table(table) = toml_value {
        flatten_toml_table(&table, String::new(), &mut config);
    }
    Ok(config)
}

/// Flatten nested tables into `section.subsection` names
fn flatten_toml_table(table: &toml::Table, prefix: String, config: &mut Configuration) {
    for (key, value) in table {
        let section_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Table(subtable) if subtable.values().any(|v| matches!(v, Value::Table(_))) => {
                flatten_toml_table(subtable, section_name, config);
            }
            Value::Table(subtable) => {
                config.entry(section_name).or_default().extend(
                    subtable
                        .iter()
                        .map(|(subkey, subvalue)| (subkey.clone(), toml_value_to_string(subvalue))),
                );
            }
            // Top-level scalars land in [base]
            _ => {
                config
                    .entry("base".to_string())
                    .or_default()
                    .insert(section_name, toml_value_to_string(value));
            }
        }
    }
}

fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}
