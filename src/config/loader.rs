use crate::config::schema::Config;
use crate::utils::AssessError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

pub const ENV_BIND: &str = "ASSESSD_BIND";
pub const ENV_SESSION_WINDOW_SECS: &str = "ASSESSD_SESSION_WINDOW_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "ASSESSD_SWEEP_INTERVAL_SECS";

/// Loads configuration: defaults, then the config file, then environment,
/// then CLI flags (highest precedence). The result is validated.
pub fn load_config(cli_bind: Option<String>, cli_config_path: Option<PathBuf>) -> Result<Config> {
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: config file (~/.assessd/config.json or --config)
    let config_file = cli_config_path.clone().or_else(get_config_path);

    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = read_config_file(path)?;
        } else if cli_config_path.is_some() {
            tracing::warn!(config_path = %path.display(), "Config file not found, using defaults");
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: environment variables
    config = merge_env_variables(config)?;

    // Layer 3: CLI flags
    if let Some(bind) = cli_bind {
        tracing::debug!(bind = %bind, "Applying CLI bind override");
        config.bind_addr = bind;
    }

    config.validate().context("Invalid configuration")?;

    tracing::debug!(
        bind_addr = %config.bind_addr,
        session_window_secs = config.session.window_secs,
        session_sweep_secs = config.session.sweep_interval_secs,
        rate_limited_routes = config.rate_limit.routes.len(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Default location of the config file
pub fn get_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".assessd").join("config.json"))
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| AssessError::io(path, e))?;

    let config: Config = serde_json::from_str(&content)
        .map_err(AssessError::from)
        .with_context(|| format!("Config file {:?} contains invalid JSON", path))?;

    Ok(config)
}

fn merge_env_variables(mut config: Config) -> Result<Config> {
    if let Some(bind) = std::env::var(ENV_BIND).ok().filter(|v| !v.trim().is_empty()) {
        tracing::debug!(bind = %bind, "Applying {} override", ENV_BIND);
        config.bind_addr = bind;
    }

    if let Some(secs) = read_positive_env(ENV_SESSION_WINDOW_SECS)? {
        config.session.window_secs = secs;
    }

    if let Some(secs) = read_positive_env(ENV_SWEEP_INTERVAL_SECS)? {
        config.session.sweep_interval_secs = secs;
        config.rate_limit.sweep_interval_secs = secs;
    }

    Ok(config)
}

fn read_positive_env(name: &'static str) -> Result<Option<u64>> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => {
            tracing::debug!(value = parsed, "Applying {} override", name);
            Ok(Some(parsed))
        }
        _ => Err(AssessError::config(format!(
            "environment variable {} must be a positive integer, got '{}'",
            name, value
        ))
        .into()),
    }
}

/// Writes `config` as pretty JSON, creating parent directories as needed
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))?;
    tracing::info!(config_path = %path.display(), "Configuration saved");
    Ok(())
}
