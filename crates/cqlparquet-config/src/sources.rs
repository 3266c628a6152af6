// Configuration source loading.
//
// Priority order:
// 1. Environment variables (CQLPARQUET_* prefix)
// 2. Config file path from CQLPARQUET_CONFIG
// 3. Inline config content from CQLPARQUET_CONFIG_CONTENT
// 4. Default config file (./cqlparquet.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::CopyConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "./cqlparquet.toml";

/// Load configuration using the process environment.
pub fn load_config() -> Result<CopyConfig> {
    load_with_env(&StdEnvSource)
}

/// Load configuration, reading every environment lookup through `env`.
pub fn load_with_env<E: EnvSource>(env: &E) -> Result<CopyConfig> {
    let mut config = load_from_file(env)?.unwrap_or_default();
    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<CopyConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config = CopyConfig::from_toml(&content).with_context(|| {
            format!("Failed to parse inline config from {}CONFIG_CONTENT", ENV_PREFIX)
        })?;
        return Ok(Some(config));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_config_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<CopyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    CopyConfig::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for a CLI `--config` flag).
///
/// Unlike [`load_config`], a missing file is an error. Environment overrides
/// still apply on top of the file.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<CopyConfig> {
    let mut config = read_config_file(path.as_ref())?;
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
