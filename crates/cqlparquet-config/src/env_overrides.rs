use crate::CopyConfig;
use anyhow::{anyhow, Result};

pub const ENV_PREFIX: &str = "CQLPARQUET_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Look up `key` with the `CQLPARQUET_` prefix applied.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut CopyConfig, env: &E) -> Result<()> {
    // Writer configuration
    if let Some(val) = get_env_usize(env, "CHUNK_ROWS")? {
        config.writer.chunk_rows = val;
    }
    if let Some(codec) = get_env_string(env, "COMPRESSION") {
        config.writer.compression = codec.to_lowercase();
    }
    if let Some(val) = get_env_usize(env, "ROW_GROUP_SIZE")? {
        config.writer.max_row_group_size = val;
    }

    // Partition configuration
    if let Some(columns) = get_env_string(env, "PARTITION_COLUMNS") {
        config.partition.columns = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(val) = get_env_usize(env, "MAX_OPEN_FILES")? {
        config.partition.max_open_files = val;
    }
    if let Some(val) = get_env_u64(env, "MAX_FILE_SIZE_BYTES")? {
        config.partition.max_file_size_bytes = val;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.logging.format = format.parse()?;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.trim().is_empty())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
