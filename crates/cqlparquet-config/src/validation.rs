// Configuration validation
//
// Rejects values that would make a copy impossible and warns about values
// that are merely risky.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &CopyConfig) -> Result<()> {
    validate_writer_config(&config.writer)?;
    validate_partition_config(&config.partition)?;
    Ok(())
}

fn validate_writer_config(config: &WriterConfig) -> Result<()> {
    if config.chunk_rows == 0 {
        bail!("writer.chunk_rows must be greater than 0");
    }

    if config.max_row_group_size == 0 {
        bail!("writer.max_row_group_size must be greater than 0");
    }

    if config.data_page_size == 0 {
        bail!("writer.data_page_size must be greater than 0");
    }

    let codec = config.compression.to_lowercase();
    if !SUPPORTED_CODECS.contains(&codec.as_str()) {
        bail!(
            "writer.compression '{}' is not supported. Supported: {}",
            config.compression,
            SUPPORTED_CODECS.join(", ")
        );
    }

    // Every chunk is retained in memory until close
    if config.chunk_rows > 1_000_000 {
        warn!(
            chunk_rows = config.chunk_rows,
            "writer.chunk_rows is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_partition_config(config: &PartitionConfig) -> Result<()> {
    if config.max_open_files == 0 {
        bail!("partition.max_open_files must be greater than 0");
    }

    if config.max_file_size_bytes == 0 {
        bail!("partition.max_file_size_bytes must be greater than 0");
    }

    for column in &config.columns {
        if column.trim().is_empty() {
            bail!("partition.columns must not contain empty names");
        }
    }

    if config.max_open_files > 1000 {
        warn!(
            max_open_files = config.max_open_files,
            "partition.max_open_files is very large; may exhaust file descriptors"
        );
    }

    Ok(())
}
