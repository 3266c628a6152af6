use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cqlparquet_config::CopyConfig;
use cqlparquet_core::Row;
use cqlparquet_writer::{PartitionReader, StreamReader};
use tracing::debug;

mod init;

/// Inspect a parquet file or a partitioned parquet dataset
#[derive(Parser)]
#[command(name = "cqlparquet")]
#[command(version)]
#[command(about = "Print the schema, row count and rows of parquet data", long_about = None)]
struct Cli {
    /// Parquet file, or directory holding a partitioned dataset
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many rows
    #[arg(short = 'n', long, value_name = "ROWS")]
    limit: Option<usize>,

    /// Print only the schema and row count
    #[arg(long)]
    schema_only: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => cqlparquet_config::load_from_file_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CopyConfig::load().context("Failed to load configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init::init_tracing(&config.logging);

    let options = InspectOptions {
        batch_size: config.writer.chunk_rows.max(1),
        limit: cli.limit,
        schema_only: cli.schema_only,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    inspect(&cli.path, &options, &mut out)?;
    out.flush().context("Failed to flush output")?;
    Ok(())
}

struct InspectOptions {
    batch_size: usize,
    limit: Option<usize>,
    schema_only: bool,
}

/// Either kind of source, read batch by batch.
enum Source {
    File(StreamReader),
    Dataset(PartitionReader),
}

impl Source {
    fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            let reader = PartitionReader::open(path)
                .with_context(|| format!("Failed to open dataset {}", path.display()))?;
            Ok(Source::Dataset(reader))
        } else {
            let reader = StreamReader::open(path)
                .with_context(|| format!("Failed to open file {}", path.display()))?;
            Ok(Source::File(reader))
        }
    }

    fn schema(&self) -> Vec<(String, String)> {
        match self {
            Source::File(reader) => reader
                .column_names()
                .into_iter()
                .zip(reader.column_types())
                .collect(),
            Source::Dataset(reader) => reader.schema(),
        }
    }

    fn row_count(&self) -> u64 {
        match self {
            Source::File(reader) => reader.row_count(),
            Source::Dataset(reader) => reader.row_count(),
        }
    }

    fn read_batch(&mut self, n: usize) -> Result<Option<Vec<Row>>> {
        let batch = match self {
            Source::File(reader) => reader.read_batch(n)?,
            Source::Dataset(reader) => reader.read_batch(n)?,
        };
        Ok(batch)
    }

    fn close(&mut self) {
        match self {
            Source::File(reader) => reader.close(),
            Source::Dataset(reader) => reader.close(),
        }
    }
}

fn row_to_json(row: &Row) -> serde_json::Value {
    row.iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn inspect<W: Write>(path: &Path, options: &InspectOptions, out: &mut W) -> Result<()> {
    let mut source = Source::open(path)?;

    writeln!(out, "Schema:")?;
    for (name, type_name) in source.schema() {
        writeln!(out, "  {}: {}", name, type_name)?;
    }
    writeln!(out, "Rows: {}", source.row_count())?;

    if options.schema_only {
        source.close();
        return Ok(());
    }

    let mut printed = 0usize;
    let limit = options.limit.unwrap_or(usize::MAX);
    while printed < limit {
        let want = options.batch_size.min(limit - printed);
        let Some(rows) = source.read_batch(want)? else {
            break;
        };
        debug!(rows = rows.len(), "Read batch");
        for row in &rows {
            serde_json::to_writer(&mut *out, &row_to_json(row))?;
            writeln!(out)?;
        }
        printed += rows.len();
    }
    source.close();
    Ok(())
}
