use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::{KeyValue, OutputRecord};
use config::EngineConfig;

pub mod config;
pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v, -vv, -vvv). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job on this machine
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        // Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of map workers
        #[arg(short, long, default_value_t = 1)]
        map_workers: usize,

        /// Number of reduce workers
        #[arg(short, long, default_value_t = 1)]
        reduce_workers: usize,

        /// JSON engine config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the key length cap
        #[arg(long)]
        max_key_len: Option<usize>,

        /// Overrides the value length cap
        #[arg(long)]
        max_value_len: Option<usize>,

        /// Auxiliary arguments to pass to the MapReduce application.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: String,
    pub map_workers: usize,
    pub reduce_workers: usize,
    pub config: Option<PathBuf>,
    pub max_key_len: Option<usize>,
    pub max_value_len: Option<usize>,
    pub args: Vec<String>,
}

impl From<Commands> for Job {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Submit {
                input,
                workload,
                output,
                map_workers,
                reduce_workers,
                config,
                max_key_len,
                max_value_len,
                args,
            } => Job {
                input,
                workload,
                output,
                map_workers,
                reduce_workers,
                config,
                max_key_len,
                max_value_len,
                args,
            },
        }
    }
}

impl Job {
    /// The config file (or the defaults) with command line overrides applied.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(len) = self.max_key_len {
            config.limits.max_key_len = len;
        }
        if let Some(len) = self.max_value_len {
            config.limits.max_value_len = len;
        }
        config.validate()?;
        Ok(config)
    }

    /// Workload arguments, serialized the way the workloads expect them.
    pub fn aux(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_string(&self.args)?))
    }
}

/// Reads every file matching `pattern`, one record per line.
///
/// The key of a record is its file's path and the value is the line.
pub fn read_input(pattern: &str) -> Result<Vec<KeyValue>> {
    let mut records = Vec::new();
    for pathspec in glob(pattern)?.flatten() {
        let content = fs::read_to_string(&pathspec)
            .with_context(|| format!("reading {}", pathspec.display()))?;
        let key = Bytes::from(pathspec.to_string_lossy().into_owned());
        let before = records.len();
        records.extend(
            content
                .lines()
                .map(|line| KeyValue::new(key.clone(), line.to_owned())),
        );
        debug!(file = %pathspec.display(), lines = records.len() - before, "read input");
    }
    Ok(records)
}

/// Writes `<dir>/mr-out`, one `key value` line per output value.
pub fn write_output(dir: impl AsRef<Path>, records: &[OutputRecord]) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let out_pathspec = dir.join("mr-out");
    let mut out_file = BufWriter::new(File::create(&out_pathspec)?);
    for record in records {
        for value in &record.values {
            out_file.write_all(&record.key)?;
            out_file.write_all(b" ")?;
            out_file.write_all(value)?;
            out_file.write_all(b"\n")?;
        }
    }
    out_file.flush()?;
    Ok(out_pathspec)
}

/// Installs the fmt subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_names(verbose >= 3)
        .init();
}
