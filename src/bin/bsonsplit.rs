//! bsonsplit - inspect and pre-split BSON dump files.
//!
//! `index` prints the splits a job would get for a dump (loading or writing the
//! sidecar index as the configuration says). `export` writes each split to a
//! file of its own, optionally compressed, so a dump can be shipped as parts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsplit::config::{keys, JobConf};
use docsplit::export::{export_file, ExportOptions};
use docsplit::io::compression::codec_by_name;
use docsplit::{BsonFileSplitter, FileSplit};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bsonsplit", version, about = "Inspect and pre-split BSON dump files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug logging (RUST_LOG overrides).
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the splits of a dump file.
    Index {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target split size in bytes.
        #[arg(short = 's', long, value_name = "BYTES")]
        split_size: Option<u64>,

        /// Directory for the split index instead of the file's own.
        #[arg(long, value_name = "DIR")]
        splits_dir: Option<PathBuf>,

        /// Do not write the split index.
        #[arg(long)]
        no_write: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Write each split of a dump file to its own file.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short = 'o', long, value_name = "DIR")]
        output: PathBuf,

        /// Compress parts: gzip, zstd, bzip2 or xz.
        #[arg(short = 'c', long, value_name = "CODEC")]
        codec: Option<String>,

        /// Target split size in bytes.
        #[arg(short = 's', long, value_name = "BYTES")]
        split_size: Option<u64>,

        /// Worker threads (default: one per CPU).
        #[arg(short = 'j', long, value_name = "NUM")]
        threads: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "docsplit=debug,bsonsplit=debug,warn" } else { "docsplit=info,bsonsplit=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Index {
            file,
            split_size,
            splits_dir,
            no_write,
            json,
        } => {
            let mut conf = JobConf::new();
            if let Some(dir) = splits_dir {
                conf.set(keys::BSON_SPLITS_PATH, dir.display().to_string());
            }
            if no_write {
                conf.set(keys::BSON_WRITE_SPLITS, "false");
            }
            let splitter = splitter(&conf, split_size)?;
            let splits = splitter
                .load_or_compute(&file)
                .with_context(|| format!("planning splits for {}", file.display()))?;
            print_splits(&splits, json)
        }
        Command::Export {
            file,
            output,
            codec,
            split_size,
            threads,
        } => {
            let options = ExportOptions {
                split_size,
                codec: codec.as_deref().map(codec_by_name).transpose()?,
                threads,
            };
            let parts = export_file(&file, &output, &options)
                .with_context(|| format!("exporting {} to {}", file.display(), output.display()))?;
            for part in parts {
                println!("{}", part.display());
            }
            Ok(())
        }
    }
}

fn splitter(conf: &JobConf, split_size: Option<u64>) -> Result<BsonFileSplitter> {
    let splitter = BsonFileSplitter::from_conf(conf)?;
    Ok(match split_size {
        Some(bytes) => splitter.with_split_size(bytes),
        None => splitter,
    })
}

fn print_splits(splits: &[FileSplit], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, splits)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "{:>6}  {:>14}  {:>14}", "split", "start", "length")?;
    for (i, s) in splits.iter().enumerate() {
        writeln!(out, "{i:>6}  {:>14}  {:>14}", s.start, s.length)?;
    }
    Ok(())
}
