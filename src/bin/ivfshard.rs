//! ivfshard CLI
//!
//! Relocate or zip IVF index pairs between directories.
//!
//! ```text
//! ivfshard <SRC> <DST> --move
//! ivfshard <SRC> <DST> --copy --recursive
//! ivfshard <SRC> <DST> --zip --base-index base.index [--partial-name zipped]
//! ```
//!
//! Exit codes: 0 on full success, 1 if a relocation or merge failed (work done
//! before the failure is not rolled back), 2 on invalid usage.

use clap::{ArgGroup, Parser};
use ivfshard::ivf::BaseIndex;
use ivfshard::shards::{
    relocate, zip_indexes, RelocateMode, RelocateOptions, Superseded, ZipOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Move, copy or zip (group + merge) IVF index shards.
#[derive(Parser)]
#[command(name = "ivfshard", version, about)]
#[command(group(ArgGroup::new("mode").required(true).args(["move_", "copy", "zip"])))]
struct Cli {
    /// Directory holding the index pairs to process
    src: PathBuf,

    /// Destination directory (created if missing)
    dst: PathBuf,

    /// Move index pairs into DST
    #[arg(short = 'm', long = "move")]
    move_: bool,

    /// Copy index pairs into DST
    #[arg(short, long)]
    copy: bool,

    /// Merge shards per date into `<date>_<partial-name>.index` in DST
    #[arg(short, long, requires = "base_index")]
    zip: bool,

    /// Trained, empty base index the shards were built from (zip only)
    #[arg(short, long)]
    base_index: Option<PathBuf>,

    /// Name part appended to the date of merged outputs
    #[arg(short, long, default_value = "zipped")]
    partial_name: String,

    /// Also process index files in subdirectories of SRC
    #[arg(short, long)]
    recursive: bool,

    /// Keep merged shards in SRC instead of deleting them (zip only)
    #[arg(long, conflicts_with = "archive_dir")]
    keep_shards: bool,

    /// Move merged shards here instead of deleting them (zip only)
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.zip {
        run_zip(&cli)
    } else {
        run_relocate(&cli)
    }
}

fn run_relocate(cli: &Cli) -> ExitCode {
    let opts = RelocateOptions {
        mode: if cli.copy {
            RelocateMode::Copy
        } else {
            RelocateMode::Move
        },
        recursive: cli.recursive,
        mkdir: true,
    };

    match relocate(&cli.src, &cli.dst, &opts) {
        Ok(report) => {
            for (from, to) in &report.relocated {
                println!("{} -> {}", from.display(), to.display());
            }
            match &report.failed {
                None => ExitCode::SUCCESS,
                Some((path, err)) => {
                    error!(path = %path.display(), "{err}");
                    eprintln!(
                        "stopped at {}: {err}; {} file(s) not attempted",
                        path.display(),
                        report.pending.len()
                    );
                    ExitCode::from(1)
                }
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run_zip(cli: &Cli) -> ExitCode {
    let Some(base_path) = &cli.base_index else {
        eprintln!("error: --zip requires --base-index");
        return ExitCode::from(2);
    };
    let base = match BaseIndex::load(base_path) {
        Ok(base) => base,
        Err(err) => {
            eprintln!("error: cannot use {} as base index: {err}", base_path.display());
            return ExitCode::from(1);
        }
    };

    let superseded = match (&cli.archive_dir, cli.keep_shards) {
        (Some(dir), _) => Superseded::MoveTo(dir.clone()),
        (None, true) => Superseded::Keep,
        (None, false) => Superseded::Remove,
    };
    let opts = ZipOptions {
        partial_name: cli.partial_name.clone(),
        recursive: cli.recursive,
        mkdir: true,
        superseded,
    };

    match zip_indexes(&cli.src, &cli.dst, &base, &opts) {
        Ok(report) => {
            for (key, merged) in &report.merged {
                println!(
                    "{key}: {} shard(s), {} vectors -> {}",
                    merged.shard_count,
                    merged.ntotal,
                    merged.path.display()
                );
            }
            info!(groups = report.merged.len(), retired = report.retired.len(), "zip complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}
