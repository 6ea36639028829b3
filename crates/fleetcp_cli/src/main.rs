//! fleetcp CLI
//!
//! Copies local files and directories to a fleet of workers.
//!
//! # Modes
//!
//! - default: one receive-files call carrying every source file
//! - `--chunked`: ordered chunked transfer, required for directories
//! - `--barrier`: one directive through the relay fleet, waiting until
//!   every relay reports completion

mod commands;
mod error;
mod output;

use clap::Parser;
use error::{CliError, CliResult};
use fleetcp_core::{load_target_file, CopyConfig, CoreError, DEFAULT_CHUNK_SIZE};
use fleetcp_engine::{BarrierConfig, CountingMode};
use fleetcp_protocol::TargetExpr;
use output::OutputFormat;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Copy files to a fleet of workers.
#[derive(Parser, Debug)]
#[command(name = "fleetcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target workers: a glob, a comma-separated list with -L, or a file with -X
    target: String,

    /// Source paths followed by the destination path
    #[arg(num_args = 2.., required = true, value_name = "SOURCE... DEST")]
    paths: Vec<String>,

    /// Treat the target as a comma-separated list of worker ids
    #[arg(short = 'L', long, conflicts_with = "file_target")]
    list: bool,

    /// Read the target list from the file named by the target argument
    #[arg(short = 'X', long)]
    file_target: bool,

    /// Use chunked transfer (required to copy directories)
    #[arg(short = 'C', long)]
    chunked: bool,

    /// Disable gzip compression in chunked mode
    #[arg(short = 'n', long)]
    no_compression: bool,

    /// Chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Timeout for each remote call, in seconds
    #[arg(short = 't', long, default_value_t = 5)]
    timeout: u64,

    /// Minimum time to wait for relay acknowledgements, in seconds
    #[arg(long, default_value_t = 30)]
    sub_timeout: u64,

    /// Dispatch through the relay fleet and wait on the completion barrier
    #[arg(long, conflicts_with = "chunked")]
    barrier: bool,

    /// Give up on the barrier after this many seconds (0 waits forever)
    #[arg(long, default_value_t = 300)]
    barrier_deadline: u64,

    /// Count raw ping/work events instead of distinct relays
    #[arg(long)]
    raw_counting: bool,

    /// Number of relays in barrier mode
    #[arg(long, default_value_t = 1)]
    relays: usize,

    /// Directory holding one subdirectory per worker
    #[arg(long, value_name = "DIR")]
    loopback_root: PathBuf,

    /// Output format
    #[arg(long = "out", value_enum, default_value_t = OutputFormat::Nested)]
    out: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn target_expr(&self) -> CliResult<TargetExpr> {
        if self.file_target {
            return Ok(load_target_file(Path::new(&self.target))?);
        }
        if self.list {
            return Ok(TargetExpr::list(
                self.target
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty()),
            ));
        }
        Ok(TargetExpr::glob(self.target.as_str()))
    }

    fn copy_config(&self) -> CliResult<CopyConfig> {
        let Some((dest, sources)) = self.paths.split_last() else {
            return Err(CoreError::invalid_config("a destination path is required").into());
        };
        let sources = sources.iter().map(PathBuf::from).collect();
        Ok(CopyConfig::new(sources, dest.as_str(), self.target_expr()?)
            .with_chunked(self.chunked)
            .with_compression(!self.no_compression)
            .with_chunk_size(self.chunk_size)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_sub_timeout(Duration::from_secs(self.sub_timeout)))
    }

    fn barrier_config(&self) -> BarrierConfig {
        let config = if self.barrier_deadline == 0 {
            BarrierConfig::new().without_deadline()
        } else {
            BarrierConfig::new().with_deadline(Duration::from_secs(self.barrier_deadline))
        };
        if self.raw_counting {
            config.with_counting(CountingMode::Raw)
        } else {
            config
        }
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    tracing::debug!("fleetcp core v{}", fleetcp_core::VERSION);
    let config = cli.copy_config()?;
    config.validate()?;

    if cli.barrier {
        commands::barrier::run(
            &config,
            cli.barrier_config(),
            &cli.loopback_root,
            cli.relays,
            cli.out,
        )
    } else {
        commands::copy::run(&config, &cli.loopback_root, cli.out)
    }
}

fn report_failure(err: &CliError) {
    eprintln!("{err}");
    if let Some(report) = err.partial_report() {
        let missing: Vec<String> = report.missing().into_iter().collect();
        eprintln!("No completion from: {}", missing.join(", "));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::from(err.exit_code())
        }
    }
}
