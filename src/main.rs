use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use plogstat::analyzer::Analyzer;
use plogstat::config::Config;
use plogstat::iotrace::resolve_signals;
use plogstat::metrics;
use plogstat::plot;
use plogstat::sink::CsvSink;

/// Power-cycle timing and health analyzer for embedded firmware logs.
#[derive(Parser)]
#[command(name = "plogstat", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log filename; "-" or absent reads standard input.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Maximum number of lines to read from the log.
    #[arg(short, long)]
    max_lines: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive per-cycle metrics and write them as CSV.
    Stat {
        /// Dataset name used for the CSV (and plot) files.
        #[arg(short, long, default_value = "stat")]
        data_name: String,

        /// Invoke the external plot script after writing the dataset.
        #[arg(short = 'P', long)]
        plot: bool,
    },

    /// Replay one or all cycles as an IO signal trace.
    Trace {
        /// Signal names to trace; absent traces all configured signals.
        #[arg(short, long)]
        signal: Vec<String>,

        /// Only replay the cycle with this sequence number.
        #[arg(long)]
        cycle: Option<u64>,
    },

    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Command::Version = &cli.command {
        println!("plogstat {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(version = version::RELEASE, commit = version::git_commit(), "starting plogstat");

    run(cli, cfg)
}

fn run(cli: Cli, cfg: Config) -> Result<()> {
    let markers = cfg.markers()?;
    let analyzer = Analyzer::new(&markers, cli.max_lines);
    let reader = open_source(cli.file.as_deref())?;

    match cli.command {
        Command::Stat { data_name, plot: plot_requested } => {
            let csv_path = PathBuf::from(format!("{data_name}.csv"));
            let out = File::create(&csv_path)
                .with_context(|| format!("creating {}", csv_path.display()))?;

            let mut sink = CsvSink::new(BufWriter::new(out), metrics::metric_names())?;
            let stats = analyzer.run_stat(reader, &mut sink)?;
            sink.finish()?;

            tracing::info!(
                rows = stats.rows_written,
                rejected = stats.rejected,
                skipped = stats.rows_skipped,
                csv = %csv_path.display(),
                "dataset written",
            );

            if plot_requested || cfg.plot.enabled {
                let cwd = std::env::current_dir().context("resolving working directory")?;
                if let Err(err) = plot::invoke(&cfg.plot.script, &cwd, &data_name) {
                    tracing::error!(error = %err, "plot script failed; metrics are unaffected");
                }
            }
        }

        Command::Trace { signal, cycle } => {
            let signals = resolve_signals(&cfg.signals, &signal)?;
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let stats = analyzer.run_trace(reader, &signals, cycle, &mut out)?;
            tracing::info!(
                cycles = stats.cycles_closed,
                trace_lines = stats.trace_lines,
                "trace finished",
            );
        }

        // Already handled before logging was initialized.
        Command::Version => {}
    }

    Ok(())
}

/// Open the input line source: a file path, or stdin for "-"/absent.
fn open_source(file: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match file {
        None => Ok(Box::new(BufReader::new(io::stdin()))),
        Some(path) if path.as_os_str() == "-" => Ok(Box::new(BufReader::new(io::stdin()))),
        Some(path) => {
            let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(BufReader::new(f)))
        }
    }
}
