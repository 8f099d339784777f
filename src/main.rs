//! layerdiff CLI - compare saved forward/backward traces

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use layerdiff::view::TreeView;
use layerdiff::{compare_reports, ActionRegistry, CompareConfig, EqualAction, Report, VERSION};

/// layerdiff - locate the first layer where two model runs diverge
#[derive(Parser, Debug)]
#[command(name = "layerdiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare two saved reports
    Compare {
        /// Dump directory of the reference run
        #[arg(short, long)]
        reference: PathBuf,

        /// Dump directory of the candidate run
        #[arg(short, long)]
        candidate: PathBuf,

        /// Comparison config (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Absolute tolerance, overrides the config
        #[arg(long)]
        atol: Option<f64>,

        /// Relative tolerance, overrides the config
        #[arg(long)]
        rtol: Option<f64>,

        /// Compare layer pairs with no registered action element-wise
        #[arg(long)]
        fallback: bool,
    },

    /// Print a saved report
    Show {
        /// Dump directory
        dir: PathBuf,

        /// Also print the forward layer tree
        #[arg(long)]
        tree: bool,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb
}

fn load_report(dir: &Path) -> Result<Report> {
    let pb = create_progress_bar(&format!("Loading {:?}...", dir));
    let report = Report::load(dir).with_context(|| format!("Failed to load report from {:?}", dir));
    pb.finish_and_clear();
    report
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    info!("layerdiff v{}", VERSION);

    match cli.command {
        Commands::Compare {
            reference,
            candidate,
            config,
            atol,
            rtol,
            fallback,
        } => {
            let mut cfg = match &config {
                Some(path) => CompareConfig::load(path)?,
                None => CompareConfig::default(),
            };
            if let Some(atol) = atol {
                cfg.atol = atol;
            }
            if let Some(rtol) = rtol {
                cfg.rtol = rtol;
            }
            info!("Tolerance: atol={}, rtol={}", cfg.atol, cfg.rtol);

            let reference = load_report(&reference)?;
            let candidate = load_report(&candidate)?;
            info!(
                "Comparing '{}' ({} items) with '{}' ({} items)",
                reference.name(),
                reference.len(),
                candidate.name(),
                candidate.len()
            );

            let mut registry = ActionRegistry::standard();
            if fallback {
                registry = registry.with_fallback(EqualAction);
            }

            let outcome = compare_reports(&reference, &candidate, &registry, &cfg)
                .context("Comparison aborted")?;
            println!("{}", outcome);

            Ok(if outcome.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Show { dir, tree } => {
            let report = load_report(&dir)?;
            println!("{}", report);

            if tree {
                let view = TreeView::new(report.get_fwd_items());
                println!();
                print!("{}", view.render());
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
