use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mss_aggregate::{AggregateConfig, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "mss-aggregate")]
#[command(about = "Aggregate music source separation datasets into canonical stem categories")]
struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MUSDB18-HQ root (holds train/ and test/)
    #[arg(long)]
    musdb18hq: Option<PathBuf>,

    /// MedleyDB root (holds Audio/)
    #[arg(long)]
    medleydb: Option<PathBuf>,

    /// MoisesDB root
    #[arg(long)]
    moisesdb: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Category profile, e.g. vdbo or vdbo+gp
    #[arg(short, long)]
    profile: Option<String>,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Rule document replacing the built-in label tables
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Put each collection's files in its own subfolder
    #[arg(long)]
    group_by_dataset: bool,

    /// Keep tracks flagged with bleed
    #[arg(long)]
    include_bleed: bool,

    /// Also write a mixture file per track
    #[arg(long)]
    include_mixtures: bool,

    /// Show what would be processed without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn build_config(args: &Args) -> Result<AggregateConfig> {
    let mut config = match &args.config {
        Some(path) => AggregateConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AggregateConfig::default(),
    };

    if let Some(path) = &args.musdb18hq {
        config.musdb18hq_path = Some(path.clone());
    }
    if let Some(path) = &args.medleydb {
        config.medleydb_path = Some(path.clone());
    }
    if let Some(path) = &args.moisesdb {
        config.moisesdb_path = Some(path.clone());
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(profile) = &args.profile {
        config.profile = profile.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(rules) = &args.rules {
        config.rules = Some(rules.clone());
    }
    config.group_by_dataset |= args.group_by_dataset;
    config.include_bleed |= args.include_bleed;
    config.include_mixtures |= args.include_mixtures;
    config.dry_run |= args.dry_run;
    Ok(config)
}

/// First Ctrl-C stops the run between tracks, a second one aborts
fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("Interrupted, finishing tracks in progress (Ctrl-C again to abort)");
        cancel.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = build_config(&args)?;
    let pipeline = Pipeline::from_config(config).context("Invalid configuration")?;

    if pipeline.config().dry_run {
        let plan = pipeline.plan().context("Planning failed")?;
        println!("Dry run, nothing written to {}", pipeline.layout().root().display());
        println!("{}", plan);
        return Ok(());
    }

    install_interrupt_handler(pipeline.cancel_handle())?;

    let report = pipeline.run().map_err(|e| {
        tracing::error!(error = %e, "Run aborted");
        e
    });
    let report = report.with_context(|| {
        format!(
            "Run aborted; files already in {} are complete and will be kept by the next run",
            pipeline.layout().root().display()
        )
    })?;

    println!("{}", report);
    Ok(())
}
