//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging
//! - parses CLI arguments
//! - wires the store, the feed, and the artifact repository
//! - runs the pipeline
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FetchArgs, PredictArgs, RunArgs, SampleArgs, TrainArgs, TrainOpts};
use crate::data::feed::{HttpFeed, MarketFeed, OfflineFeed};
use crate::data::sample::{generate_history, SampleConfig};
use crate::domain::TrainConfig;
use crate::error::{AppError, ErrorKind};
use crate::io::artifacts::FsArtifacts;
use crate::io::store::{CsvStore, ObservationStore};

pub mod pipeline;

/// Entry point for the `goldf` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();

    // We want `goldf` and `goldf --export fc.csv` to behave like `goldf predict ...`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing. This preserves a clean clap structure while
    // retaining the requested UX.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fetch(args) => handle_fetch(args),
        Command::Train(args) => handle_train(args),
        Command::Predict(args) => handle_predict(args),
        Command::Run(args) => handle_run(args),
        Command::Sample(args) => handle_sample(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
}

fn handle_fetch(args: FetchArgs) -> Result<(), AppError> {
    let store = CsvStore::new(args.store.data);
    let feed = build_feed(args.offline, args.sentiment)?;

    let obs = pipeline::run_fetch(&store, feed.as_ref())?;
    println!(
        "Appended snapshot to {}: {:.2} INR/10g at {}",
        store.path().display(),
        obs.mcx_gold_price,
        obs.timestamp
    );
    Ok(())
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let store = CsvStore::new(args.store.data);
    let artifacts = FsArtifacts::new(args.store.models);
    let config = train_config_from_opts(&args.train)?;

    let run = pipeline::run_train(&store, &artifacts, &config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.series, &run.state, &run.report)
    );
    println!(
        "Saved model to {} and normalization to {}",
        artifacts.model_path().display(),
        artifacts.state_path().display()
    );

    // Optional exports.
    if let Some(path) = &args.export_normalized {
        let corrected = crate::prep::normalize::corrected_copy(&run.series.observations, &run.state);
        crate::io::export::write_normalized_csv(path, &corrected)?;
    }
    if args.debug_bundle {
        let path =
            crate::debug::write_debug_bundle(&run.series, &run.state, Some(&run.report), None)?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let store = CsvStore::new(args.store.data);
    let artifacts = FsArtifacts::new(args.store.models);

    let run = pipeline::run_predict(&store, &artifacts)?;

    println!("{}", crate::report::format_forecast_table(&run.result));

    if let Some(path) = &args.export {
        crate::io::export::write_forecast_csv(path, &run.result)?;
    }
    if args.debug_bundle {
        let path =
            crate::debug::write_debug_bundle(&run.series, &run.state, None, Some(&run.result))?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let store = CsvStore::new(args.store.data);
    let artifacts = FsArtifacts::new(args.store.models);
    let feed = build_feed(args.offline, args.sentiment)?;
    let config = train_config_from_opts(&args.train)?;

    let (train, predict) = pipeline::run_once(&store, &artifacts, feed.as_ref(), &config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&train.series, &train.state, &train.report)
    );
    println!("{}", crate::report::format_forecast_table(&predict.result));

    if let Some(path) = &args.export {
        crate::io::export::write_forecast_csv(path, &predict.result)?;
    }
    if args.debug_bundle {
        let path = crate::debug::write_debug_bundle(
            &train.series,
            &train.state,
            Some(&train.report),
            Some(&predict.result),
        )?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let store = CsvStore::new(args.store.data);
    if store.path().exists() {
        if !args.force {
            return Err(AppError::new(
                ErrorKind::Input,
                format!(
                    "Refusing to overwrite '{}'; pass --force to replace it.",
                    store.path().display()
                ),
            ));
        }
        std::fs::remove_file(store.path()).map_err(|e| {
            AppError::new(
                ErrorKind::Runtime,
                format!("Failed to remove '{}': {e}", store.path().display()),
            )
        })?;
    }

    let config = SampleConfig {
        days: args.days,
        seed: args.seed,
        start_price: args.start_price,
        daily_drift: args.drift,
        noise: args.noise,
    };
    let rows = generate_history(&config)?;
    for obs in &rows {
        store.append(obs)?;
    }

    println!(
        "Wrote {} synthetic rows to {}",
        rows.len(),
        store.path().display()
    );
    Ok(())
}

fn build_feed(offline: bool, sentiment: f64) -> Result<Box<dyn MarketFeed>, AppError> {
    if !(-1.0..=1.0).contains(&sentiment) {
        return Err(AppError::new(
            ErrorKind::Input,
            "Sentiment must be within -1..1.",
        ));
    }
    if offline {
        Ok(Box::new(OfflineFeed { sentiment }))
    } else {
        Ok(Box::new(HttpFeed::from_env(sentiment)?))
    }
}

pub fn train_config_from_opts(opts: &TrainOpts) -> Result<TrainConfig, AppError> {
    if opts.epochs == 0 {
        return Err(AppError::new(ErrorKind::Input, "Epochs must be > 0."));
    }
    if !(opts.learning_rate.is_finite() && opts.learning_rate > 0.0) {
        return Err(AppError::new(
            ErrorKind::Input,
            "Learning rate must be positive.",
        ));
    }
    if !(0.0..1.0).contains(&opts.dropout) {
        return Err(AppError::new(
            ErrorKind::Input,
            "Dropout must be within 0..1 (exclusive).",
        ));
    }

    Ok(TrainConfig {
        epochs: opts.epochs,
        batch_size: opts.batch_size.max(1),
        patience: opts.patience,
        learning_rate: opts.learning_rate,
        dropout: opts.dropout,
        seed: opts.seed,
        ..TrainConfig::default()
    })
}

/// Rewrite argv so `goldf` defaults to `goldf predict`.
///
/// Rules:
/// - `goldf`                     -> `goldf predict`
/// - `goldf --export fc.csv`     -> `goldf predict --export fc.csv`
/// - `goldf --help/--version/-h` -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("predict".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(
        arg1.as_str(),
        "fetch" | "train" | "predict" | "run" | "sample"
    );
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "predict flags".
    if arg1.starts_with('-') {
        argv.insert(1, "predict".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}
