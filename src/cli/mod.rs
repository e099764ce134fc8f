//! Command-line parsing for the gold price forecaster.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the data/model code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::data::feed::NEUTRAL_SENTIMENT;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "goldf", version, about = "MCX gold price forecaster (LSTM-based)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the latest market snapshot and append it to the price store.
    Fetch(FetchArgs),
    /// Train the sequence model on the stored history and save the artifacts.
    Train(TrainArgs),
    /// Forecast prices across all horizons from the saved artifacts.
    Predict(PredictArgs),
    /// Fetch, retrain, and forecast in one pass.
    ///
    /// This is the daily-driver command: it appends today's snapshot, refits
    /// the model on the grown history, and prints the forecast table.
    Run(RunArgs),
    /// Generate a synthetic price history for offline experiments.
    Sample(SampleArgs),
}

/// File locations shared by every subcommand.
#[derive(Debug, Parser, Clone)]
pub struct StoreArgs {
    /// Path to the historical price CSV.
    #[arg(long, value_name = "CSV", default_value = "data/gold_data.csv")]
    pub data: PathBuf,

    /// Directory holding the saved model and normalization artifacts.
    #[arg(long, value_name = "DIR", default_value = "models")]
    pub models: PathBuf,
}

/// Training hyperparameters shared by `train` and `run`.
#[derive(Debug, Parser, Clone)]
pub struct TrainOpts {
    /// Maximum training epochs.
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Mini-batch size.
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Epochs without training-loss improvement before stopping early.
    #[arg(long, default_value_t = 10)]
    pub patience: usize,

    /// Adam learning rate.
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Dropout rate applied between recurrent layers and before the head.
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Random seed for weight init, shuffling, and dropout masks.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Options for `goldf fetch`.
#[derive(Debug, Parser)]
pub struct FetchArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Skip the network and append a snapshot built from fallback quotes.
    #[arg(long)]
    pub offline: bool,

    /// News sentiment score attached to the snapshot (-1..1).
    #[arg(long, default_value_t = NEUTRAL_SENTIMENT)]
    pub sentiment: f64,
}

/// Options for `goldf train`.
#[derive(Debug, Parser)]
pub struct TrainArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub train: TrainOpts,

    /// Export the unit-corrected history to CSV.
    #[arg(long = "export-normalized", value_name = "CSV")]
    pub export_normalized: Option<PathBuf>,

    /// Write a markdown debug bundle under debug/.
    #[arg(long = "debug-bundle")]
    pub debug_bundle: bool,
}

/// Options for `goldf predict`.
#[derive(Debug, Parser)]
pub struct PredictArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Export the forecast table to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Write a markdown debug bundle under debug/.
    #[arg(long = "debug-bundle")]
    pub debug_bundle: bool,
}

/// Options for `goldf run`.
#[derive(Debug, Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub train: TrainOpts,

    /// Skip the network and append a snapshot built from fallback quotes.
    #[arg(long)]
    pub offline: bool,

    /// News sentiment score attached to the snapshot (-1..1).
    #[arg(long, default_value_t = NEUTRAL_SENTIMENT)]
    pub sentiment: f64,

    /// Export the forecast table to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Write a markdown debug bundle under debug/.
    #[arg(long = "debug-bundle")]
    pub debug_bundle: bool,
}

/// Options for `goldf sample`.
#[derive(Debug, Parser)]
pub struct SampleArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Number of daily rows to generate.
    #[arg(long, default_value_t = 365)]
    pub days: usize,

    /// Random seed for the synthetic walk.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Starting MCX gold price (INR per 10 grams).
    #[arg(long, default_value_t = 72_000.0)]
    pub start_price: f64,

    /// Mean daily log-return of the synthetic price.
    #[arg(long, default_value_t = 4e-4)]
    pub drift: f64,

    /// Daily log-return noise of the synthetic price.
    #[arg(long, default_value_t = 4e-3)]
    pub noise: f64,

    /// Overwrite an existing store instead of refusing.
    #[arg(long)]
    pub force: bool,
}
