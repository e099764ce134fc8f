//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - carried through ingest, normalization, training and inference
//! - exported to JSON/CSV
//! - reloaded later to replay the exact fitted transform

use chrono::{NaiveDate, NaiveDateTime};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Number of features per observation, in fixed order:
/// primary price, USD/INR, Nifty 50, news sentiment.
pub const FEATURE_COUNT: usize = 4;

/// Column index of the primary feature (the forecast target).
pub const PRIMARY_FEATURE: usize = 0;

/// Minimum observations required before normalization is fitted or a model
/// is trained. Below this the pipeline stops without touching artifacts.
pub const MIN_TRAIN_ROWS: usize = 50;

/// Rows per model input window.
pub const WINDOW_SIZE: usize = 5;

/// Longest horizon (in days) served by the recursive model rollout.
/// Horizons beyond this use the compound-growth extrapolation instead.
pub const SHORT_HORIZON_MAX_DAYS: i64 = 30;

/// One daily market observation. Rows are append-only: once stored they are
/// never rewritten, and every transform works on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    /// Gold price in INR per 10 grams (the forecast target). Must be positive.
    pub mcx_gold_price: f64,
    /// USD/INR exchange rate.
    pub usd_inr: f64,
    /// Nifty 50 index level.
    pub nifty50: f64,
    /// News sentiment polarity, nominally in `[-1, 1]`.
    pub news_sentiment: f64,
}

impl Observation {
    /// Feature values in the fixed column order.
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.mcx_gold_price,
            self.usd_inr,
            self.nifty50,
            self.news_sentiment,
        ]
    }

    /// Column names matching [`Observation::features`] order.
    pub fn feature_names() -> [&'static str; FEATURE_COUNT] {
        ["mcx_gold_price", "usd_inr", "nifty50", "news_sentiment"]
    }
}

/// Observed `[min, max]` of one feature at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Fitted normalization parameters.
///
/// Persisted alongside the model so inference replays the exact mapping used
/// at training time instead of re-deriving it from whatever data is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    /// Multiplier applied to primary prices before `unit_transition`.
    /// `1.0` when no unit discontinuity was detected.
    pub unit_correction_factor: f64,
    /// First row index already quoted in the later unit, if a jump was found.
    pub unit_transition: Option<usize>,
    /// Per-feature bounds (after unit correction), in fixed column order.
    pub ranges: [FeatureRange; FEATURE_COUNT],
    /// Number of rows the state was fitted on.
    pub fitted_rows: usize,
}

/// One supervised training example: `WINDOW_SIZE` consecutive normalized
/// feature rows plus the scaled primary value of the row that follows them.
#[derive(Debug, Clone)]
pub struct Window {
    /// `window_size x FEATURE_COUNT`, oldest row first.
    pub rows: DMatrix<f64>,
    /// Scaled primary feature of the row immediately after the slice.
    pub label: f64,
}

/// Forecast horizons produced on every inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Day,
    Week,
    Month,
    Year,
    FiveYears,
    TenYears,
}

impl Horizon {
    pub const ALL: [Horizon; 6] = [
        Horizon::Day,
        Horizon::Week,
        Horizon::Month,
        Horizon::Year,
        Horizon::FiveYears,
        Horizon::TenYears,
    ];

    /// Horizon length in calendar days.
    pub fn days(self) -> i64 {
        match self {
            Horizon::Day => 1,
            Horizon::Week => 7,
            Horizon::Month => 30,
            Horizon::Year => 365,
            Horizon::FiveYears => 1825,
            Horizon::TenYears => 3650,
        }
    }

    /// Human-readable label used in tables and exports.
    pub fn label(self) -> &'static str {
        match self {
            Horizon::Day => "1 day",
            Horizon::Week => "1 week",
            Horizon::Month => "1 month",
            Horizon::Year => "1 year",
            Horizon::FiveYears => "5 years",
            Horizon::TenYears => "10 years",
        }
    }

    /// Whether this horizon is served by the recursive model rollout.
    pub fn is_short(self) -> bool {
        self.days() <= SHORT_HORIZON_MAX_DAYS
    }
}

/// One horizon's forecast entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub horizon: Horizon,
    /// Target calendar date (call time plus the horizon's days).
    pub date: NaiveDate,
    /// Predicted primary price. `None` when the horizon's guard failed and
    /// the value is reported as unavailable rather than fabricated.
    pub price: Option<f64>,
}

/// Multi-horizon forecast batch. Derived output, never persisted: rerunning
/// inference on the same artifacts and history reproduces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Last stored primary price, for reference.
    pub current_price: f64,
    /// Date of the last stored observation.
    pub current_date: NaiveDate,
    /// One entry per horizon, in [`Horizon::ALL`] order.
    pub horizons: Vec<HorizonForecast>,
}

/// Training hyperparameters. Defaults match the production run; the CLI can
/// override the schedule knobs while layer widths stay fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Epochs without improvement tolerated before stopping early.
    pub patience: usize,
    pub learning_rate: f64,
    /// Dropout probability applied between recurrent layers and before the
    /// dense head, training only. Must be in `[0, 1)`.
    pub dropout: f64,
    /// Hidden widths of the stacked recurrent layers, widest first.
    pub lstm_units: [usize; 2],
    /// Width of the intermediate dense layer.
    pub dense_units: usize,
    /// Seed for weight init, shuffling and dropout. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            batch_size: 32,
            patience: 10,
            learning_rate: 1e-3,
            dropout: 0.2,
            lstm_units: [128, 64],
            dense_units: 32,
            seed: None,
        }
    }
}

/// Diagnostics from a completed training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Observations the run was fitted on.
    pub rows: usize,
    /// Supervised windows built from those observations.
    pub windows: usize,
    /// Epochs actually executed (may be fewer than configured).
    pub epochs_run: usize,
    /// Epoch index (0-based) of the restored best weights.
    pub best_epoch: usize,
    pub best_loss: f64,
    /// Loss of the last executed epoch, before the best-weight restore.
    pub final_loss: f64,
    /// Mean squared error per epoch, in execution order.
    pub losses: Vec<f64>,
    pub stopped_early: bool,
}

/// Fit quality summary persisted with the model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainQuality {
    pub best_loss: f64,
    pub epochs_run: usize,
    pub windows: usize,
}
