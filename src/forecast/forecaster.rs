//! Multi-horizon price forecasting.
//!
//! Two regimes, split at [`SHORT_HORIZON_MAX_DAYS`]:
//!
//! - short horizons roll the sequence model forward one day at a time,
//!   feeding each prediction back into the window
//! - long horizons extrapolate a daily compound growth rate estimated from
//!   up to a year of history, without touching the model
//!
//! Horizons degrade independently: a failed guard nulls that horizon's
//! value and leaves the others standing. A failure in the model path is a
//! hard error for the whole call.

use chrono::{Duration, Local};
use nalgebra::{DMatrix, RowDVector};
use tracing::warn;

use crate::domain::{
    ForecastResult, Horizon, HorizonForecast, NormalizationState, Observation, PRIMARY_FEATURE,
    SHORT_HORIZON_MAX_DAYS,
};
use crate::error::{AppError, ErrorKind};
use crate::model::SequenceModel;
use crate::prep::normalize;

/// Longest lookback, in rows, for the growth-rate estimate.
const GROWTH_LOOKBACK_DAYS: usize = 365;

/// One-step prediction over a normalized window.
///
/// [`SequenceModel`] is the production implementation; tests substitute
/// counting stubs to pin down the rollout's exact step behavior.
pub trait StepPredictor {
    fn window_size(&self) -> usize;
    fn predict_step(&self, window: &DMatrix<f64>) -> Result<f64, AppError>;
}

impl StepPredictor for SequenceModel {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn predict_step(&self, window: &DMatrix<f64>) -> Result<f64, AppError> {
        SequenceModel::predict_step(self, window)
    }
}

/// Produce the full horizon batch from fitted artifacts and stored history.
pub fn forecast<M: StepPredictor>(
    model: &M,
    state: &NormalizationState,
    history: &[Observation],
) -> Result<ForecastResult, AppError> {
    let window_size = model.window_size();
    let Some(last) = history.last() else {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            "Cannot forecast from an empty history.",
        ));
    };
    if history.len() < window_size {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            format!(
                "Need at least {window_size} observations to seed the rollout; have {}.",
                history.len()
            ),
        ));
    }

    let scaled = normalize::apply(history, state);
    let seed: Vec<RowDVector<f64>> = (history.len() - window_size..history.len())
        .map(|r| scaled.row(r).into_owned())
        .collect();

    let today = Local::now().date_naive();
    let mut horizons = Vec::with_capacity(Horizon::ALL.len());
    for horizon in Horizon::ALL {
        let price = if horizon.is_short() {
            Some(rollout(model, state, &seed, horizon.days())?)
        } else {
            let value = compound_growth(history, horizon.days());
            if value.is_none() {
                warn!(
                    horizon = horizon.label(),
                    rows = history.len(),
                    "growth guard failed; horizon reported as unavailable"
                );
            }
            value
        };
        horizons.push(HorizonForecast {
            horizon,
            date: today + Duration::days(horizon.days()),
            price,
        });
    }

    Ok(ForecastResult {
        current_price: last.mcx_gold_price,
        current_date: last.timestamp.date(),
        horizons,
    })
}

/// Recursive rollout: one model step per day.
///
/// Each synthesized row copies the previous row's non-primary features and
/// substitutes the predicted scaled primary, so secondary features stay
/// frozen at their last observed values for the whole rollout.
fn rollout<M: StepPredictor>(
    model: &M,
    state: &NormalizationState,
    seed: &[RowDVector<f64>],
    days: i64,
) -> Result<f64, AppError> {
    let mut rows = seed.to_vec();
    let mut last_scaled = 0.0;
    for _ in 0..days {
        let window = DMatrix::from_rows(&rows);
        let pred = model.predict_step(&window)?;
        let mut next = match rows.last() {
            Some(r) => r.clone(),
            None => {
                return Err(AppError::new(
                    ErrorKind::Runtime,
                    "Rollout window is empty.",
                ));
            }
        };
        next[PRIMARY_FEATURE] = pred;
        rows.remove(0);
        rows.push(next);
        last_scaled = pred;
    }
    Ok(normalize::invert(state, last_scaled))
}

/// Compound-growth extrapolation for long horizons.
///
/// `rate = (price[last] / price[len - lookback]) ^ (1 / lookback) - 1` with
/// `lookback = min(365, len - 1)`. Returns `None` when the series is too
/// short (30 rows or fewer) or the reference price is not positive.
fn compound_growth(history: &[Observation], days: i64) -> Option<f64> {
    let n = history.len();
    if n <= SHORT_HORIZON_MAX_DAYS as usize {
        return None;
    }
    let lookback = GROWTH_LOOKBACK_DAYS.min(n - 1);
    let current = history[n - 1].mcx_gold_price;
    let reference = history[n - lookback].mcx_gold_price;
    if reference <= 0.0 || current <= 0.0 {
        return None;
    }
    let rate = (current / reference).powf(1.0 / lookback as f64) - 1.0;
    let value = current * (1.0 + rate).powf(days as f64);
    value.is_finite().then_some(value)
}
