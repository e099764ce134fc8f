//! Normalization: detect price-unit discontinuities, correct them on a
//! working copy, and scale features into `[0, 1]`.
//!
//! The store itself is never modified. `fit` captures everything needed to
//! replay the transform (`NormalizationState`), `apply` produces the scaled
//! matrix the model consumes, and `invert` maps a scaled primary value back
//! to the price unit.

use nalgebra::DMatrix;

use crate::domain::{
    FEATURE_COUNT, FeatureRange, MIN_TRAIN_ROWS, NormalizationState, Observation, PRIMARY_FEATURE,
};
use crate::error::{AppError, ErrorKind};

/// A primary series whose max/min ratio exceeds this is suspected of mixing
/// two quote units (e.g. per-gram history continued per 10 grams).
///
/// Heuristic: a genuine >100x move inside one series would trip it too, and
/// there is no recovery path besides fixing the stored data.
pub const UNIT_JUMP_GUARD_RATIO: f64 = 100.0;

/// Consecutive-row ratio that marks the first row of the later unit during
/// the transition scan.
pub const UNIT_JUMP_SCAN_THRESHOLD: f64 = 50.0;

/// Fit normalization parameters over the full history.
///
/// Requires at least [`MIN_TRAIN_ROWS`] observations. Bounds are computed on
/// the unit-corrected copy so both transform and model see one consistent
/// price unit.
pub fn fit(history: &[Observation]) -> Result<NormalizationState, AppError> {
    if history.len() < MIN_TRAIN_ROWS {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            format!(
                "Need at least {MIN_TRAIN_ROWS} observations to fit normalization; have {}.",
                history.len()
            ),
        ));
    }

    let prices: Vec<f64> = history.iter().map(|o| o.mcx_gold_price).collect();
    for (idx, p) in prices.iter().enumerate() {
        if !p.is_finite() {
            return Err(AppError::new(
                ErrorKind::Runtime,
                format!("Non-finite primary price at row {idx}."),
            ));
        }
    }

    let (unit_correction_factor, unit_transition) = detect_unit_jump(&prices);

    let mut ranges = [FeatureRange {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    }; FEATURE_COUNT];
    for (idx, obs) in history.iter().enumerate() {
        let mut feats = obs.features();
        feats[PRIMARY_FEATURE] =
            corrected_price(feats[PRIMARY_FEATURE], idx, unit_correction_factor, unit_transition);
        for (f, range) in feats.iter().zip(ranges.iter_mut()) {
            range.min = range.min.min(*f);
            range.max = range.max.max(*f);
        }
    }

    Ok(NormalizationState {
        unit_correction_factor,
        unit_transition,
        ranges,
        fitted_rows: history.len(),
    })
}

/// Scale the history into a `rows x FEATURE_COUNT` matrix in `[0, 1]` using
/// previously fitted state. Values outside the fitted bounds land outside
/// `[0, 1]` rather than being clamped.
pub fn apply(history: &[Observation], state: &NormalizationState) -> DMatrix<f64> {
    DMatrix::from_fn(history.len(), FEATURE_COUNT, |row, col| {
        let mut v = history[row].features()[col];
        if col == PRIMARY_FEATURE {
            v = corrected_price(v, row, state.unit_correction_factor, state.unit_transition);
        }
        scale(v, state.ranges[col])
    })
}

/// Map a scaled primary value back to the (unit-corrected) price unit.
pub fn invert(state: &NormalizationState, scaled_primary: f64) -> f64 {
    let range = state.ranges[PRIMARY_FEATURE];
    range.min + scaled_primary * range.span()
}

/// Unit-corrected copy of the history, unscaled. This is the working copy
/// exported as the "normalized" CSV; the raw store stays untouched.
pub fn corrected_copy(history: &[Observation], state: &NormalizationState) -> Vec<Observation> {
    history
        .iter()
        .enumerate()
        .map(|(idx, obs)| {
            let mut out = obs.clone();
            out.mcx_gold_price = corrected_price(
                obs.mcx_gold_price,
                idx,
                state.unit_correction_factor,
                state.unit_transition,
            );
            out
        })
        .collect()
}

/// Detect a single price-unit discontinuity.
///
/// Two stages: a global guard (max/min ratio above [`UNIT_JUMP_GUARD_RATIO`])
/// cheaply rules out homogeneous series, then a scan finds the first row
/// whose ratio to its predecessor exceeds [`UNIT_JUMP_SCAN_THRESHOLD`]. The
/// correction factor is the ratio of segment means, so both segments end up
/// on the later unit's level.
fn detect_unit_jump(prices: &[f64]) -> (f64, Option<usize>) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in prices {
        min = min.min(*p);
        max = max.max(*p);
    }
    if !(min > 0.0) || max / min <= UNIT_JUMP_GUARD_RATIO {
        return (1.0, None);
    }

    for i in 1..prices.len() {
        if prices[i] / prices[i - 1] > UNIT_JUMP_SCAN_THRESHOLD {
            let pre = mean(&prices[..i]);
            let post = mean(&prices[i..]);
            if pre > 0.0 {
                return (post / pre, Some(i));
            }
            return (1.0, None);
        }
    }

    // Guard tripped but no single-step jump found: a wide but continuous
    // series, leave it alone.
    (1.0, None)
}

fn corrected_price(price: f64, row: usize, factor: f64, transition: Option<usize>) -> f64 {
    match transition {
        Some(t) if row < t => price * factor,
        _ => price,
    }
}

fn scale(value: f64, range: FeatureRange) -> f64 {
    let span = range.span();
    if span <= 0.0 {
        // Constant feature: pin to the bottom of the unit interval.
        return 0.0;
    }
    (value - range.min) / span
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(day: u32, price: f64) -> Observation {
        Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::days(day as i64),
            mcx_gold_price: price,
            usd_inr: 83.0 + 0.01 * day as f64,
            nifty50: 21_000.0 + 5.0 * day as f64,
            news_sentiment: 0.05,
        }
    }

    fn smooth_history(n: u32) -> Vec<Observation> {
        (0..n).map(|i| obs(i, 72_000.0 + 30.0 * i as f64)).collect()
    }

    #[test]
    fn fit_rejects_short_history() {
        let history = smooth_history(49);
        let err = fit(&history).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn smooth_series_gets_no_correction_and_round_trips() {
        let history = smooth_history(60);
        let state = fit(&history).unwrap();
        assert_eq!(state.unit_correction_factor, 1.0);
        assert_eq!(state.unit_transition, None);
        assert_eq!(state.fitted_rows, 60);

        let scaled = apply(&history, &state);
        assert_eq!(scaled.nrows(), 60);
        assert_eq!(scaled.ncols(), FEATURE_COUNT);
        for row in 0..60 {
            let back = invert(&state, scaled[(row, PRIMARY_FEATURE)]);
            let raw = history[row].mcx_gold_price;
            assert!(
                (back - raw).abs() < 1e-6 * raw,
                "round trip drifted at row {row}: {back} vs {raw}"
            );
        }
    }

    #[test]
    fn scaled_features_cover_unit_interval() {
        let history = smooth_history(60);
        let state = fit(&history).unwrap();
        let scaled = apply(&history, &state);
        assert!((scaled[(0, PRIMARY_FEATURE)] - 0.0).abs() < 1e-12);
        assert!((scaled[(59, PRIMARY_FEATURE)] - 1.0).abs() < 1e-12);
        for row in 0..60 {
            for col in 0..FEATURE_COUNT {
                let v = scaled[(row, col)];
                assert!((-1e-12..=1.0 + 1e-12).contains(&v), "out of range at ({row},{col}): {v}");
            }
        }
    }

    #[test]
    fn constant_feature_scales_to_zero() {
        // news_sentiment is the same for every row in the fixture.
        let history = smooth_history(55);
        let state = fit(&history).unwrap();
        let scaled = apply(&history, &state);
        for row in 0..55 {
            assert_eq!(scaled[(row, 3)], 0.0);
        }
    }

    #[test]
    fn detects_unit_jump_and_corrects_prefix() {
        // Rows 0..10 quoted in the old unit, a 100x step at row 10.
        let mut history = Vec::new();
        for i in 0..10u32 {
            history.push(obs(i, 720.0 + 0.5 * i as f64));
        }
        for i in 10..60u32 {
            history.push(obs(i, 72_500.0 + 50.0 * (i - 10) as f64));
        }

        let state = fit(&history).unwrap();
        assert_eq!(state.unit_transition, Some(10));
        assert!(
            state.unit_correction_factor > 90.0 && state.unit_correction_factor < 110.0,
            "factor {} not near the unit ratio",
            state.unit_correction_factor
        );

        let corrected = corrected_copy(&history, &state);
        let min = corrected
            .iter()
            .map(|o| o.mcx_gold_price)
            .fold(f64::INFINITY, f64::min);
        let max = corrected
            .iter()
            .map(|o| o.mcx_gold_price)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(
            max / min < UNIT_JUMP_SCAN_THRESHOLD,
            "corrected series still spans {}x",
            max / min
        );
        // Post-transition rows are untouched.
        assert_eq!(corrected[10].mcx_gold_price, history[10].mcx_gold_price);
        assert_eq!(corrected[59].mcx_gold_price, history[59].mcx_gold_price);
        // The raw history is not mutated.
        assert_eq!(history[0].mcx_gold_price, 720.0);
    }

    #[test]
    fn wide_but_continuous_series_is_left_alone() {
        // Exceeds the global guard ratio without any single-step jump.
        let n = 120u32;
        let history: Vec<Observation> = (0..n)
            .map(|i| obs(i, 500.0 * 1.05f64.powi(i as i32)))
            .collect();
        let state = fit(&history).unwrap();
        assert_eq!(state.unit_transition, None);
        assert_eq!(state.unit_correction_factor, 1.0);
    }
}
