//! Debug bundle writer for inspecting a full pipeline run.
//!
//! The bundle is a markdown file under `debug/` capturing what the run saw:
//! store statistics, skipped rows, the fitted normalization state, training
//! diagnostics, and the forecast table. Handy when a forecast looks off and
//! the question is "what did the model actually train on".

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

use crate::domain::{ForecastResult, NormalizationState, Observation, TrainReport};
use crate::error::{AppError, ErrorKind};
use crate::io::store::LoadedSeries;

/// Row errors listed in full up to this count; the rest are summarized.
const MAX_LISTED_ROW_ERRORS: usize = 25;

/// Trailing epochs shown from the loss history.
const LOSS_TAIL: usize = 10;

pub fn write_debug_bundle(
    series: &LoadedSeries,
    state: &NormalizationState,
    report: Option<&TrainReport>,
    forecast: Option<&ForecastResult>,
) -> Result<PathBuf, AppError> {
    let dir = PathBuf::from("debug");
    create_dir_all(&dir)
        .map_err(|e| AppError::new(ErrorKind::Runtime, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let data_date = series
        .observations
        .last()
        .map(|o| o.timestamp.date().format("%Y%m%d").to_string())
        .unwrap_or_else(|| "nodata".to_string());
    let path = dir.join(format!("goldf_debug_{data_date}_{ts}.md"));

    let mut file = File::create(&path)
        .map_err(|e| AppError::new(ErrorKind::Runtime, format!("Failed to create debug file: {e}")))?;

    writeln!(file, "# goldf debug bundle").map_err(write_err)?;
    writeln!(file, "- generated: {}", Local::now().to_rfc3339()).map_err(write_err)?;
    writeln!(
        file,
        "- rows: read={} used={} skipped={} filled_cells={}",
        series.rows_read,
        series.observations.len(),
        series.row_errors.len(),
        series.filled_cells
    )
    .map_err(write_err)?;
    if let (Some(first), Some(last)) = (series.observations.first(), series.observations.last()) {
        writeln!(file, "- span: {} .. {}", first.timestamp.date(), last.timestamp.date())
            .map_err(write_err)?;
    }

    if !series.row_errors.is_empty() {
        writeln!(file, "\n## Skipped rows").map_err(write_err)?;
        writeln!(file, "| line | timestamp | reason |").map_err(write_err)?;
        writeln!(file, "| - | - | - |").map_err(write_err)?;
        for err in series.row_errors.iter().take(MAX_LISTED_ROW_ERRORS) {
            writeln!(
                file,
                "| {} | {} | {} |",
                err.line,
                err.timestamp.as_deref().unwrap_or("-"),
                err.message
            )
            .map_err(write_err)?;
        }
        if series.row_errors.len() > MAX_LISTED_ROW_ERRORS {
            writeln!(
                file,
                "- ... {} more",
                series.row_errors.len() - MAX_LISTED_ROW_ERRORS
            )
            .map_err(write_err)?;
        }
    }

    writeln!(file, "\n## Normalization").map_err(write_err)?;
    match state.unit_transition {
        Some(idx) => writeln!(
            file,
            "- unit correction: factor={:.6} before row index {idx}",
            state.unit_correction_factor
        )
        .map_err(write_err)?,
        None => writeln!(file, "- unit correction: none").map_err(write_err)?,
    }
    writeln!(file, "- fitted_rows: {}", state.fitted_rows).map_err(write_err)?;
    writeln!(file, "\n| feature | min | max |").map_err(write_err)?;
    writeln!(file, "| - | - | - |").map_err(write_err)?;
    for (name, range) in Observation::feature_names().iter().zip(state.ranges.iter()) {
        writeln!(file, "| {} | {:.6} | {:.6} |", name, range.min, range.max).map_err(write_err)?;
    }

    if let Some(report) = report {
        writeln!(file, "\n## Training").map_err(write_err)?;
        writeln!(file, "- windows: {}", report.windows).map_err(write_err)?;
        writeln!(
            file,
            "- epochs: {} run, best at {} (stopped_early={})",
            report.epochs_run, report.best_epoch, report.stopped_early
        )
        .map_err(write_err)?;
        writeln!(
            file,
            "- loss: best={:.8} final={:.8}",
            report.best_loss, report.final_loss
        )
        .map_err(write_err)?;
        let tail_start = report.losses.len().saturating_sub(LOSS_TAIL);
        writeln!(
            file,
            "- loss tail (last {}): {}",
            report.losses.len() - tail_start,
            fmt_vec(&report.losses[tail_start..])
        )
        .map_err(write_err)?;
    }

    if let Some(forecast) = forecast {
        writeln!(file, "\n## Forecast").map_err(write_err)?;
        writeln!(
            file,
            "- current: {:.2} INR/10g as of {}",
            forecast.current_price, forecast.current_date
        )
        .map_err(write_err)?;
        writeln!(file, "\n| horizon | date | price |").map_err(write_err)?;
        writeln!(file, "| - | - | - |").map_err(write_err)?;
        for hf in &forecast.horizons {
            writeln!(
                file,
                "| {} | {} | {} |",
                hf.horizon.label(),
                hf.date,
                fmt_opt(hf.price)
            )
            .map_err(write_err)?;
        }
    }

    Ok(path)
}

fn write_err(e: std::io::Error) -> AppError {
    AppError::new(ErrorKind::Runtime, format!("Failed to write debug bundle: {e}"))
}

fn fmt_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.8}")).collect();
    format!("[{}]", parts.join(", "))
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.2}"),
        _ => "-".to_string(),
    }
}
