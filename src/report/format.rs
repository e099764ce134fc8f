//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the pipeline stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{ForecastResult, NormalizationState, TrainReport};
use crate::io::store::LoadedSeries;

/// Format the training run summary (dataset stats + fit diagnostics).
pub fn format_run_summary(
    series: &LoadedSeries,
    state: &NormalizationState,
    report: &TrainReport,
) -> String {
    let mut out = String::new();

    out.push_str("=== goldf - Gold Price Forecast (MCX) ===\n");
    out.push_str(&format!(
        "Rows: read={} used={} skipped={} filled_cells={}\n",
        series.rows_read,
        series.observations.len(),
        series.row_errors.len(),
        series.filled_cells
    ));
    if let (Some(first), Some(last)) = (series.observations.first(), series.observations.last()) {
        out.push_str(&format!(
            "Span: {} .. {}\n",
            first.timestamp.date(),
            last.timestamp.date()
        ));
    }

    match state.unit_transition {
        Some(idx) => out.push_str(&format!(
            "Unit correction: x{:.4} applied to rows before index {idx}\n",
            state.unit_correction_factor
        )),
        None => out.push_str("Unit correction: none\n"),
    }

    out.push_str("\nTraining:\n");
    out.push_str(&format!(
        "- windows: {} (window size {})\n",
        report.windows,
        report.rows.saturating_sub(report.windows)
    ));
    out.push_str(&format!(
        "- epochs: {} run, best at {}{}\n",
        report.epochs_run,
        report.best_epoch,
        if report.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    ));
    out.push_str(&format!(
        "- loss: first={:.6} best={:.6} final={:.6}\n",
        report.losses.first().copied().unwrap_or(f64::NAN),
        report.best_loss,
        report.final_loss
    ));
    out.push('\n');

    out
}

/// Format the multi-horizon forecast table. Degraded horizons render as
/// `n/a` instead of dropping out of the table.
pub fn format_forecast_table(result: &ForecastResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Current price: {} INR/10g (as of {})\n\n",
        fmt_price(result.current_price),
        result.current_date
    ));

    out.push_str(
        format!("{:<10} {:>12} {:>16}\n", "horizon", "date", "price").trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<12} {:-<16}\n", "", "", "").trim_end());
    out.push('\n');

    for hf in &result.horizons {
        let price = match hf.price {
            Some(p) => fmt_price(p),
            None => "n/a".to_string(),
        };
        out.push_str(
            format!("{:<10} {:>12} {:>16}\n", hf.horizon.label(), hf.date.to_string(), price)
                .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_price(v: f64) -> String {
    format!("{v:.2}")
}
