//! CSV exports: the unit-corrected working copy and forecast tables.
//!
//! The exports are meant to be easy to consume in spreadsheets or
//! downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{ForecastResult, Observation};
use crate::error::{AppError, ErrorKind};

/// Write the unit-corrected (but unscaled) working copy of the history.
/// Same schema as the store, so it can be diffed against the raw file.
pub fn write_normalized_csv(path: &Path, observations: &[Observation]) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            ErrorKind::Input,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })?;

    writeln!(file, "timestamp,{}", Observation::feature_names().join(","))
        .map_err(|e| write_err(path, e))?;
    for obs in observations {
        writeln!(
            file,
            "{},{},{},{},{}",
            obs.timestamp.format("%Y-%m-%d %H:%M:%S"),
            obs.mcx_gold_price,
            obs.usd_inr,
            obs.nifty50,
            obs.news_sentiment
        )
        .map_err(|e| write_err(path, e))?;
    }
    Ok(())
}

/// Write one row per horizon. Degraded horizons keep their row with an
/// empty price cell.
pub fn write_forecast_csv(path: &Path, result: &ForecastResult) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            ErrorKind::Input,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })?;

    writeln!(file, "horizon,days,date,price").map_err(|e| write_err(path, e))?;
    for hf in &result.horizons {
        writeln!(
            file,
            "{},{},{},{}",
            hf.horizon.label(),
            hf.horizon.days(),
            hf.date,
            hf.price.map(|p| format!("{p:.2}")).unwrap_or_default(),
        )
        .map_err(|e| write_err(path, e))?;
    }
    Ok(())
}

fn write_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(
        ErrorKind::Input,
        format!("Failed to write export CSV '{}': {e}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Horizon, HorizonForecast};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("goldf-export-{tag}-{}.csv", std::process::id()))
    }

    #[test]
    fn normalized_copy_uses_the_store_schema() {
        let path = temp_path("normalized");
        let obs = Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            mcx_gold_price: 72_100.0,
            usd_inr: 83.1,
            nifty50: 21_650.0,
            news_sentiment: 0.05,
        };
        write_normalized_csv(&path, &[obs]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("timestamp,mcx_gold_price,usd_inr,nifty50,news_sentiment")
        );
        assert_eq!(
            lines.next(),
            Some("2024-01-05 00:00:00,72100,83.1,21650,0.05")
        );
        assert_eq!(lines.next(), None);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn degraded_horizons_export_empty_price_cells() {
        let path = temp_path("forecast");
        let result = ForecastResult {
            current_price: 72_000.0,
            current_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            horizons: vec![
                HorizonForecast {
                    horizon: Horizon::Day,
                    date: NaiveDate::from_ymd_opt(2024, 1, 11).unwrap(),
                    price: Some(72_050.124),
                },
                HorizonForecast {
                    horizon: Horizon::Year,
                    date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
                    price: None,
                },
            ],
        };
        write_forecast_csv(&path, &result).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "horizon,days,date,price");
        assert_eq!(lines[1], "1 day,1,2024-01-11,72050.12");
        assert_eq!(lines[2], "1 year,365,2025-01-10,");
        std::fs::remove_file(&path).ok();
    }
}
