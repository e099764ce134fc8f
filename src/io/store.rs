//! The observation store: an append-only CSV of daily market rows.
//!
//! Reading is deliberately tolerant:
//!
//! - headers are matched case-insensitively and in any order (BOM stripped)
//! - malformed rows are skipped and reported, never fatal
//! - empty numeric cells are forward-filled, then back-filled
//!
//! Writing is strictly append: an existing row is never rewritten.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::domain::{FEATURE_COUNT, Observation, PRIMARY_FEATURE};
use crate::error::{AppError, ErrorKind};

/// Accepted timestamp formats, tried in order. Date-only rows are read as
/// midnight.
const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const TIMESTAMP_COLUMN: &str = "timestamp";

/// A skipped input row with enough context to find it in the file.
#[derive(Debug, Clone)]
pub struct RowError {
    /// 1-based line number (the header is line 1).
    pub line: usize,
    /// The row's timestamp cell, when one was present.
    pub timestamp: Option<String>,
    pub message: String,
}

/// Result of loading the store.
#[derive(Debug, Clone, Default)]
pub struct LoadedSeries {
    /// Valid observations in stored (chronological) order.
    pub observations: Vec<Observation>,
    pub row_errors: Vec<RowError>,
    /// Data rows read before filtering.
    pub rows_read: usize,
    /// Numeric cells supplied by the gap-filling pass.
    pub filled_cells: usize,
}

pub trait ObservationStore {
    fn load(&self) -> Result<LoadedSeries, AppError>;
    fn append(&self, obs: &Observation) -> Result<(), AppError>;
}

/// File-backed store.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header_line() -> String {
        let mut cols = vec![TIMESTAMP_COLUMN];
        cols.extend(Observation::feature_names());
        cols.join(",")
    }
}

impl ObservationStore for CsvStore {
    fn load(&self) -> Result<LoadedSeries, AppError> {
        let file = File::open(&self.path).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to open data store '{}': {e}", self.path.display()),
            )
        })?;
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let headers = reader.headers().map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to read CSV header of '{}': {e}", self.path.display()),
            )
        })?;
        let header_map = build_header_map(headers);

        let ts_idx = *header_map.get(TIMESTAMP_COLUMN).ok_or_else(|| {
            AppError::new(
                ErrorKind::Input,
                format!("Missing required column '{TIMESTAMP_COLUMN}' in '{}'.", self.path.display()),
            )
        })?;
        let mut feature_idx = [0usize; FEATURE_COUNT];
        for (slot, name) in feature_idx.iter_mut().zip(Observation::feature_names()) {
            *slot = *header_map.get(name).ok_or_else(|| {
                AppError::new(
                    ErrorKind::Input,
                    format!("Missing required column '{name}' in '{}'.", self.path.display()),
                )
            })?;
        }

        let mut raw_rows: Vec<(NaiveDateTime, [Option<f64>; FEATURE_COUNT])> = Vec::new();
        let mut row_errors = Vec::new();
        let mut rows_read = 0usize;
        let mut prev_ts: Option<NaiveDateTime> = None;

        for (idx, record) in reader.records().enumerate() {
            let line = idx + 2;
            rows_read += 1;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    row_errors.push(RowError {
                        line,
                        timestamp: None,
                        message: format!("unreadable row: {e}"),
                    });
                    continue;
                }
            };

            let raw_ts = record.get(ts_idx).unwrap_or("").trim();
            let report = |message: String, row_errors: &mut Vec<RowError>| {
                row_errors.push(RowError {
                    line,
                    timestamp: (!raw_ts.is_empty()).then(|| raw_ts.to_string()),
                    message,
                });
            };

            let Some(ts) = parse_timestamp(raw_ts) else {
                report(format!("invalid timestamp '{raw_ts}'"), &mut row_errors);
                continue;
            };
            if let Some(prev) = prev_ts {
                if ts < prev {
                    report(
                        format!("timestamp '{raw_ts}' is out of order"),
                        &mut row_errors,
                    );
                    continue;
                }
            }

            let mut values = [None; FEATURE_COUNT];
            let mut bad_cell = None;
            for (col, slot) in feature_idx.iter().zip(values.iter_mut()) {
                match parse_opt_f64(record.get(*col)) {
                    Ok(v) => *slot = v,
                    Err(msg) => {
                        bad_cell = Some(msg);
                        break;
                    }
                }
            }
            if let Some(msg) = bad_cell {
                report(msg, &mut row_errors);
                continue;
            }
            if let Some(price) = values[PRIMARY_FEATURE] {
                if price <= 0.0 {
                    report(format!("non-positive primary price {price}"), &mut row_errors);
                    continue;
                }
            }

            prev_ts = Some(ts);
            raw_rows.push((ts, values));
        }

        let filled_cells = fill_gaps(&mut raw_rows, &self.path)?;

        let observations = raw_rows
            .into_iter()
            .filter_map(|(ts, values)| {
                // fill_gaps guarantees all-Some when any value existed.
                match values {
                    [Some(p), Some(u), Some(n), Some(s)] => Some(Observation {
                        timestamp: ts,
                        mcx_gold_price: p,
                        usd_inr: u,
                        nifty50: n,
                        news_sentiment: s,
                    }),
                    _ => None,
                }
            })
            .collect();

        Ok(LoadedSeries {
            observations,
            row_errors,
            rows_read,
            filled_cells,
        })
    }

    fn append(&self, obs: &Observation) -> Result<(), AppError> {
        let exists = self.path.exists();
        if !exists {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::new(
                            ErrorKind::Input,
                            format!("Failed to create '{}': {e}", parent.display()),
                        )
                    })?;
                }
            }
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| {
                AppError::new(
                    ErrorKind::Input,
                    format!("Failed to open '{}' for append: {e}", self.path.display()),
                )
            })?;

        let io_err = |e: std::io::Error| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to write '{}': {e}", self.path.display()),
            )
        };
        if !exists {
            writeln!(file, "{}", Self::header_line()).map_err(io_err)?;
        }
        writeln!(
            file,
            "{},{},{},{},{}",
            obs.timestamp.format("%Y-%m-%d %H:%M:%S"),
            obs.mcx_gold_price,
            obs.usd_inr,
            obs.nifty50,
            obs.news_sentiment
        )
        .map_err(io_err)?;
        Ok(())
    }
}

/// In-memory store for tests and dry wiring.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RefCell<Vec<Observation>>,
}

impl MemoryStore {
    pub fn new(rows: Vec<Observation>) -> Self {
        Self {
            rows: RefCell::new(rows),
        }
    }

    pub fn snapshot(&self) -> Vec<Observation> {
        self.rows.borrow().clone()
    }
}

impl ObservationStore for MemoryStore {
    fn load(&self) -> Result<LoadedSeries, AppError> {
        let rows = self.rows.borrow();
        Ok(LoadedSeries {
            observations: rows.clone(),
            row_errors: Vec::new(),
            rows_read: rows.len(),
            filled_cells: 0,
        })
    }

    fn append(&self, obs: &Observation) -> Result<(), AppError> {
        self.rows.borrow_mut().push(obs.clone());
        Ok(())
    }
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.is_empty() {
        return None;
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_opt_f64(raw: Option<&str>) -> Result<Option<f64>, String> {
    let Some(s) = raw else {
        return Ok(None);
    };
    let s = s.trim();
    if s.is_empty() || s == "." {
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Err(format!("non-finite value '{s}'")),
        Err(_) => Err(format!("invalid number '{s}'")),
    }
}

/// Forward-fill then back-fill missing cells, column by column. Errors only
/// when a required column has no usable values at all.
fn fill_gaps(
    rows: &mut [(NaiveDateTime, [Option<f64>; FEATURE_COUNT])],
    path: &Path,
) -> Result<usize, AppError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut filled = 0usize;
    for col in 0..FEATURE_COUNT {
        let mut carry: Option<f64> = None;
        for (_, values) in rows.iter_mut() {
            match values[col] {
                Some(v) => carry = Some(v),
                None => {
                    if let Some(v) = carry {
                        values[col] = Some(v);
                        filled += 1;
                    }
                }
            }
        }
        let mut carry: Option<f64> = None;
        for (_, values) in rows.iter_mut().rev() {
            match values[col] {
                Some(v) => carry = Some(v),
                None => {
                    if let Some(v) = carry {
                        values[col] = Some(v);
                        filled += 1;
                    }
                }
            }
        }
        if rows.iter().any(|(_, values)| values[col].is_none()) {
            return Err(AppError::new(
                ErrorKind::Input,
                format!(
                    "Column '{}' of '{}' has no usable values.",
                    Observation::feature_names()[col],
                    path.display()
                ),
            ));
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("goldf-store-{tag}-{}.csv", std::process::id()))
    }

    fn write_file(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_clean_rows_in_order() {
        let path = temp_path("clean");
        write_file(
            &path,
            "timestamp,mcx_gold_price,usd_inr,nifty50,news_sentiment\n\
             2024-01-01,71000,83.1,21500,0.05\n\
             2024-01-02 00:00:00,71050,83.2,21510,0.05\n",
        );
        let series = CsvStore::new(&path).load().unwrap();
        assert_eq!(series.rows_read, 2);
        assert_eq!(series.observations.len(), 2);
        assert!(series.row_errors.is_empty());
        assert_eq!(series.observations[0].mcx_gold_price, 71_000.0);
        assert_eq!(
            series.observations[1].timestamp.date(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_rows_are_skipped_and_reported() {
        let path = temp_path("malformed");
        write_file(
            &path,
            "timestamp,mcx_gold_price,usd_inr,nifty50,news_sentiment\n\
             2024-01-01,71000,83.1,21500,0.05\n\
             2024-01-02,abc,83.2,21510,0.05\n\
             2024-01-03,71100,83.3,21520,0.05\n\
             2024-01-01,71200,83.4,21530,0.05\n\
             not-a-date,71300,83.5,21540,0.05\n",
        );
        let series = CsvStore::new(&path).load().unwrap();
        assert_eq!(series.rows_read, 5);
        assert_eq!(series.observations.len(), 2);
        assert_eq!(series.row_errors.len(), 3);
        assert_eq!(series.row_errors[0].line, 3);
        assert!(series.row_errors[0].message.contains("invalid number"));
        assert!(series.row_errors[1].message.contains("out of order"));
        assert!(series.row_errors[2].message.contains("invalid timestamp"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn nonpositive_prices_are_rejected_per_row() {
        let path = temp_path("nonpositive");
        write_file(
            &path,
            "timestamp,mcx_gold_price,usd_inr,nifty50,news_sentiment\n\
             2024-01-01,0,83.1,21500,0.05\n\
             2024-01-02,71050,83.2,21510,0.05\n",
        );
        let series = CsvStore::new(&path).load().unwrap();
        assert_eq!(series.observations.len(), 1);
        assert_eq!(series.row_errors.len(), 1);
        assert!(series.row_errors[0].message.contains("non-positive"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_cells_are_forward_and_back_filled() {
        let path = temp_path("fill");
        write_file(
            &path,
            "timestamp,mcx_gold_price,usd_inr,nifty50,news_sentiment\n\
             2024-01-01,71000,,21500,0.05\n\
             2024-01-02,,83.2,,0.05\n\
             2024-01-03,71100,83.3,21520,\n",
        );
        let series = CsvStore::new(&path).load().unwrap();
        assert_eq!(series.observations.len(), 3);
        assert_eq!(series.filled_cells, 4);
        // Leading gap back-filled, interior gaps forward-filled.
        assert_eq!(series.observations[0].usd_inr, 83.2);
        assert_eq!(series.observations[1].mcx_gold_price, 71_000.0);
        assert_eq!(series.observations[1].nifty50, 21_500.0);
        assert_eq!(series.observations[2].news_sentiment, 0.05);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn headers_match_any_case_and_order_with_bom() {
        let path = temp_path("headers");
        write_file(
            &path,
            "\u{feff}USD_INR,Timestamp,NIFTY50,News_Sentiment,MCX_GOLD_PRICE\n\
             83.1,2024-01-01,21500,0.05,71000\n",
        );
        let series = CsvStore::new(&path).load().unwrap();
        assert_eq!(series.observations.len(), 1);
        let obs = &series.observations[0];
        assert_eq!(obs.mcx_gold_price, 71_000.0);
        assert_eq!(obs.usd_inr, 83.1);
        assert_eq!(obs.nifty50, 21_500.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_required_column_is_an_input_error() {
        let path = temp_path("missing-col");
        write_file(
            &path,
            "timestamp,mcx_gold_price,usd_inr,news_sentiment\n\
             2024-01-01,71000,83.1,0.05\n",
        );
        let err = CsvStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("nifty50"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn append_creates_the_file_and_round_trips() {
        let path = temp_path("append");
        std::fs::remove_file(&path).ok();
        let store = CsvStore::new(&path);
        let obs = Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            mcx_gold_price: 72_345.5,
            usd_inr: 83.25,
            nifty50: 21_800.0,
            news_sentiment: 0.05,
        };
        store.append(&obs).unwrap();
        let mut second = obs.clone();
        second.timestamp = obs.timestamp + chrono::Duration::days(1);
        second.mcx_gold_price = 72_400.0;
        store.append(&second).unwrap();

        let series = store.load().unwrap();
        assert_eq!(series.observations.len(), 2);
        assert_eq!(series.observations[0], obs);
        assert_eq!(series.observations[1], second);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn memory_store_appends_and_snapshots() {
        let store = MemoryStore::default();
        let obs = Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            mcx_gold_price: 71_500.0,
            usd_inr: 83.0,
            nifty50: 21_600.0,
            news_sentiment: 0.0,
        };
        store.append(&obs).unwrap();
        assert_eq!(store.load().unwrap().observations, vec![obs.clone()]);
        assert_eq!(store.snapshot(), vec![obs]);
    }
}
