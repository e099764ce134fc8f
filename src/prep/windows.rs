//! Supervised window construction for the sequence model.

use nalgebra::DMatrix;

use crate::domain::{PRIMARY_FEATURE, Window};

/// Slice a normalized feature matrix into overlapping training windows.
///
/// Window `k` covers rows `[k, k + window_size)` and is labeled with the
/// primary value of row `k + window_size`, so `n` rows yield
/// `max(0, n - window_size)` windows. Order is chronological; the caller
/// decides whether to shuffle. There is no train/validation split: every
/// window is a training window.
pub fn build(matrix: &DMatrix<f64>, window_size: usize) -> Vec<Window> {
    let n = matrix.nrows();
    if window_size == 0 || n <= window_size {
        return Vec::new();
    }

    (0..n - window_size)
        .map(|k| Window {
            rows: matrix.rows(k, window_size).into_owned(),
            label: matrix[(k + window_size, PRIMARY_FEATURE)],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FEATURE_COUNT;

    fn ramp_matrix(rows: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, FEATURE_COUNT, |r, c| r as f64 + 0.1 * c as f64)
    }

    #[test]
    fn window_count_is_rows_minus_size() {
        for (rows, expect) in [(0, 0), (4, 0), (5, 0), (6, 1), (10, 5), (100, 95)] {
            let m = ramp_matrix(rows);
            assert_eq!(build(&m, 5).len(), expect, "rows = {rows}");
        }
    }

    #[test]
    fn windows_are_chronological_with_next_row_labels() {
        let m = ramp_matrix(9);
        let windows = build(&m, 5);
        assert_eq!(windows.len(), 4);
        for (k, w) in windows.iter().enumerate() {
            assert_eq!(w.rows.nrows(), 5);
            assert_eq!(w.rows.ncols(), FEATURE_COUNT);
            // First row of window k is matrix row k.
            assert_eq!(w.rows[(0, 0)], k as f64);
            assert_eq!(w.rows[(4, 0)], (k + 4) as f64);
            assert_eq!(w.label, (k + 5) as f64);
        }
    }

    #[test]
    fn last_row_is_never_a_label_source_twice() {
        let m = ramp_matrix(7);
        let windows = build(&m, 5);
        // Rows 5 and 6 serve as labels; row 6 never starts a window.
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].label, 6.0);
    }
}
