use chrono::NaiveDateTime;

use super::types::TimeSeriesRecord;

/// Feature row: `[amount, unix_seconds]`.
pub type FeatureRow = [f64; 2];

const FEATURE_NAMES: [&str; 2] = ["amount", "timestamp"];

/// Whole seconds since the Unix epoch; sub-second precision is discarded.
pub fn unix_seconds(date: NaiveDateTime) -> i64 {
    date.and_utc().timestamp()
}

pub fn feature_matrix(records: &[TimeSeriesRecord]) -> Vec<FeatureRow> {
    records
        .iter()
        .map(|r| [r.amount, unix_seconds(r.date) as f64])
        .collect()
}

/// Z-score every column in place with population mean and standard deviation.
/// Fails when there are fewer than two rows or a column does not vary.
pub fn standardize(matrix: &mut [FeatureRow]) -> Result<(), String> {
    let n = matrix.len();
    if n < 2 {
        return Err(format!("need at least 2 records, got {}", n));
    }

    for (col, name) in FEATURE_NAMES.iter().enumerate() {
        let mean = matrix.iter().map(|row| row[col]).sum::<f64>() / n as f64;
        let variance = matrix
            .iter()
            .map(|row| (row[col] - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        let std_dev = variance.sqrt();
        if !std_dev.is_finite() || std_dev <= f64::EPSILON * mean.abs().max(1.0) {
            return Err(format!("feature '{}' has zero variance", name));
        }
        for row in matrix.iter_mut() {
            row[col] = (row[col] - mean) / std_dev;
        }
    }
    Ok(())
}
