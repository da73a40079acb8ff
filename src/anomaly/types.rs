use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::db::Row;

/// The two ledgers the scanner inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Revenue,
    Expenses,
}

impl Series {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Expenses => "expenses",
        }
    }

    /// Which side of the median counts as suspicious.
    pub fn penalized_side(&self) -> Side {
        match self {
            Self::Revenue => Side::BelowMedian,
            Self::Expenses => Side::AboveMedian,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    BelowMedian,
    AboveMedian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyLabel {
    Normal,
    Outlier,
}

/// Ledger row identifier as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

/// One row of the revenue or expenses ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub id: RecordId,
    pub date: NaiveDateTime,
    pub amount: f64,
}

impl TimeSeriesRecord {
    /// Decode a ledger row. The error names the offending column.
    pub fn from_row(row: &Row) -> Result<Self, String> {
        let id = match row.get("id") {
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .map(RecordId::Int)
                .ok_or_else(|| format!("id {} is not an integer", n))?,
            Some(JsonValue::String(s)) => RecordId::Text(s.clone()),
            Some(other) => return Err(format!("id has unsupported value {}", other)),
            None => return Err("missing column 'id'".to_string()),
        };

        let date = match row.get("date") {
            Some(JsonValue::String(s)) => {
                parse_date(s).ok_or_else(|| format!("unparseable date '{}'", s))?
            }
            Some(other) => return Err(format!("date has unsupported value {}", other)),
            None => return Err("missing column 'date'".to_string()),
        };

        let amount = match row.get("amount") {
            Some(JsonValue::Number(n)) => n.as_f64(),
            Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
            None => return Err("missing column 'amount'".to_string()),
        }
        .filter(|a| a.is_finite())
        .ok_or_else(|| format!("non-numeric amount {}", row["amount"]))?;

        Ok(Self { id, date, amount })
    }
}

/// Accepts plain dates, naive timestamps, and RFC 3339 (converted to UTC).
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    // Postgres renders timestamptz as "2024-01-01 00:00:00+00"
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|dt| dt.naive_utc())
}

/// A flagged ledger row as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyEntry {
    pub id: RecordId,
    pub date: NaiveDateTime,
    pub amount: f64,
}

impl From<&TimeSeriesRecord> for AnomalyEntry {
    fn from(record: &TimeSeriesRecord) -> Self {
        Self {
            id: record.id.clone(),
            date: record.date,
            amount: record.amount,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub revenue_anomalies: Vec<AnomalyEntry>,
    #[serde(rename = "expenses_anomalies")]
    pub expense_anomalies: Vec<AnomalyEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{series} data unavailable: {reason}")]
    DataUnavailable { series: Series, reason: String },
    #[error("malformed {series} row {row}: {reason}")]
    MalformedInput {
        series: Series,
        row: usize,
        reason: String,
    },
    #[error("cannot fit {series} model: {reason}")]
    ComputationError { series: Series, reason: String },
}

impl ScanError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::MalformedInput { .. } => "malformed_input",
            Self::ComputationError { .. } => "computation_error",
        }
    }
}
