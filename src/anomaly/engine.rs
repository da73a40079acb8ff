use crate::config::AnomalyDetectionConfig;
use crate::db::{DataSource, Row};

use super::features;
use super::forest::{self, ForestParams};
use super::rules;
use super::types::{AnomalyEntry, AnomalyReport, ScanError, Series, TimeSeriesRecord};

/// Flags suspiciously low revenue and suspiciously high expenses.
///
/// Every call refits its models from scratch; no state survives between scans.
#[derive(Debug, Clone)]
pub struct AnomalyScanner {
    revenue_table: String,
    expenses_table: String,
    params: ForestParams,
}

impl AnomalyScanner {
    pub fn new(config: &AnomalyDetectionConfig) -> Self {
        Self {
            revenue_table: config.revenue_table.clone(),
            expenses_table: config.expenses_table.clone(),
            params: ForestParams {
                n_estimators: config.n_estimators,
                max_samples: config.max_samples,
                contamination: config.contamination,
                seed: config.seed,
            },
        }
    }

    pub fn query_for(&self, series: Series) -> String {
        let table = match series {
            Series::Revenue => &self.revenue_table,
            Series::Expenses => &self.expenses_table,
        };
        format!("SELECT * FROM {}", table)
    }

    /// Fetch both ledgers and scan them.
    pub async fn detect(&self, source: &dyn DataSource) -> Result<AnomalyReport, ScanError> {
        let (revenue_rows, expense_rows) = futures::future::try_join(
            self.fetch(source, Series::Revenue),
            self.fetch(source, Series::Expenses),
        )
        .await?;

        let revenue = decode_rows(Series::Revenue, &revenue_rows)?;
        let expenses = decode_rows(Series::Expenses, &expense_rows)?;

        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&revenue, &expenses))
            .await
            .map_err(|e| ScanError::ComputationError {
                series: Series::Revenue,
                reason: format!("scan task failed: {}", e),
            })?
    }

    async fn fetch(&self, source: &dyn DataSource, series: Series) -> Result<Vec<Row>, ScanError> {
        let rows = source
            .execute_query(&self.query_for(series))
            .await
            .map_err(|e| ScanError::DataUnavailable {
                series,
                reason: e.to_string(),
            })?;
        if rows.is_empty() {
            return Err(ScanError::DataUnavailable {
                series,
                reason: "query returned no rows".to_string(),
            });
        }
        Ok(rows)
    }

    /// Label both datasets independently and apply the directional policy.
    pub fn scan(
        &self,
        revenue: &[TimeSeriesRecord],
        expenses: &[TimeSeriesRecord],
    ) -> Result<AnomalyReport, ScanError> {
        Ok(AnomalyReport {
            revenue_anomalies: self.scan_series(Series::Revenue, revenue)?,
            expense_anomalies: self.scan_series(Series::Expenses, expenses)?,
        })
    }

    fn scan_series(
        &self,
        series: Series,
        records: &[TimeSeriesRecord],
    ) -> Result<Vec<AnomalyEntry>, ScanError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut matrix = features::feature_matrix(records);
        features::standardize(&mut matrix)
            .map_err(|reason| ScanError::ComputationError { series, reason })?;

        let outcome = forest::fit_predict(&matrix, &self.params);
        let anomalies = rules::retain_penalized(records, &outcome.labels, series.penalized_side());

        tracing::info!(
            series = series.as_str(),
            records = records.len(),
            threshold = outcome.threshold,
            flagged = anomalies.len(),
            "Anomaly scan complete"
        );
        Ok(anomalies)
    }
}

fn decode_rows(series: Series, rows: &[Row]) -> Result<Vec<TimeSeriesRecord>, ScanError> {
    rows.iter()
        .enumerate()
        .map(|(row, r)| {
            TimeSeriesRecord::from_row(r)
                .map_err(|reason| ScanError::MalformedInput { series, row, reason })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::types::{parse_date, RecordId};
    use crate::db::testing::StaticSource;
    use serde_json::json;

    fn scanner() -> AnomalyScanner {
        AnomalyScanner::new(&AnomalyDetectionConfig::default())
    }

    fn record(id: i64, date: &str, amount: f64) -> TimeSeriesRecord {
        TimeSeriesRecord {
            id: RecordId::Int(id),
            date: parse_date(date).unwrap(),
            amount,
        }
    }

    /// A year of steady daily amounts around `base`, with `spike` at index 150.
    fn ledger(base: f64, spike: f64) -> Vec<TimeSeriesRecord> {
        let start = parse_date("2023-01-01").unwrap();
        (0..365)
            .map(|i| {
                let wobble = ((i * 53) % 17) as f64 - 8.0;
                let amount = if i == 150 { spike } else { base + wobble };
                TimeSeriesRecord {
                    id: RecordId::Int(i + 1),
                    date: start + chrono::Duration::days(i),
                    amount,
                }
            })
            .collect()
    }

    fn median(records: &[TimeSeriesRecord]) -> f64 {
        rules::median_amount(records).unwrap()
    }

    #[test]
    fn test_flags_low_revenue_and_high_expenses() {
        let revenue = ledger(1000.0, 5.0);
        let expenses = ledger(400.0, 9000.0);
        let report = scanner().scan(&revenue, &expenses).unwrap();

        assert!(report.revenue_anomalies.iter().any(|e| e.id == RecordId::Int(151)));
        assert!(report.expense_anomalies.iter().any(|e| e.id == RecordId::Int(151)));
    }

    #[test]
    fn test_directional_policy_holds() {
        // Spikes on the "good" side must never be reported.
        let revenue = ledger(1000.0, 50_000.0);
        let expenses = ledger(400.0, 1.0);
        let report = scanner().scan(&revenue, &expenses).unwrap();

        let rev_median = median(&revenue);
        let exp_median = median(&expenses);
        assert!(report.revenue_anomalies.iter().all(|e| e.amount < rev_median));
        assert!(report.expense_anomalies.iter().all(|e| e.amount > exp_median));
        assert!(!report.revenue_anomalies.iter().any(|e| e.id == RecordId::Int(151)));
        assert!(!report.expense_anomalies.iter().any(|e| e.id == RecordId::Int(151)));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let revenue = ledger(1000.0, 5.0);
        let expenses = ledger(400.0, 9000.0);
        let first = scanner().scan(&revenue, &expenses).unwrap();
        let second = scanner().scan(&revenue, &expenses).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_three_record_example() {
        let revenue = vec![
            record(1, "2024-01-01", 100.0),
            record(2, "2024-01-02", 100.0),
            record(3, "2024-01-03", 5.0),
        ];
        let expenses = ledger(400.0, 9000.0);
        let report = scanner().scan(&revenue, &expenses).unwrap();
        // Only id 3 sits below the median of 100.
        assert!(report
            .revenue_anomalies
            .iter()
            .all(|e| e.id == RecordId::Int(3)));
    }

    #[test]
    fn test_zero_variance_amount_is_an_error() {
        let revenue = vec![record(1, "2024-01-01", 100.0), record(2, "2024-01-02", 100.0)];
        let err = scanner().scan(&revenue, &ledger(400.0, 9000.0)).unwrap_err();
        assert!(matches!(
            err,
            ScanError::ComputationError { series: Series::Revenue, .. }
        ));
        assert_eq!(err.kind(), "computation_error");
    }

    #[test]
    fn test_single_record_is_an_error() {
        let expenses = vec![record(1, "2024-01-01", 100.0)];
        let err = scanner().scan(&ledger(1000.0, 5.0), &expenses).unwrap_err();
        assert!(matches!(
            err,
            ScanError::ComputationError { series: Series::Expenses, .. }
        ));
    }

    #[test]
    fn test_empty_side_yields_empty_list() {
        let report = scanner().scan(&[], &ledger(400.0, 9000.0)).unwrap();
        assert!(report.revenue_anomalies.is_empty());
        assert!(!report.expense_anomalies.is_empty());
    }

    #[test]
    fn test_nothing_flagged_serializes_empty_arrays() {
        // Both spikes sit on the harmless side, so nothing survives the filter.
        let report = scanner()
            .scan(&ledger(1000.0, 50_000.0), &ledger(400.0, 1.0))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["revenue_anomalies"].is_array());
        assert!(json["expenses_anomalies"].is_array());
    }

    fn ledger_rows(base: f64, spike: f64) -> Vec<serde_json::Value> {
        ledger(base, spike)
            .into_iter()
            .map(|r| {
                let id = serde_json::to_value(&r.id).unwrap();
                json!({
                    "id": id,
                    "date": r.date.format("%Y-%m-%d").to_string(),
                    "amount": r.amount,
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_detect_issues_two_fixed_queries() {
        let source = StaticSource::new()
            .with("FROM Revenue", ledger_rows(1000.0, 5.0))
            .with("FROM Expenses", ledger_rows(400.0, 9000.0));

        let report = scanner().detect(&source).await.unwrap();
        assert!(report.revenue_anomalies.iter().any(|e| e.id == RecordId::Int(151)));

        let mut queries = source.queries();
        queries.sort();
        assert_eq!(queries, vec!["SELECT * FROM Expenses", "SELECT * FROM Revenue"]);
    }

    #[tokio::test]
    async fn test_detect_empty_table_is_unavailable() {
        let source = StaticSource::new().with("FROM Revenue", ledger_rows(1000.0, 5.0));
        let err = scanner().detect(&source).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::DataUnavailable { series: Series::Expenses, .. }
        ));
    }

    #[tokio::test]
    async fn test_detect_unreachable_source() {
        let err = scanner().detect(&StaticSource::unreachable()).await.unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }

    #[tokio::test]
    async fn test_detect_malformed_row() {
        let mut rows = ledger_rows(1000.0, 5.0);
        rows[10] = json!({"id": 11, "date": "not a date", "amount": 1.0});
        let source = StaticSource::new()
            .with("FROM Revenue", rows)
            .with("FROM Expenses", ledger_rows(400.0, 9000.0));

        let err = scanner().detect(&source).await.unwrap_err();
        match err {
            ScanError::MalformedInput { series, row, .. } => {
                assert_eq!(series, Series::Revenue);
                assert_eq!(row, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
