use super::types::{AnomalyEntry, AnomalyLabel, Side, TimeSeriesRecord};

/// Median of the amounts; mean of the two middle values for an even count.
pub fn median_amount(records: &[TimeSeriesRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let mut amounts: Vec<f64> = records.iter().map(|r| r.amount).collect();
    amounts.sort_by(f64::total_cmp);
    let mid = amounts.len() / 2;
    Some(if amounts.len() % 2 == 0 {
        (amounts[mid - 1] + amounts[mid]) / 2.0
    } else {
        amounts[mid]
    })
}

/// Keep outliers strictly on the penalized side of the median, in input order.
pub fn retain_penalized(
    records: &[TimeSeriesRecord],
    labels: &[AnomalyLabel],
    side: Side,
) -> Vec<AnomalyEntry> {
    let Some(median) = median_amount(records) else {
        return Vec::new();
    };

    records
        .iter()
        .zip(labels)
        .filter(|(_, label)| **label == AnomalyLabel::Outlier)
        .filter(|(record, _)| match side {
            Side::BelowMedian => record.amount < median,
            Side::AboveMedian => record.amount > median,
        })
        .map(|(record, _)| AnomalyEntry::from(record))
        .collect()
}
