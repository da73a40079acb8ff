use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::db::{DataSource, GatewayError, Row};

use super::types::*;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("No data found in '{0}' table")]
    NoData(&'static str),
    #[error("unexpected report row: {0}")]
    Decode(#[from] serde_json::Error),
}

type ReportResult<T> = Result<T, ReportError>;

// ============================================================
// Fixed report SQL
// ============================================================

const PATIENT_COUNT_SQL: &str = "
SELECT COUNT(patient_id) AS number_of_patients
FROM public.patient";

const INTAKES_SQL: &str = "
SELECT
  COUNT(*) AS total_intakes,
  SUM(CASE WHEN readmission_within_72 = 1 THEN 1 ELSE 0 END) AS intakes_within_72_hours,
  SUM(CASE WHEN readmission_within_30 = 1 THEN 1 ELSE 0 END) AS intakes_within_30_days
FROM public.intakes";

const DISCHARGES_SQL: &str = "
SELECT
  COUNT(*) AS total_discharges,
  SUM(CASE WHEN last_service_used = 'hospital' THEN 1 ELSE 0 END) AS discharges_hospital,
  SUM(CASE WHEN last_service_used = 'higher level' THEN 1 ELSE 0 END) AS discharges_higher_level,
  SUM(CASE WHEN last_service_used = 'home community' THEN 1 ELSE 0 END) AS discharges_home_community,
  SUM(CASE WHEN last_service_used = 'undesirable circumstances' THEN 1 ELSE 0 END) AS discharges_undesirable_circumstances,
  SUM(CASE WHEN last_service_used = 'unknown' THEN 1 ELSE 0 END) AS discharges_unknown
FROM public.discharges";

const AVERAGE_STAY_SQL: &str =
    "SELECT AVG(length_of_stay) AS average_length_of_stay FROM public.patient";

/// Discharge outcomes per value of one patient attribute, plus a roll-up row labelled `total`.
fn discharge_breakdown_sql(dimension: &str, with_total_column: bool) -> String {
    let total = if with_total_column {
        ",\n  COUNT(d.patient_id) AS total"
    } else {
        ""
    };
    format!(
        "
SELECT
  COALESCE(p.{dim}, 'total') AS {dim},
  COUNT(d.patient_id) AS discharge_count,
  SUM(d.higher_level) AS total_higher_level,
  SUM(d.home_community) AS total_home_community,
  SUM(d.hospital) AS total_hospital,
  SUM(d.undesirable_circumstances) AS total_undesirable_circumstances{total}
FROM public.patient p
JOIN public.discharges d ON p.patient_id = d.patient_id
GROUP BY ROLLUP (p.{dim})
ORDER BY p.{dim}",
        dim = dimension,
        total = total
    )
}

// ============================================================
// Row helpers
// ============================================================

/// Decode the first row, requiring `key` to be present.
fn single_row<T: DeserializeOwned>(
    rows: Vec<Row>,
    key: &str,
    table: &'static str,
) -> ReportResult<T> {
    let row = rows
        .into_iter()
        .next()
        .filter(|row| row.contains_key(key))
        .ok_or(ReportError::NoData(table))?;
    Ok(serde_json::from_value(JsonValue::Object(row))?)
}

fn all_rows<T: DeserializeOwned>(rows: Vec<Row>) -> ReportResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(JsonValue::Object(row)).map_err(ReportError::from))
        .collect()
}

// ============================================================
// Patients, intakes & discharges
// ============================================================

pub async fn get_patient_count(source: &dyn DataSource) -> ReportResult<PatientCountResponse> {
    let rows = source.execute_query(PATIENT_COUNT_SQL).await?;
    single_row(rows, "number_of_patients", "patient")
}

pub async fn get_intakes(source: &dyn DataSource) -> ReportResult<IntakesResponse> {
    let rows = source.execute_query(INTAKES_SQL).await?;
    single_row(rows, "total_intakes", "intakes")
}

pub async fn get_discharges(source: &dyn DataSource) -> ReportResult<DischargesResponse> {
    let rows = source.execute_query(DISCHARGES_SQL).await?;
    single_row(rows, "total_discharges", "discharges")
}

pub async fn get_average_length_of_stay(
    source: &dyn DataSource,
) -> ReportResult<AverageLengthOfStayResponse> {
    let rows = source.execute_query(AVERAGE_STAY_SQL).await?;
    let resp: AverageLengthOfStayResponse = single_row(rows, "average_length_of_stay", "patient")?;
    // AVG over an empty table is NULL.
    if resp.average_length_of_stay.is_none() {
        return Err(ReportError::NoData("patient"));
    }
    Ok(resp)
}

// ============================================================
// Demographic breakdowns
// ============================================================

pub async fn get_gender_discharge(source: &dyn DataSource) -> ReportResult<Vec<GenderDischarge>> {
    let rows = source
        .execute_query(&discharge_breakdown_sql("gender", true))
        .await?;
    all_rows(rows)
}

pub async fn get_transgender_discharge(
    source: &dyn DataSource,
) -> ReportResult<Vec<TransgenderDischarge>> {
    let rows = source
        .execute_query(&discharge_breakdown_sql("transgender_identity", false))
        .await?;
    all_rows(rows)
}

pub async fn get_sexual_orientation_discharge(
    source: &dyn DataSource,
) -> ReportResult<Vec<SexualOrientationDischarge>> {
    let rows = source
        .execute_query(&discharge_breakdown_sql("sexual_orientation", false))
        .await?;
    all_rows(rows)
}

pub async fn get_race_ethnicity_discharge(
    source: &dyn DataSource,
) -> ReportResult<Vec<RaceEthnicityDischarge>> {
    let rows = source
        .execute_query(&discharge_breakdown_sql("race_or_ethnicity", false))
        .await?;
    all_rows(rows)
}
