use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::queries::{self, ReportError};
use super::types::*;
use super::AppState;
use crate::anomaly::{AnomalyReport, ScanError};
use crate::pipeline::{OutputFormat, QueryAnswer, QueryError};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

fn report_error(e: ReportError) -> ApiError {
    match e {
        ReportError::NoData(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        other => {
            tracing::error!(error = %other, "Report query failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn query_error(e: QueryError) -> ApiError {
    match e {
        QueryError::InvalidFormat(_) | QueryError::EmptyQuery => {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        other => {
            tracing::error!(error = %other, "Natural-language query failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn scan_error(e: ScanError) -> ApiError {
    tracing::error!(kind = e.kind(), error = %e, "Anomaly detection failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ============================================================
// Natural-language query
// ============================================================

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<QueryAnswer> {
    tracing::info!(user_query = %request.user_query, format = %request.format, "Received user query");
    let format: OutputFormat = request.format.parse().map_err(query_error)?;
    state
        .pipeline
        .answer(&request.user_query, format)
        .await
        .map(Json)
        .map_err(query_error)
}

// ============================================================
// Anomalies
// ============================================================

pub async fn detect_anomalies(State(state): State<Arc<AppState>>) -> ApiResult<AnomalyReport> {
    state
        .scanner
        .detect(state.source.as_ref())
        .await
        .map(Json)
        .map_err(scan_error)
}

// ============================================================
// Reports
// ============================================================

pub async fn num_clients(State(state): State<Arc<AppState>>) -> ApiResult<PatientCountResponse> {
    queries::get_patient_count(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn intakes(State(state): State<Arc<AppState>>) -> ApiResult<IntakesResponse> {
    queries::get_intakes(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn discharges(State(state): State<Arc<AppState>>) -> ApiResult<DischargesResponse> {
    queries::get_discharges(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn average_length_of_stay(
    State(state): State<Arc<AppState>>,
) -> ApiResult<AverageLengthOfStayResponse> {
    queries::get_average_length_of_stay(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn gender_discharge(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<GenderDischarge>> {
    queries::get_gender_discharge(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn transgender_discharge(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<TransgenderDischarge>> {
    queries::get_transgender_discharge(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn sexual_orientation_discharge(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<SexualOrientationDischarge>> {
    queries::get_sexual_orientation_discharge(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}

pub async fn race_ethnicity_discharge(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<RaceEthnicityDischarge>> {
    queries::get_race_ethnicity_discharge(state.source.as_ref())
        .await
        .map(Json)
        .map_err(report_error)
}
