pub mod handlers;
pub mod queries;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::anomaly::AnomalyScanner;
use crate::db::DataSource;
use crate::pipeline::QueryPipeline;

/// Shared collaborators, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn DataSource>,
    pub scanner: AnomalyScanner,
    pub pipeline: QueryPipeline,
}

pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/query", post(handlers::query))
        .route("/detect_anomalies", get(handlers::detect_anomalies))
        .route("/num_clients", get(handlers::num_clients))
        .route("/intakes", get(handlers::intakes))
        .route("/discharges", get(handlers::discharges))
        .route(
            "/average_length_of_stay",
            get(handlers::average_length_of_stay),
        )
        .route("/gender_discharge", get(handlers::gender_discharge))
        .route(
            "/transgender_discharge",
            get(handlers::transgender_discharge),
        )
        .route(
            "/sexual_orientation_discharge",
            get(handlers::sexual_orientation_discharge),
        )
        .route(
            "/race_ethnicity_discharge",
            get(handlers::race_ethnicity_discharge),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
