use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parakeet_insights::anomaly::AnomalyScanner;
use parakeet_insights::api::{self, AppState};
use parakeet_insights::config::{Config, DataSourceConfig, LogFormat};
use parakeet_insights::db::gateway::RpcGateway;
use parakeet_insights::db::postgres::PgDataSource;
use parakeet_insights::db::DataSource;
use parakeet_insights::llm::openai::OpenAiClient;
use parakeet_insights::pipeline::QueryPipeline;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect_source(config: &DataSourceConfig) -> eyre::Result<Arc<dyn DataSource>> {
    let source: Arc<dyn DataSource> = match config {
        DataSourceConfig::Gateway(gateway) => {
            let client = RpcGateway::new(
                &gateway.url,
                gateway.api_key.clone(),
                &gateway.rpc_function,
                Duration::from_secs(gateway.timeout_secs),
            )
            .map_err(|e| eyre::eyre!("Failed to build gateway client: {}", e))?;
            tracing::info!(endpoint = client.endpoint(), "Using database RPC gateway");
            Arc::new(client)
        }
        DataSourceConfig::Postgres(postgres) => {
            let source = PgDataSource::connect(&postgres.url, postgres.max_connections)
                .await
                .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;
            tracing::info!("Connected to PostgreSQL");
            Arc::new(source)
        }
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;

    // Initialize structured logging (set RUST_LOG=debug for more output)
    init_logging(config.logging.format);
    tracing::info!("Parakeet insights API starting, configuration loaded from {}", config_path);

    let source = connect_source(&config.data_source).await?;

    let generator = OpenAiClient::new(&config.llm)
        .map_err(|e| eyre::eyre!("Failed to build LLM client: {}", e))?;
    if config.llm.api_key.is_empty() {
        tracing::warn!("No LLM API key configured; /query will fail until OPENAI_API_KEY is set");
    }
    tracing::info!(model = %config.llm.model, "Text generation client ready");

    let state = AppState {
        source: source.clone(),
        scanner: AnomalyScanner::new(&config.anomaly_detection),
        pipeline: QueryPipeline::new(Arc::new(generator), source.clone()),
    };

    // Create shutdown signal
    let shutdown = CancellationToken::new();
    let mut server = {
        let shutdown = shutdown.clone();
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move { api::serve(state, &host, port, shutdown).await })
    };

    tracing::info!("Press Ctrl+C to stop.");

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received, draining in-flight requests...");
            None
        }
        finished = &mut server => Some(finished),
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            shutdown.cancel();
            server.await
        }
    };

    source.close().await;
    outcome??;
    tracing::info!("Parakeet insights API stopped gracefully");
    Ok(())
}
