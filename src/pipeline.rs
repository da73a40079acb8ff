use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::db::{DataSource, GatewayError, Row};
use crate::llm::{prompts, LlmError, TextGenerator};

pub const GRAPH_PLACEHOLDER: &str = "This feature is in development";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Text,
    Graph,
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "text" => Ok(Self::Text),
            "graph" => Ok(Self::Graph),
            _ => Err(QueryError::InvalidFormat(s.to_string())),
        }
    }
}

/// Serialized as a bare JSON array (table) or a bare JSON string (text, graph).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryAnswer {
    Table(Vec<Row>),
    Text(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid output type '{0}', expected table, text or graph")]
    InvalidFormat(String),
    #[error("user_query must not be empty")]
    EmptyQuery,
    #[error("error generating SQL query: {0}")]
    Generation(#[source] LlmError),
    #[error("database query error: {0}")]
    Execution(#[from] GatewayError),
    #[error("error summarizing results: {0}")]
    Summary(#[source] LlmError),
}

/// Orchestrates a natural-language question end to end:
/// 1. SQL generation
/// 2. Execution against the data source
/// 3. Rendering as rows or a summary
#[derive(Clone)]
pub struct QueryPipeline {
    generator: Arc<dyn TextGenerator>,
    source: Arc<dyn DataSource>,
}

impl QueryPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>, source: Arc<dyn DataSource>) -> Self {
        Self { generator, source }
    }

    pub async fn answer(
        &self,
        user_query: &str,
        format: OutputFormat,
    ) -> Result<QueryAnswer, QueryError> {
        if format == OutputFormat::Graph {
            return Ok(QueryAnswer::Text(GRAPH_PLACEHOLDER.to_string()));
        }
        if user_query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        // Step 1: Generate SQL
        let completion = self
            .generator
            .complete(&prompts::sql_generation(user_query))
            .await
            .map_err(QueryError::Generation)?;
        let sql = prompts::extract_sql(&completion);
        tracing::info!(%sql, "Generated SQL query");

        // Step 2: Execute
        let rows = self.source.execute_query(&sql).await?;
        tracing::debug!(rows = rows.len(), "Query executed");

        // Step 3: Render
        match format {
            OutputFormat::Table => Ok(QueryAnswer::Table(rows)),
            _ => {
                let summary = self
                    .generator
                    .complete(&prompts::summary(&rows, &sql, user_query))
                    .await
                    .map_err(QueryError::Summary)?;
                Ok(QueryAnswer::Text(summary))
            }
        }
    }
}
