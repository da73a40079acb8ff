use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{rows_from_json, DataSource, GatewayError, Row};

/// Direct PostgreSQL connection returning the same row shape as the RPC gateway.
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

/// Wrap arbitrary SQL so the server aggregates the result into one JSON array.
pub(crate) fn wrap_as_json(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!(
        "SELECT COALESCE(json_agg(q), '[]'::json) FROM ({}) AS q",
        inner
    )
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, GatewayError> {
        let (value,): (JsonValue,) = sqlx::query_as(&wrap_as_json(sql))
            .fetch_one(&self.pool)
            .await?;
        rows_from_json(value)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_strips_trailing_semicolon() {
        assert_eq!(
            wrap_as_json("SELECT AVG(x) FROM t;\n"),
            "SELECT COALESCE(json_agg(q), '[]'::json) FROM (SELECT AVG(x) FROM t) AS q"
        );
    }
}
