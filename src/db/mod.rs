pub mod gateway;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

/// One result row: column name to JSON value.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unexpected result shape: {0}")]
    Decode(String),
}

/// A queryable relational store reachable through a single SQL operation.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, GatewayError>;

    /// Release pooled connections. Called once at shutdown.
    async fn close(&self) {}
}

/// Turn a JSON result body into rows. `null` means no rows.
pub(crate) fn rows_from_json(value: JsonValue) -> Result<Vec<Row>, GatewayError> {
    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                JsonValue::Object(row) => Ok(row),
                other => Err(GatewayError::Decode(format!(
                    "row {} is not an object: {}",
                    i, other
                ))),
            })
            .collect(),
        other => Err(GatewayError::Decode(format!(
            "expected an array of rows, got {}",
            other
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_from_null_is_empty() {
        assert!(rows_from_json(JsonValue::Null).unwrap().is_empty());
    }

    #[test]
    fn test_rows_from_array() {
        let rows = rows_from_json(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(2));
    }

    #[test]
    fn test_rows_reject_scalars() {
        assert!(rows_from_json(json!([1, 2])).is_err());
        assert!(rows_from_json(json!({"id": 1})).is_err());
    }
}
