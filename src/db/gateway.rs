use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{rows_from_json, DataSource, GatewayError, Row};

#[derive(Serialize)]
struct RpcBody<'a> {
    sql_query: &'a str,
}

/// Executes SQL through a hosted database's `exec_sql`-style RPC function.
#[derive(Debug, Clone)]
pub struct RpcGateway {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RpcGateway {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        function: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/rest/v1/rpc/{}",
                base_url.trim_end_matches('/'),
                function
            ),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DataSource for RpcGateway {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&RpcBody { sql_query: sql })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status { status, body });
        }

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: JsonValue = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Decode(format!("invalid JSON body: {}", e)))?;
        let rows = rows_from_json(value)?;
        tracing::debug!(rows = rows.len(), "Gateway query complete");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn gateway(url: &str) -> RpcGateway {
        RpcGateway::new(url, "secret", "exec_sql", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let gw = gateway("https://db.example.co/");
        assert_eq!(gw.endpoint(), "https://db.example.co/rest/v1/rpc/exec_sql");
    }

    #[tokio::test]
    async fn test_execute_query_sends_rpc_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/rpc/exec_sql")
            .match_header("apikey", "secret")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({"sql_query": "SELECT 1"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"one": 1}]"#)
            .create_async()
            .await;

        let rows = gateway(&server.url()).execute_query("SELECT 1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["one"], json!(1));
    }

    #[tokio::test]
    async fn test_null_body_means_no_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/exec_sql")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let rows = gateway(&server.url()).execute_query("SELECT 1").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/exec_sql")
            .with_status(400)
            .with_body(r#"{"message":"syntax error"}"#)
            .create_async()
            .await;

        let err = gateway(&server.url())
            .execute_query("SELEC 1")
            .await
            .unwrap_err();
        match err {
            GatewayError::Status { status, body } => {
                assert_eq!(status.as_u16(), 400);
                assert!(body.contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
