//! Minimal client for the engine's HTTP statement API: POST the statement,
//! follow `nextUri` until the query reaches a terminal state, collect the
//! reported rows.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::EngineError;
use crate::gateway::{EngineClient, EngineMetric};

pub struct TrinoStatementClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    next_uri: Option<String>,
    #[serde(default)]
    data: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    error: Option<QueryErrorJson>,
}

#[derive(Debug, Deserialize)]
struct QueryErrorJson {
    message: String,
}

fn connection_error(err: reqwest::Error) -> EngineError {
    EngineError::Transient(format!("engine connection failed: {err}"))
}

/// Maintenance statements report `(metric_name, metric_value)` rows; anything
/// narrower is ignored.
fn collect_rows(metrics: &mut Vec<EngineMetric>, response: &StatementResponse) {
    let Some(data) = &response.data else {
        return;
    };
    for row in data {
        if row.len() >= 2 {
            let name = row[0]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| row[0].to_string());
            metrics.push(EngineMetric {
                name,
                value: row[1].clone(),
            });
        }
    }
}

impl TrinoStatementClient {
    pub fn new(base_url: String, user: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            user,
        }
    }
}

#[async_trait]
impl EngineClient for TrinoStatementClient {
    async fn execute(&self, statement: &str) -> Result<Vec<EngineMetric>, EngineError> {
        let url = format!("{}/v1/statement", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("X-Trino-User", &self.user)
            .body(statement.to_string())
            .send()
            .await
            .map_err(connection_error)?;
        let mut payload: StatementResponse = response
            .error_for_status()
            .map_err(connection_error)?
            .json()
            .await
            .map_err(connection_error)?;

        let mut metrics = vec![];
        loop {
            if let Some(error) = &payload.error {
                return Err(EngineError::from_engine_message(error.message.clone()));
            }
            collect_rows(&mut metrics, &payload);
            let Some(next_uri) = payload.next_uri.clone() else {
                break;
            };
            payload = self
                .client
                .get(&next_uri)
                .header("X-Trino-User", &self.user)
                .send()
                .await
                .map_err(connection_error)?
                .error_for_status()
                .map_err(connection_error)?
                .json()
                .await
                .map_err(connection_error)?;
        }
        debug!("engine statement returned {} metric rows", metrics.len());
        Ok(metrics)
    }
}
