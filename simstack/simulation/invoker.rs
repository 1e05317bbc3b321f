use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure modes of one simulation call. Any of these costs the variant that
/// tool's metrics, never the variant itself.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Transport-level failure.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// Service answered with a non-success status.
    #[error("simulator returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log line.
        body: String,
    },
    /// Response body was not the expected metrics object.
    #[error("undecodable simulator response: {0}")]
    Decode(String),
    /// Call exceeded its budget.
    #[error("simulator call timed out after {0:?}")]
    Timeout(Duration),
}

/// Seam for invoking one simulation service; stubbed in tests.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Runs one simulation with the given parameter subset.
    async fn simulate(
        &self,
        base_url: &str,
        parameters: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, f64>, ToolError>;
}

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    #[serde(default)]
    metrics: IndexMap<String, f64>,
}

/// HTTP invoker posting to `{base_url}/simulate`.
pub struct HttpToolInvoker {
    client: reqwest::Client,
}

impl HttpToolInvoker {
    /// Creates an invoker with its own connection pool.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn simulate(
        &self,
        base_url: &str,
        parameters: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, f64>, ToolError> {
        let url = format!("{}/simulate", base_url.trim_end_matches('/'));
        let response = self.client.post(url).json(parameters).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().await?;
        let decoded: SimulateResponse =
            serde_json::from_str(&body).map_err(|err| ToolError::Decode(err.to_string()))?;
        Ok(decoded.metrics)
    }
}
