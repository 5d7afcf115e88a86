//! Stateless JSON request executor for the custody service.

use crate::types::ApiSession;
use crate::{Error, Result};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

/// Executes one authenticated request per call.
///
/// The client never retries: only the caller knows whether an operation is
/// safe to repeat.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    /// HTTP client for API requests.
    pub http_client: reqwest::Client,
}

impl RemoteClient {
    /// Header carrying the per-agent API key.
    pub const API_KEY_HEADER: &'static str = "X-API-KEY";

    /// Longest response body kept in a `Remote` error.
    const MAX_ERROR_BODY: usize = 2_000;

    #[allow(clippy::result_large_err)]
    pub fn new(timeout: StdDuration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(StdDuration::from_secs(10))
            .build()?;
        Ok(Self { http_client })
    }

    /// Send `method path` with an optional JSON body and return the JSON reply.
    ///
    /// Non-2xx responses, and 2xx replies flagged `"error": true`, become
    /// `Error::Remote` carrying the status and body verbatim. An empty body
    /// decodes as `Value::Null`.
    pub async fn call(
        &self,
        session: &ApiSession,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = session.url(path);
        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .header(Self::API_KEY_HEADER, session.api_key())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(method = %method, path = path, status = status.as_u16(), "Custody API call");

        if !status.is_success() {
            warn!(
                method = %method,
                path = path,
                status = status.as_u16(),
                "Custody API returned an error status"
            );
            return Err(Error::Remote {
                status: status.as_u16(),
                body: truncate(text, Self::MAX_ERROR_BODY),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&text)?;
        if value.get("error").and_then(Value::as_bool) == Some(true) {
            return Err(Error::Remote {
                status: status.as_u16(),
                body: truncate(text, Self::MAX_ERROR_BODY),
            });
        }

        Ok(value)
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
