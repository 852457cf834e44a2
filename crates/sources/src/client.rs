//! Thin HTTP client for reasoning/analysis services.
//!
//! Transport and prompt details live on the service side; this client only
//! posts a JSON request and parses a structured JSON response. Every
//! transport or parse failure maps to `SourceUnavailable` so the caller
//! degrades the cycle instead of failing it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use quorum_trade_core::{EngineError, Result};

/// JSON-over-HTTP client bound to one source's endpoint.
pub struct ReasoningClient {
    source_id: String,
    endpoint: String,
    http: reqwest::Client,
}

impl ReasoningClient {
    /// Creates a client for the given source and endpoint with a request
    /// timeout.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(
        source_id: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::configuration(format!("http client: {e}")))?;
        Ok(Self {
            source_id: source_id.into(),
            endpoint: endpoint.into(),
            http,
        })
    }

    /// The source this client belongs to.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Posts `request` and parses the JSON response.
    ///
    /// # Errors
    /// Returns `SourceUnavailable` on transport errors, non-success status
    /// codes, or malformed response bodies.
    pub async fn post_json<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("status {status}")));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| self.unavailable(format!("malformed response: {e}")))
    }

    fn unavailable(&self, reason: String) -> EngineError {
        EngineError::source_unavailable(&self.source_id, reason)
    }
}
