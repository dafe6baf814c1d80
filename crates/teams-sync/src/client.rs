//! Authenticated reqwest transport for Microsoft Graph.
//!
//! The client only sends requests and decodes bodies. Status classification,
//! retries, pagination and dry-run handling live in [`crate::gateway`].

use std::sync::Arc;

use reqwest::{Method, Response};
use rollcall_core::error::{Result, RollcallError};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::Authenticator;

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// HTTP client for Graph requests against one versioned endpoint.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn Authenticator>,
}

impl GraphClient {
    /// Create a client for the public Graph v1.0 endpoint.
    pub fn new(auth: Arc<dyn Authenticator>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: GRAPH_API_BASE.to_string(),
            auth,
        }
    }

    /// Override the base URL (national clouds, beta, or wiremock in tests).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Absolute URL for a path relative to the endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one request with a fresh bearer token. Any HTTP status is returned
    /// as a response; only transport failures are errors.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let token = self.auth.bearer_token().await?;
        debug!(%method, url, "Graph request");

        let mut req = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }

        req.send()
            .await
            .map_err(|e| RollcallError::Graph(format!("{method} {url} request failed: {e}")))
    }

    /// Fail with the response body unless the status is 2xx.
    pub async fn ensure_success(resp: Response, operation: &str) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(RollcallError::Graph(format!(
            "{operation} failed ({status}): {body}"
        )))
    }

    /// Check the status and decode a JSON body.
    pub async fn json<T: DeserializeOwned>(resp: Response, operation: &str) -> Result<T> {
        let resp = Self::ensure_success(resp, operation).await?;
        resp.json::<T>()
            .await
            .map_err(|e| RollcallError::Graph(format!("{operation} parse failed: {e}")))
    }
}
