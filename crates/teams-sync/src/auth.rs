//! Bearer credentials for Microsoft Graph.
//!
//! [`ClientCredentialsAuth`] runs the OAuth 2.0 client-credentials flow
//! against the tenant authority and keeps the token in memory until shortly
//! before it expires. Callers ask for a token on every request and never see
//! the refresh.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rollcall_core::config::GraphConfig;
use rollcall_core::error::{Result, RollcallError};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Supplies the bearer token attached to every Graph request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// A fixed token, for tests and operator-issued tokens.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3599
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// OAuth 2.0 client-credentials authenticator with an in-memory token cache.
pub struct ClientCredentialsAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: RwLock<Option<CachedToken>>,
    /// Refresh this long before the reported expiry.
    grace: Duration,
}

impl ClientCredentialsAuth {
    pub fn new(authority: &str, client_id: &str, client_secret: &str, scopes: &[String]) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!("{}/oauth2/v2.0/token", authority.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: scopes.join(" "),
            cached: RwLock::new(None),
            grace: Duration::minutes(5),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(
            &config.authority,
            &config.application_id,
            &config.secret,
            &config.scopes,
        )
    }

    async fn acquire(&self) -> Result<CachedToken> {
        debug!(url = %self.token_url, "requesting Graph access token");

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RollcallError::Auth(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RollcallError::Auth(format!(
                "failed to get an authorization token ({status}): {body}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RollcallError::Auth(format!("token response parse failed: {e}")))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl Authenticator for ClientCredentialsAuth {
    async fn bearer_token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if Utc::now() + self.grace < token.expires_at {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.acquire().await?;
        let token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}
