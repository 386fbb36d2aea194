//! OAuth2 client-credentials token acquisition with a process-lifetime cache.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{PublishError, Result, DEFAULT_AUTHORITY};

/// Client-credentials grant parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Resource the token is for; the requested scope is `{audience}/.default`.
    pub audience: String,
    pub tenant_id: String,
    pub authority: String,
}

impl OAuthCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        audience: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: audience.into(),
            tenant_id: tenant_id.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn scope(&self) -> String {
        format!("{}/.default", self.audience)
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("tenant_id", &self.tenant_id)
            .field("authority", &self.authority)
            .finish()
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub ext_expires_in: Option<i64>,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Clone)]
pub struct AuthToken {
    pub value: String,
    pub token_type: String,
    pub expires_in: Option<Duration>,
    pub acquired_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|d| self.acquired_at + d)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| Utc::now() >= at)
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("acquired_at", &self.acquired_at)
            .finish_non_exhaustive()
    }
}

impl TryFrom<TokenResponse> for AuthToken {
    type Error = PublishError;

    fn try_from(response: TokenResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(PublishError::AuthFailed(
                "token response has no access_token".into(),
            ));
        }
        Ok(Self {
            value: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in.map(Duration::seconds),
            acquired_at: Utc::now(),
        })
    }
}

/// Fetches a token once and reuses it for the life of the process.
///
/// Expiry is not acted on: a token used past `expires_in` only logs a
/// warning. Call [`invalidate_token`](Self::invalidate_token) to force a
/// new fetch.
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    credentials: OAuthCredentials,
    cached: RwLock<Option<AuthToken>>,
    fetches: AtomicU64,
}

impl ClientCredentialsProvider {
    pub fn new(client: reqwest::Client, credentials: OAuthCredentials) -> Self {
        Self {
            client,
            credentials,
            cached: RwLock::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    /// Number of requests made to the token endpoint.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub async fn get_token(&self) -> Result<AuthToken> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_expired() {
                tracing::warn!(
                    expired_at = ?token.expires_at(),
                    "Using cached access token past its expiry"
                );
            }
            return Ok(token.clone());
        }

        let token = self.fetch_token().await?;

        let mut cached = self.cached.write().await;
        if let Some(existing) = cached.as_ref() {
            // Lost a first-use race; keep the token that was stored first.
            return Ok(existing.clone());
        }
        *cached = Some(token.clone());
        Ok(token)
    }

    pub async fn invalidate_token(&self) {
        if self.cached.write().await.take().is_some() {
            tracing::debug!("Cached access token invalidated");
        }
    }

    async fn fetch_token(&self) -> Result<AuthToken> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let url = self.credentials.token_url();
        let scope = self.credentials.scope();
        tracing::debug!(%url, %scope, "Requesting access token");

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("scope", scope.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| PublishError::AuthFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "Token request rejected");
            return Err(PublishError::AuthFailed(format!("token endpoint returned {status}")));
        }

        let response = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| PublishError::AuthFailed(format!("invalid token response: {e}")))?;

        let token = AuthToken::try_from(response)?;
        tracing::info!(
            token_type = %token.token_type,
            expires_in = ?token.expires_in.map(|d| d.num_seconds()),
            "Access token acquired"
        );
        Ok(token)
    }
}
