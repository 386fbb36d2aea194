use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::token::{ClientCredentialsProvider, OAuthCredentials};
use crate::{PublishError, Result};

/// Body posted to the backend for each final translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationMessage {
    #[serde(rename = "data")]
    pub text: String,
}

/// Destination for final translations.
#[async_trait]
pub trait TranslationPublisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Backend base URL; messages go to `{server_url}/translation`.
    pub server_url: String,
    pub credentials: OAuthCredentials,
    pub request_timeout: Duration,
}

impl PublisherConfig {
    pub fn endpoint(&self) -> String {
        format!("{}/translation", self.server_url.trim_end_matches('/'))
    }
}

/// Posts translations to the backend with a cached bearer token.
///
/// No retries: a failed publish is reported to the caller and the text is lost.
pub struct ResultPublisher {
    client: reqwest::Client,
    endpoint: String,
    tokens: ClientCredentialsProvider,
}

impl ResultPublisher {
    pub fn new(config: PublisherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PublishError::NetworkFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint(),
            tokens: ClientCredentialsProvider::new(client.clone(), config.credentials),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tokens(&self) -> &ClientCredentialsProvider {
        &self.tokens
    }

    pub async fn invalidate_token(&self) {
        self.tokens.invalidate_token().await;
    }
}

#[async_trait]
impl TranslationPublisher for ResultPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        let token = self.tokens.get_token().await?;
        let message = TranslationMessage {
            text: text.to_string(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Publish request failed");
                PublishError::NetworkFailed(e.to_string())
            })?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(%status, chars = text.chars().count(), "Translation published");
        } else {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "Backend did not accept translation");
        }
        Ok(())
    }
}
