//! Authenticated delivery of final translations to the backend.

mod publisher;
mod token;

pub use publisher::{PublisherConfig, ResultPublisher, TranslationMessage, TranslationPublisher};
pub use token::{AuthToken, ClientCredentialsProvider, OAuthCredentials, TokenResponse};

/// Default OAuth2 authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("network failure: {0}")]
    NetworkFailed(String),
}

pub type Result<T> = std::result::Result<T, PublishError>;
