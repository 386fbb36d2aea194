use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cpc_audio::CaptureConfig;
use cpc_publisher::{OAuthCredentials, PublisherConfig, DEFAULT_AUTHORITY};
use cpc_recognition::RecognizerSettings;

use crate::constants::{
    DEFAULT_RECOGNITION_LANGUAGE, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TARGET_LANGUAGE,
    DEFAULT_TEST_OUTPUT_INTERVAL_SECS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Process configuration, read once at startup.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(rename = "subscription")]
    pub subscription_key: String,
    pub region: String,
    #[serde(rename = "jwtClientId")]
    pub oauth_client_id: String,
    #[serde(rename = "jwtClientSecret")]
    pub oauth_client_secret: String,
    #[serde(rename = "jwtAudience")]
    pub oauth_audience: String,
    #[serde(rename = "jwtTenantId")]
    pub oauth_tenant_id: String,
    pub server_url: String,
    #[serde(default)]
    pub use_test_output: bool,

    #[serde(default = "default_recognition_language")]
    pub recognition_language: String,
    #[serde(default = "default_target_languages")]
    pub target_languages: Vec<String>,
    /// Input device name; the host default when unset.
    #[serde(default)]
    pub input_device: Option<String>,
    /// Tee the converted stream into this WAV file.
    #[serde(default)]
    pub recording_path: Option<PathBuf>,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_test_output_interval_secs")]
    pub test_output_interval_secs: u64,
}

fn default_recognition_language() -> String {
    DEFAULT_RECOGNITION_LANGUAGE.to_string()
}

fn default_target_languages() -> Vec<String> {
    vec![DEFAULT_TARGET_LANGUAGE.to_string()]
}

fn default_authority_url() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_test_output_interval_secs() -> u64 {
    DEFAULT_TEST_OUTPUT_INTERVAL_SECS
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            path = %path.display(),
            region = %config.region,
            server_url = %config.server_url,
            use_test_output = config.use_test_output,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            server_url: self.server_url.clone(),
            credentials: OAuthCredentials::new(
                &self.oauth_client_id,
                &self.oauth_client_secret,
                &self.oauth_audience,
                &self.oauth_tenant_id,
            )
            .with_authority(&self.authority_url),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn recognizer_settings(&self) -> RecognizerSettings {
        RecognizerSettings {
            subscription_key: self.subscription_key.clone(),
            region: self.region.clone(),
            recognition_language: self.recognition_language.clone(),
            target_languages: self.target_languages.clone(),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device_name: self.input_device.clone(),
            ..CaptureConfig::default()
        }
    }

    pub fn test_output_interval(&self) -> Duration {
        Duration::from_secs(self.test_output_interval_secs.max(1))
    }

    /// Language tag used for synthetic output.
    pub fn primary_target_language(&self) -> &str {
        self.target_languages
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_TARGET_LANGUAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "subscription": "sub-key",
        "region": "centralus",
        "jwtClientSecret": "secret",
        "jwtAudience": "api://backend",
        "jwtClientId": "client",
        "jwtTenantId": "tenant",
        "serverUrl": "https://backend.example",
        "useTestOutput": true
    }"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parses_field_names() {
        let file = write_config(MINIMAL);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.subscription_key, "sub-key");
        assert_eq!(config.region, "centralus");
        assert_eq!(config.oauth_client_secret, "secret");
        assert_eq!(config.oauth_audience, "api://backend");
        assert_eq!(config.oauth_client_id, "client");
        assert_eq!(config.oauth_tenant_id, "tenant");
        assert_eq!(config.server_url, "https://backend.example");
        assert!(config.use_test_output);
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let file = write_config(MINIMAL);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.recognition_language, "en-US");
        assert_eq!(config.target_languages, vec!["uk"]);
        assert_eq!(config.input_device, None);
        assert_eq!(config.recording_path, None);
        assert_eq!(config.test_output_interval(), Duration::from_secs(3));
        assert_eq!(config.primary_target_language(), "uk");

        let publisher = config.publisher_config();
        assert_eq!(publisher.request_timeout, Duration::from_secs(30));
        assert_eq!(
            publisher.credentials.token_url(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
        assert_eq!(publisher.endpoint(), "https://backend.example/translation");
    }

    #[test]
    fn test_optional_fields_override() {
        let json = MINIMAL.replace(
            "\"useTestOutput\": true",
            r#""useTestOutput": false,
            "recognitionLanguage": "de-DE",
            "targetLanguages": ["fr", "uk"],
            "inputDevice": "USB Mic",
            "recordingPath": "/tmp/capture.wav",
            "testOutputIntervalSecs": 1"#,
        );
        let file = write_config(&json);
        let config = Config::from_file(file.path()).unwrap();

        assert!(!config.use_test_output);
        let settings = config.recognizer_settings();
        assert_eq!(settings.recognition_language, "de-DE");
        assert_eq!(settings.target_languages, vec!["fr", "uk"]);
        assert_eq!(settings.subscription_key, "sub-key");
        assert_eq!(config.capture_config().device_name.as_deref(), Some("USB Mic"));
        assert_eq!(config.recording_path, Some(PathBuf::from("/tmp/capture.wav")));
        assert_eq!(config.primary_target_language(), "fr");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("config.json")).err().expect("expected a ConfigError");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let file = write_config("{ not json");
        let err = Config::from_file(file.path()).err().expect("expected a ConfigError");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let file = write_config(&MINIMAL.replace("\"serverUrl\": \"https://backend.example\",", ""));
        let err = Config::from_file(file.path()).err().expect("expected a ConfigError");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
