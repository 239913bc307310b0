//! Configuration for the ASR client.

use std::time::Duration;

/// Default recognition endpoint.
pub const DEFAULT_ASR_ENDPOINT: &str = "https://openapi.youdao.com/asrapi";

/// Default bound on a single recognition round-trip.
pub const DEFAULT_ASR_TIMEOUT_SECS: u64 = 10;

/// Default language hint (Mandarin, simplified).
pub const DEFAULT_ASR_LANGUAGE: &str = "zh-CHS";

/// Sample rate sent when the upload header could not be read.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16000;

/// Channel count sent when the upload header could not be read.
pub const DEFAULT_CHANNELS: u16 = 1;

/// Credentials and request defaults for the signed ASR endpoint.
///
/// Injected into [`super::SpeechTranscriptionClient`] at construction. The
/// secret is zeroized by the owning [`crate::config::ServerConfig`].
#[derive(Clone)]
pub struct AsrConfig {
    pub endpoint: String,
    pub app_key: String,
    pub app_secret: String,
    pub timeout: Duration,
    pub default_language: String,
    pub default_sample_rate: u32,
    pub default_channels: u16,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ASR_ENDPOINT.to_string(),
            app_key: String::new(),
            app_secret: String::new(),
            timeout: Duration::from_secs(DEFAULT_ASR_TIMEOUT_SECS),
            default_language: DEFAULT_ASR_LANGUAGE.to_string(),
            default_sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            default_channels: DEFAULT_CHANNELS,
        }
    }
}

impl AsrConfig {
    /// Whether credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("ASR endpoint must not be empty".to_string());
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid ASR endpoint '{}': {e}", self.endpoint))?;
        if self.timeout.is_zero() {
            return Err("ASR timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

// Secrets stay out of debug output.
impl std::fmt::Debug for AsrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsrConfig")
            .field("endpoint", &self.endpoint)
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("default_language", &self.default_language)
            .field("default_sample_rate", &self.default_sample_rate)
            .field("default_channels", &self.default_channels)
            .finish()
    }
}
