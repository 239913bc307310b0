//! Configuration module for the voice chat gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voicechat_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::asr::AsrConfig;
use crate::core::bridge::DEFAULT_MAX_SESSION_DURATION;
use crate::core::chat::ChatConfig;
use crate::core::ingest::DEFAULT_MAX_AUDIO_BYTES;

/// TLS configuration for HTTPS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// API secret authentication entry with a client identifier
#[derive(Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for AuthApiSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthApiSecret")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Limits applied to every pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a streamed answer
    pub max_session_duration: Duration,
    /// Largest accepted audio upload
    pub max_audio_bytes: usize,
    /// Where uploads are staged; the system temp dir when `None`
    pub audio_temp_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_session_duration: DEFAULT_MAX_SESSION_DURATION,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            audio_temp_dir: None,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS)
/// - Speech recognition credentials
/// - Chat model provider settings
/// - Pipeline limits
/// - Authentication settings
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream services
    pub asr: AsrConfig,
    pub chat: ChatConfig,

    pub pipeline: PipelineConfig,

    // Authentication configuration
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.asr.app_secret.zeroize();
        self.chat.api_key.zeroize();
        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Loads environment variables (with defaults) and applies YAML overrides.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded into the environment in main.rs before this runs
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_server_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Find the API secret identifier that matches a bearer token
    ///
    /// Returns the configured id when the token matches a known secret.
    /// Comparison is constant-time per entry.
    pub fn find_api_secret_id(&self, token: &str) -> Option<&str> {
        crate::auth::match_api_secret_id(token, &self.auth_api_secrets)
    }

    /// Request body limit for uploads: the audio limit plus room for the
    /// multipart envelope and text fields.
    pub fn max_request_body_bytes(&self) -> usize {
        self.pipeline.max_audio_bytes.saturating_add(64 * 1024)
    }
}

pub(crate) fn parse_auth_api_secrets_json(
    json_str: &str,
) -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    #[derive(serde::Deserialize)]
    struct AuthApiSecretJson {
        id: String,
        secret: String,
    }

    let secrets: Vec<AuthApiSecretJson> = serde_json::from_str(json_str)
        .map_err(|e| format!("Invalid AUTH_API_SECRETS_JSON format: {e}"))?;

    Ok(secrets
        .into_iter()
        .map(|entry| AuthApiSecret {
            id: entry.id,
            secret: entry.secret,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    /// Helper function to create a test ServerConfig with defaults
    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "localhost".to_string(),
            port: 3001,
            tls: None,
            asr: AsrConfig::default(),
            chat: ChatConfig::default(),
            pipeline: PipelineConfig::default(),
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }

    #[test]
    fn test_address() {
        let config = test_config();
        assert_eq!(config.address(), "localhost:3001");
        assert!(!config.is_tls_enabled());
    }

    #[test]
    fn test_has_api_secret_auth() {
        let mut config = test_config();
        assert!(!config.has_api_secret_auth());

        config.auth_api_secrets.push(AuthApiSecret {
            id: "client".to_string(),
            secret: "secret".to_string(),
        });
        assert!(config.has_api_secret_auth());
    }

    #[test]
    fn test_find_api_secret_id() {
        let mut config = test_config();
        config.auth_api_secrets = vec![
            AuthApiSecret {
                id: "client-a".to_string(),
                secret: "secret-a".to_string(),
            },
            AuthApiSecret {
                id: "client-b".to_string(),
                secret: "secret-b".to_string(),
            },
        ];

        assert_eq!(config.find_api_secret_id("secret-b"), Some("client-b"));
        assert_eq!(config.find_api_secret_id("secret-a"), Some("client-a"));
        assert_eq!(config.find_api_secret_id("secret-c"), None);
        assert_eq!(config.find_api_secret_id(""), None);
    }

    #[test]
    fn test_debug_redacts_api_secrets() {
        let mut config = test_config();
        config.auth_api_secrets = vec![AuthApiSecret {
            id: "client-a".to_string(),
            secret: "hunter2-do-not-log".to_string(),
        }];

        let entry = format!("{:?}", config.auth_api_secrets[0]);
        assert!(entry.contains("client-a"));
        assert!(!entry.contains("hunter2-do-not-log"));
        assert!(!format!("{config:?}").contains("hunter2-do-not-log"));
    }

    #[test]
    fn test_max_request_body_bytes() {
        let mut config = test_config();
        config.pipeline.max_audio_bytes = 1024;
        assert_eq!(config.max_request_body_bytes(), 1024 + 64 * 1024);
    }

    #[test]
    fn test_parse_auth_api_secrets_json() {
        let secrets =
            parse_auth_api_secrets_json(r#"[{"id":"a","secret":"s1"},{"id":"b","secret":"s2"}]"#)
                .unwrap();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].id, "a");

        let err = parse_auth_api_secrets_json("{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid AUTH_API_SECRETS_JSON"));
    }

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("ASR_APP_KEY");
            env::remove_var("ASR_APP_SECRET");
            env::remove_var("CHAT_API_KEY");
            env::remove_var("CHAT_MODEL");
            env::remove_var("AUTH_REQUIRED");
            env::remove_var("AUTH_API_SECRETS_JSON");
            env::remove_var("AUTH_API_SECRET");
            env::remove_var("AUTH_API_SECRET_ID");
            env::remove_var("MAX_AUDIO_BYTES");
            env::remove_var("AUDIO_TEMP_DIR");
        }
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

asr:
  app_key: "yaml-asr-key"
  app_secret: "yaml-asr-secret"

chat:
  api_key: "yaml-chat-key"
  model: "qwen-max"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.asr.app_key, "yaml-asr-key");
        assert!(config.asr.is_configured());
        assert_eq!(config.chat.api_key, "yaml-chat-key");
        assert_eq!(config.chat.model, "qwen-max");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

asr:
  app_key: "yaml-key"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("ASR_APP_KEY", "env-key");
            env::set_var("ASR_APP_SECRET", "env-secret");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.asr.app_key, "yaml-key");
        // ENV fills what YAML leaves out
        assert_eq!(config.asr.app_secret, "env-secret");
        assert_eq!(config.port, 8080);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_auth_required_without_secrets() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "auth:\n  required: true\n").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.unwrap_err().to_string().contains("AUTH_REQUIRED"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_with_pipeline_limits() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = format!(
            r#"
pipeline:
  max_session_duration_seconds: 45
  max_audio_bytes: 4096
  audio_temp_dir: "{}"
"#,
            temp_dir.path().display()
        );
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.pipeline.max_session_duration, Duration::from_secs(45));
        assert_eq!(config.pipeline.max_audio_bytes, 4096);
        assert_eq!(
            config.pipeline.audio_temp_dir.as_deref(),
            Some(temp_dir.path())
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();

        assert_eq!(config.port, 3001);
        assert!(!config.asr.is_configured());
        assert!(!config.auth_required);

        cleanup_env_vars();
    }
}
