use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     enabled: true
///     cert_path: "/etc/voicechat/cert.pem"
///     key_path: "/etc/voicechat/key.pem"
///
/// asr:
///   endpoint: "https://openapi.youdao.com/asrapi"
///   app_key: "your-app-key"
///   app_secret: "your-app-secret"
///   timeout_seconds: 10
///   language: "zh-CHS"
///
/// chat:
///   base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1"
///   api_key: "your-chat-key"
///   model: "qwen-plus"
///   system_prompt: "You are a helpful assistant."
///   history_window: 20
///   max_sessions: 10000
///   session_idle_seconds: 1800
///   timeout_seconds: 30
///
/// pipeline:
///   max_session_duration_seconds: 180
///   max_audio_bytes: 10485760
///   audio_temp_dir: "/var/tmp/voicechat"
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "client-a"
///       secret: "your-api-secret"
///
/// security:
///   cors_allowed_origins: "https://example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub asr: Option<AsrYaml>,
    pub chat: Option<ChatYaml>,
    pub pipeline: Option<PipelineYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Speech recognition service from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AsrYaml {
    pub endpoint: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub timeout_seconds: Option<u64>,
    /// Default recognition language, e.g. "zh-CHS" or "en"
    pub language: Option<String>,
}

/// Chat model provider from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChatYaml {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Messages remembered per conversation
    pub history_window: Option<usize>,
    pub max_sessions: Option<u64>,
    pub session_idle_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

/// Pipeline limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineYaml {
    pub max_session_duration_seconds: Option<u64>,
    pub max_audio_bytes: Option<usize>,
    pub audio_temp_dir: Option<String>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    #[serde(default)]
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Single secret shorthand, used when `api_secrets` is empty
    pub api_secret: Option<String>,
    pub api_secret_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
