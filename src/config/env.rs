use std::env;
use std::str::FromStr;

use super::{AuthApiSecret, ServerConfig, merge, parse_auth_api_secrets_json, validation};

/// Raw values read from environment variables
///
/// Every field is optional; defaults are applied in [`merge::merge_config`] so
/// that YAML can still override values that are absent from the environment.
#[derive(Debug, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub asr_endpoint: Option<String>,
    pub asr_app_key: Option<String>,
    pub asr_app_secret: Option<String>,
    pub asr_timeout_seconds: Option<u64>,
    pub asr_language: Option<String>,

    pub chat_base_url: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_model: Option<String>,
    pub chat_system_prompt: Option<String>,
    pub chat_history_window: Option<usize>,
    pub chat_max_sessions: Option<u64>,
    pub chat_session_idle_seconds: Option<u64>,
    pub chat_timeout_seconds: Option<u64>,

    pub max_session_duration_seconds: Option<u64>,
    pub max_audio_bytes: Option<usize>,
    pub audio_temp_dir: Option<String>,

    pub auth_required: Option<bool>,
    pub auth_api_secrets: Vec<AuthApiSecret>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl EnvConfig {
    /// Read all recognised variables from the process environment
    ///
    /// # Errors
    /// Returns an error if a numeric or boolean variable cannot be parsed, or
    /// if `AUTH_API_SECRETS_JSON` is malformed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let auth_api_secrets = match non_empty_var("AUTH_API_SECRETS_JSON") {
            Some(json) => parse_auth_api_secrets_json(&json)?,
            None => match non_empty_var("AUTH_API_SECRET") {
                Some(secret) => vec![AuthApiSecret {
                    id: non_empty_var("AUTH_API_SECRET_ID")
                        .unwrap_or_else(|| "default".to_string()),
                    secret,
                }],
                None => Vec::new(),
            },
        };

        Ok(Self {
            host: non_empty_var("HOST"),
            port: parse_var("PORT")?,
            tls_cert_path: non_empty_var("TLS_CERT_PATH"),
            tls_key_path: non_empty_var("TLS_KEY_PATH"),

            asr_endpoint: non_empty_var("ASR_ENDPOINT"),
            asr_app_key: non_empty_var("ASR_APP_KEY"),
            asr_app_secret: non_empty_var("ASR_APP_SECRET"),
            asr_timeout_seconds: parse_var("ASR_TIMEOUT_SECONDS")?,
            asr_language: non_empty_var("ASR_LANGUAGE"),

            chat_base_url: non_empty_var("CHAT_BASE_URL"),
            chat_api_key: non_empty_var("CHAT_API_KEY"),
            chat_model: non_empty_var("CHAT_MODEL"),
            chat_system_prompt: non_empty_var("CHAT_SYSTEM_PROMPT"),
            chat_history_window: parse_var("CHAT_HISTORY_WINDOW")?,
            chat_max_sessions: parse_var("CHAT_MAX_SESSIONS")?,
            chat_session_idle_seconds: parse_var("CHAT_SESSION_IDLE_SECONDS")?,
            chat_timeout_seconds: parse_var("CHAT_TIMEOUT_SECONDS")?,

            max_session_duration_seconds: parse_var("MAX_SESSION_DURATION_SECONDS")?,
            max_audio_bytes: parse_var("MAX_AUDIO_BYTES")?,
            audio_temp_dir: non_empty_var("AUDIO_TEMP_DIR"),

            auth_required: parse_bool_var("AUTH_REQUIRED")?,
            auth_api_secrets,

            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?,
        })
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file; real
    /// environment variables take precedence over its values.
    ///
    /// # Example
    /// ```rust,no_run
    /// use voicechat_gateway::config::ServerConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ServerConfig::from_env()?;
    /// println!("Listening on {}", config.address());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_server_config(&config)?;
        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} '{value}': {e}").into()),
        None => Ok(None),
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match non_empty_var(name) {
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {name}: '{value}'").into()),
        },
        None => Ok(None),
    }
}
