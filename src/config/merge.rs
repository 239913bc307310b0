use std::path::PathBuf;
use std::time::Duration;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{AuthApiSecret, PipelineConfig, ServerConfig, TlsConfig};
use crate::core::asr::{AsrConfig, DEFAULT_ASR_ENDPOINT, DEFAULT_ASR_LANGUAGE, DEFAULT_ASR_TIMEOUT_SECS};
use crate::core::bridge::DEFAULT_MAX_SESSION_DURATION;
use crate::core::chat::{
    ChatConfig, DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_TIMEOUT_SECS,
    DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_SECS,
};
use crate::core::ingest::DEFAULT_MAX_AUDIO_BYTES;

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 3001;
pub(super) const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub(super) const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Build the final configuration from environment variables and optional YAML
///
/// Priority (highest first): YAML, environment variables, `.env` values
/// (already loaded into the environment), defaults.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let asr_yaml = yaml.asr.unwrap_or_default();
    let chat_yaml = yaml.chat.unwrap_or_default();
    let pipeline_yaml = yaml.pipeline.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let tls = merge_tls(&server, &env);

    let asr = AsrConfig {
        endpoint: asr_yaml
            .endpoint
            .or(env.asr_endpoint)
            .unwrap_or_else(|| DEFAULT_ASR_ENDPOINT.to_string()),
        app_key: asr_yaml.app_key.or(env.asr_app_key).unwrap_or_default(),
        app_secret: asr_yaml
            .app_secret
            .or(env.asr_app_secret)
            .unwrap_or_default(),
        timeout: Duration::from_secs(
            asr_yaml
                .timeout_seconds
                .or(env.asr_timeout_seconds)
                .unwrap_or(DEFAULT_ASR_TIMEOUT_SECS),
        ),
        default_language: asr_yaml
            .language
            .or(env.asr_language)
            .unwrap_or_else(|| DEFAULT_ASR_LANGUAGE.to_string()),
        ..AsrConfig::default()
    };

    let chat = ChatConfig {
        base_url: chat_yaml
            .base_url
            .or(env.chat_base_url)
            .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
        api_key: chat_yaml.api_key.or(env.chat_api_key).unwrap_or_default(),
        model: chat_yaml
            .model
            .or(env.chat_model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        system_prompt: chat_yaml.system_prompt.or(env.chat_system_prompt),
        history_window: chat_yaml
            .history_window
            .or(env.chat_history_window)
            .unwrap_or(DEFAULT_HISTORY_WINDOW),
        max_sessions: chat_yaml
            .max_sessions
            .or(env.chat_max_sessions)
            .unwrap_or(DEFAULT_MAX_SESSIONS),
        session_idle_timeout: Duration::from_secs(
            chat_yaml
                .session_idle_seconds
                .or(env.chat_session_idle_seconds)
                .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
        ),
        timeout: Duration::from_secs(
            chat_yaml
                .timeout_seconds
                .or(env.chat_timeout_seconds)
                .unwrap_or(DEFAULT_CHAT_TIMEOUT_SECS),
        ),
    };

    let pipeline = PipelineConfig {
        max_session_duration: pipeline_yaml
            .max_session_duration_seconds
            .or(env.max_session_duration_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_SESSION_DURATION),
        max_audio_bytes: pipeline_yaml
            .max_audio_bytes
            .or(env.max_audio_bytes)
            .unwrap_or(DEFAULT_MAX_AUDIO_BYTES),
        audio_temp_dir: pipeline_yaml
            .audio_temp_dir
            .or(env.audio_temp_dir)
            .map(PathBuf::from),
    };

    let auth_api_secrets = if !auth.api_secrets.is_empty() {
        auth.api_secrets
            .into_iter()
            .map(|entry| AuthApiSecret {
                id: entry.id,
                secret: entry.secret,
            })
            .collect()
    } else if let Some(secret) = auth.api_secret {
        vec![AuthApiSecret {
            id: auth.api_secret_id.unwrap_or_else(|| "default".to_string()),
            secret,
        }]
    } else {
        env.auth_api_secrets
    };

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        tls,
        asr,
        chat,
        pipeline,
        auth_api_secrets,
        auth_required: auth.required.or(env.auth_required).unwrap_or(false),
        cors_allowed_origins: security.cors_allowed_origins.or(env.cors_allowed_origins),
        rate_limit_requests_per_second: security
            .rate_limit_requests_per_second
            .or(env.rate_limit_requests_per_second)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: security
            .rate_limit_burst_size
            .or(env.rate_limit_burst_size)
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
    })
}

fn merge_tls(server: &super::yaml::ServerYaml, env: &EnvConfig) -> Option<TlsConfig> {
    let tls_yaml = server.tls.as_ref();
    if tls_yaml.and_then(|t| t.enabled) == Some(false) {
        return None;
    }

    let cert_path = tls_yaml
        .and_then(|t| t.cert_path.clone())
        .or_else(|| env.tls_cert_path.clone());
    let key_path = tls_yaml
        .and_then(|t| t.key_path.clone())
        .or_else(|| env.tls_key_path.clone());

    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        }),
        _ => None,
    }
}
