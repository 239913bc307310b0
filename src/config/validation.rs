use std::collections::HashSet;

use super::{AuthApiSecret, PipelineConfig, ServerConfig, TlsConfig};

/// Run every check against a merged configuration
pub(super) fn validate_server_config(
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_tls(&config.tls)?;
    config
        .asr
        .validate()
        .map_err(|e| format!("Invalid ASR configuration: {e}"))?;
    config
        .chat
        .validate()
        .map_err(|e| format!("Invalid chat configuration: {e}"))?;
    validate_pipeline(&config.pipeline)?;
    validate_auth_api_secrets(&config.auth_api_secrets)?;
    validate_auth_required(config.auth_required, &config.auth_api_secrets)?;
    validate_rate_limits(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;
    Ok(())
}

/// Certificate and key must exist when TLS is enabled
pub(super) fn validate_tls(tls: &Option<TlsConfig>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(tls) = tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file not found: {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
        }
    }
    Ok(())
}

pub(super) fn validate_pipeline(
    pipeline: &PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if pipeline.max_session_duration.is_zero() {
        return Err("MAX_SESSION_DURATION_SECONDS must be greater than zero".into());
    }
    if pipeline.max_audio_bytes == 0 {
        return Err("MAX_AUDIO_BYTES must be greater than zero".into());
    }
    if let Some(dir) = &pipeline.audio_temp_dir
        && !dir.is_dir()
    {
        return Err(format!("AUDIO_TEMP_DIR is not a directory: {}", dir.display()).into());
    }
    Ok(())
}

/// Ids and secrets must be non-empty and ids unique
pub(super) fn validate_auth_api_secrets(
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    for entry in secrets {
        if entry.id.trim().is_empty() {
            return Err("API secret entries must have a non-empty id".into());
        }
        if entry.secret.is_empty() {
            return Err(format!("API secret for '{}' must not be empty", entry.id).into());
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(format!("Duplicate API secret id: {}", entry.id).into());
        }
    }
    Ok(())
}

pub(super) fn validate_auth_required(
    auth_required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && secrets.is_empty() {
        return Err(
            "AUTH_REQUIRED is true but no API secrets are configured \
             (set AUTH_API_SECRETS_JSON or AUTH_API_SECRET)"
                .into(),
        );
    }
    Ok(())
}

pub(super) fn validate_rate_limits(
    requests_per_second: u32,
    burst_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if requests_per_second == 0 {
        return Err("RATE_LIMIT_REQUESTS_PER_SECOND must be greater than zero".into());
    }
    if burst_size == 0 {
        return Err("RATE_LIMIT_BURST_SIZE must be greater than zero".into());
    }
    Ok(())
}
