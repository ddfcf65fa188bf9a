use super::ServerConfig;

/// Validate numeric limits
///
/// Zero-valued limits would make the gateway silently unusable (every frame
/// rejected, every provider call timing out instantly), so they are rejected
/// at startup.
pub fn validate_limits(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.max_ws_payload_bytes == 0 {
        return Err("MAX_WS_PAYLOAD_BYTES must be greater than zero".into());
    }
    if config.max_audio_upload_mb == 0 {
        return Err("MAX_AUDIO_UPLOAD_MB must be greater than zero".into());
    }
    for (name, value) in [
        ("STT_TIMEOUT_SECONDS", config.stt_timeout),
        ("AI_TIMEOUT_SECONDS", config.ai_timeout),
        ("TTS_TIMEOUT_SECONDS", config.tts_timeout),
        ("IMAGE_EDIT_TIMEOUT_SECONDS", config.image_edit_timeout),
        ("PING_INTERVAL_SECONDS", config.ping_interval),
        ("SENSOR_PING_INTERVAL_SECONDS", config.sensor_ping_interval),
        (
            "SENSOR_REVIEW_INTERVAL_SECONDS",
            config.sensor_review_interval,
        ),
        ("POLAROID_TIMEOUT_SECONDS", config.polaroid_timeout),
        ("STREAM_IDLE_SECONDS", config.stream_idle),
    ] {
        if value.is_zero() {
            return Err(format!("{name} must be greater than zero").into());
        }
    }
    if config.sensor_max_missed_pings == 0 {
        return Err("SENSOR_MAX_MISSED_PINGS must be greater than zero".into());
    }
    Ok(())
}

/// Validate that provider URL/key pairs are either both present or both absent
///
/// A half-configured provider would pass the startup check but fail on the
/// first request; catching it here gives a clear message instead.
pub fn validate_provider_pairs(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.stt_api_url.is_some() != config.stt_api_key.is_some() {
        return Err("STT_API_URL and STT_API_KEY must be configured together".into());
    }
    if config.tts_api_url.is_some() != config.tts_api_key.is_some() {
        return Err("TTS_API_URL and TTS_API_KEY must be configured together".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(validate_limits(&config).is_ok());
        assert!(validate_provider_pairs(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig {
            stt_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert!(validate_limits(&config).is_err());
    }

    #[test]
    fn test_half_configured_provider_rejected() {
        let config = ServerConfig {
            tts_api_key: Some("key".to_string()),
            ..ServerConfig::default()
        };
        assert!(validate_provider_pairs(&config).is_err());
    }
}
