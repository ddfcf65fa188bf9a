use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::ServerConfig;
use super::utils::{parse_duration_secs, parse_origin_list};
use super::validation::{validate_limits, validate_provider_pairs};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables with sensible defaults.
    /// Also loads from a .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Numeric environment variables are malformed
    /// - Limits are out of range (zero payload size, zero timeouts)
    /// - A provider URL is configured without its API key, or vice versa
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = ServerConfig::default();

        // Server configuration
        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|v| parse_origin_list(&v))
            .unwrap_or_default();
        let max_ws_payload_bytes = env::var("MAX_WS_PAYLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_ws_payload_bytes);

        // Query pipeline limits
        let max_audio_upload_mb = env::var("MAX_AUDIO_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_audio_upload_mb);
        let audio_temp_dir = env::var("AUDIO_TEMP_DIR").ok().map(PathBuf::from);

        // Per-stage provider timeouts
        let stt_timeout = parse_duration_secs("STT_TIMEOUT_SECONDS", defaults.stt_timeout)?;
        let ai_timeout = parse_duration_secs("AI_TIMEOUT_SECONDS", defaults.ai_timeout)?;
        let tts_timeout = parse_duration_secs("TTS_TIMEOUT_SECONDS", defaults.tts_timeout)?;
        let image_edit_timeout =
            parse_duration_secs("IMAGE_EDIT_TIMEOUT_SECONDS", defaults.image_edit_timeout)?;

        // Heartbeat cadence
        let ping_interval = parse_duration_secs("PING_INTERVAL_SECONDS", defaults.ping_interval)?;
        let sensor_ping_interval =
            parse_duration_secs("SENSOR_PING_INTERVAL_SECONDS", defaults.sensor_ping_interval)?;
        let sensor_review_interval = parse_duration_secs(
            "SENSOR_REVIEW_INTERVAL_SECONDS",
            defaults.sensor_review_interval,
        )?;
        let sensor_pong_grace =
            parse_duration_secs("SENSOR_PONG_GRACE_SECONDS", defaults.sensor_pong_grace)?;
        let sensor_max_missed_pings = env::var("SENSOR_MAX_MISSED_PINGS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.sensor_max_missed_pings);

        // Subsystem expiry windows
        let polaroid_timeout =
            parse_duration_secs("POLAROID_TIMEOUT_SECONDS", defaults.polaroid_timeout)?;
        let edit_session_idle = env::var("EDIT_SESSION_IDLE_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.edit_session_idle);
        let edit_session_sweep = env::var("EDIT_SESSION_SWEEP_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(defaults.edit_session_sweep);
        let stream_idle = parse_duration_secs("STREAM_IDLE_SECONDS", defaults.stream_idle)?;

        // Upstream providers
        let stt_api_url = env::var("STT_API_URL").ok();
        let stt_api_key = env::var("STT_API_KEY").ok();
        let gemini_api_url = env::var("GEMINI_API_URL").unwrap_or(defaults.gemini_api_url);
        let gemini_api_key = env::var("GEMINI_API_KEY").ok();
        let gemini_model = env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model);
        let gemini_image_model =
            env::var("GEMINI_IMAGE_MODEL").unwrap_or(defaults.gemini_image_model);
        let tts_api_url = env::var("TTS_API_URL").ok();
        let tts_api_key = env::var("TTS_API_KEY").ok();
        let tts_voice = env::var("TTS_VOICE").unwrap_or(defaults.tts_voice);

        let config = ServerConfig {
            host,
            port,
            allowed_origins,
            max_ws_payload_bytes,
            max_audio_upload_mb,
            audio_temp_dir,
            stt_timeout,
            ai_timeout,
            tts_timeout,
            image_edit_timeout,
            ping_interval,
            sensor_ping_interval,
            sensor_review_interval,
            sensor_pong_grace,
            sensor_max_missed_pings,
            polaroid_timeout,
            edit_session_idle,
            edit_session_sweep,
            stream_idle,
            stt_api_url,
            stt_api_key,
            gemini_api_url,
            gemini_api_key,
            gemini_model,
            gemini_image_model,
            tts_api_url,
            tts_api_key,
            tts_voice,
        };

        validate_limits(&config)?;
        validate_provider_pairs(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("PORT");
            env::remove_var("ALLOWED_ORIGINS");
            env::remove_var("MAX_AUDIO_UPLOAD_MB");
            env::remove_var("STT_TIMEOUT_SECONDS");
            env::remove_var("STT_API_URL");
            env::remove_var("STT_API_KEY");
            env::remove_var("SENSOR_MAX_MISSED_PINGS");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        let config = ServerConfig::from_env().expect("defaults should load");
        assert_eq!(config.port, 3001);
        assert_eq!(config.max_audio_upload_mb, 10);
        assert_eq!(config.sensor_max_missed_pings, 2);
        assert_eq!(config.polaroid_timeout, Duration::from_secs(180));
        assert!(config.allowed_origins.is_empty());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "8099");
            env::set_var("ALLOWED_ORIGINS", "http://a.test, http://b.test");
            env::set_var("STT_TIMEOUT_SECONDS", "7");
        }
        let config = ServerConfig::from_env().expect("overrides should load");
        assert_eq!(config.port, 8099);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.stt_timeout, Duration::from_secs(7));
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_orphan_provider_key() {
        cleanup_env_vars();
        unsafe {
            env::set_var("STT_API_URL", "https://stt.example.test/v1");
        }
        // URL without a key is an invalid half-configuration
        assert!(ServerConfig::from_env().is_err());
        cleanup_env_vars();
    }
}
