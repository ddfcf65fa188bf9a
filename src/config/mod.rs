//! Configuration module for the docent gateway
//!
//! All configuration comes from environment variables (with an optional .env
//! file loaded through dotenvy). The module is split into submodules for
//! maintainability:
//!
//! - `env`: environment variable loading
//! - `utils`: parsing helpers
//! - `validation`: configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use docent::config::ServerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod utils;
mod validation;

pub use utils::{parse_bool, parse_origin_list};

/// Server configuration
///
/// Contains everything needed to run the gateway: listener settings, payload
/// limits, per-stage provider timeouts, heartbeat cadence, subsystem expiry
/// windows, and upstream provider credentials.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Maximum size of a single WebSocket frame accepted from a client.
    pub max_ws_payload_bytes: usize,

    // Query pipeline limits
    pub max_audio_upload_mb: usize,
    /// Directory for temporary audio hand-off files; OS temp dir if unset.
    pub audio_temp_dir: Option<PathBuf>,

    // Per-stage provider timeouts
    pub stt_timeout: Duration,
    pub ai_timeout: Duration,
    pub tts_timeout: Duration,
    pub image_edit_timeout: Duration,

    // Heartbeat cadence
    pub ping_interval: Duration,
    pub sensor_ping_interval: Duration,
    pub sensor_review_interval: Duration,
    pub sensor_pong_grace: Duration,
    pub sensor_max_missed_pings: u32,

    // Subsystem expiry windows
    pub polaroid_timeout: Duration,
    pub edit_session_idle: Duration,
    pub edit_session_sweep: Duration,
    pub stream_idle: Duration,

    // Upstream providers
    pub stt_api_url: Option<String>,
    pub stt_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_image_model: String,
    pub tts_api_url: Option<String>,
    pub tts_api_key: Option<String>,
    pub tts_voice: String,
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Maximum decoded audio upload size in bytes
    pub fn max_audio_upload_bytes(&self) -> usize {
        self.max_audio_upload_mb * 1024 * 1024
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            allowed_origins: Vec::new(),
            max_ws_payload_bytes: 32 * 1024 * 1024,
            max_audio_upload_mb: 10,
            audio_temp_dir: None,
            stt_timeout: Duration::from_secs(30),
            ai_timeout: Duration::from_secs(60),
            tts_timeout: Duration::from_secs(30),
            image_edit_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            sensor_ping_interval: Duration::from_secs(45),
            sensor_review_interval: Duration::from_secs(60),
            sensor_pong_grace: Duration::from_secs(10),
            sensor_max_missed_pings: 2,
            polaroid_timeout: Duration::from_secs(180),
            edit_session_idle: Duration::from_secs(30 * 60),
            edit_session_sweep: Duration::from_secs(10 * 60),
            stream_idle: Duration::from_secs(60),
            stt_api_url: None,
            stt_api_key: None,
            gemini_api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_image_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            tts_api_url: None,
            tts_api_key: None,
            tts_voice: "kiosk-default".to_string(),
        }
    }
}
