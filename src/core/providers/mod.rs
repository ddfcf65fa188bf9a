//! Upstream AI provider boundary
//!
//! The pipeline and edit handlers consume four capabilities behind traits:
//! speech-to-text, chat completion (streamed), text-to-speech, and image
//! editing. Concrete adapters live in the submodules; tests substitute mocks.
//! Timeouts are the caller's concern: every call site wraps the future in
//! `tokio::time::timeout` with the per-stage configured budget.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::history::ChatTurn;

pub mod chat;
pub mod image;
pub mod stt;
pub mod tts;

pub use chat::GeminiChat;
pub use image::GeminiImageEditor;
pub use stt::HttpSpeechToText;
pub use tts::HttpTextToSpeech;

/// Error type shared by all provider adapters
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error("empty response from service")]
    Empty,
    #[error("could not read audio file: {0}")]
    AudioFile(String),
}

/// Events surfaced while a chat completion streams
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// One incremental text chunk
    Chunk(String),
    /// The provider grounded this answer in a web search (emitted once)
    WebSearch,
}

/// Async callback invoked for each [`ChatEvent`]
pub type ChatEventCallback =
    Arc<dyn Fn(ChatEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Final result of a streamed chat completion
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub used_web_search: bool,
}

/// Synthesized speech payload
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub audio_base64: String,
    pub duration_seconds: f32,
}

/// Speech-to-text: transcribe an audio file from disk
///
/// The provider requires a file path, not in-memory bytes; the pipeline
/// persists uploads to a temp file before calling this.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, ProviderError>;
}

/// Streamed chat completion over the bounded conversation history
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn generate(
        &self,
        history: &[ChatTurn],
        on_event: ChatEventCallback,
    ) -> Result<ChatOutcome, ProviderError>;
}

/// Text-to-speech synthesis of a complete response
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, ProviderError>;
}

/// Prompt-driven image editing
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit(
        &self,
        image_base64: &str,
        prompt: &str,
        negative_prompt: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// The set of configured providers; a `None` capability makes requests that
/// need it fail fast with a config error.
#[derive(Clone, Default)]
pub struct Providers {
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub chat: Option<Arc<dyn ChatCompletion>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub image: Option<Arc<dyn ImageEditor>>,
}

impl Providers {
    /// Build adapters for every capability the configuration enables
    pub fn from_config(config: &ServerConfig) -> Self {
        let stt = match (&config.stt_api_url, &config.stt_api_key) {
            (Some(url), Some(key)) => Some(Arc::new(HttpSpeechToText::new(
                url.clone(),
                key.clone(),
            )) as Arc<dyn SpeechToText>),
            _ => None,
        };
        let chat = config.gemini_api_key.as_ref().map(|key| {
            Arc::new(GeminiChat::new(
                config.gemini_api_url.clone(),
                key.clone(),
                config.gemini_model.clone(),
            )) as Arc<dyn ChatCompletion>
        });
        let tts = match (&config.tts_api_url, &config.tts_api_key) {
            (Some(url), Some(key)) => Some(Arc::new(HttpTextToSpeech::new(
                url.clone(),
                key.clone(),
                config.tts_voice.clone(),
            )) as Arc<dyn TextToSpeech>),
            _ => None,
        };
        let image = config.gemini_api_key.as_ref().map(|key| {
            Arc::new(GeminiImageEditor::new(
                config.gemini_api_url.clone(),
                key.clone(),
                config.gemini_image_model.clone(),
            )) as Arc<dyn ImageEditor>
        });

        tracing::info!(
            "Providers configured: stt={} chat={} tts={} image={}",
            stt.is_some(),
            chat.is_some(),
            tts.is_some(),
            image.is_some()
        );

        Self {
            stt,
            chat,
            tts,
            image,
        }
    }
}
