//! Voice and text query orchestrator
//!
//! One-shot pipeline per request: validate → (decode + persist + STT for
//! voice) → streamed AI completion → optional TTS, with status events at each
//! stage and a single stage-tagged error event on any failure. The temp audio
//! file handed to the STT provider is removed on every exit path: immediately
//! when a stage fails (RAII guard) and after a short grace delay on success,
//! tolerating late provider re-reads.
//!
//! Requests are deliberately not serialized per connection: each one runs in
//! its own task, so two queries from the same client may interleave their
//! status events.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::history::ChatRole;
use crate::core::providers::{ChatEvent, ChatEventCallback, ProviderError};
use crate::errors::{PipelineError, PipelineResult, Stage};
use crate::handlers::ws::messages::{MessageRoute, OutgoingMessage};
use crate::state::AppState;

/// Accepted audio container extensions for voice uploads
pub const AUDIO_FORMATS: &[&str] = &["wav", "mp3", "ogg", "webm", "m4a", "flac", "aac"];

/// How long a consumed temp file lingers before deferred removal
const TEMP_FILE_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct VoiceQueryRequest {
    pub id: String,
    pub format: String,
    pub data: String,
}

#[derive(Debug)]
pub struct TextQueryRequest {
    pub id: String,
    pub text: String,
    pub tts: bool,
}

/// Strip an optional `data:<mime>;base64,` prefix from a payload
pub fn strip_data_url_prefix(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some(idx) = data.find(";base64,") {
            return &data[idx + ";base64,".len()..];
        }
    }
    data
}

fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Temp audio file guard
///
/// Dropping the guard removes the file, which covers every early return in
/// the pipeline. The happy path calls [`TempAudio::defer_removal`] instead,
/// which disarms the guard and schedules removal after a grace delay.
pub struct TempAudio {
    path: PathBuf,
    armed: bool,
}

impl TempAudio {
    pub async fn write(
        dir: Option<&Path>,
        request_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        let dir = dir
            .map(|d| d.to_path_buf())
            .unwrap_or_else(std::env::temp_dir);
        let stem = sanitize_file_stem(request_id);
        let path = dir.join(format!("docent_query_{stem}.{extension}"));
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote {} byte(s) of audio to {:?}", bytes.len(), path);
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defer_removal(mut self, grace: Duration) {
        self.armed = false;
        let path = self.path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("Deferred temp file removal failed for {:?}: {}", path, e);
            }
        });
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn emit(tx: &mpsc::Sender<MessageRoute>, message: OutgoingMessage) {
    let _ = tx.send(MessageRoute::Outgoing(message)).await;
}

async fn status(tx: &mpsc::Sender<MessageRoute>, stage: &str, message: &str) {
    emit(
        tx,
        OutgoingMessage::Status {
            stage: stage.to_string(),
            message: message.to_string(),
        },
    )
    .await;
}

async fn emit_pipeline_error(tx: &mpsc::Sender<MessageRoute>, error: &PipelineError) {
    emit(
        tx,
        OutgoingMessage::Error {
            stage: error.stage().as_str().to_string(),
            message: error.to_string(),
            code: Some(error.code().to_string()),
        },
    )
    .await;
}

/// Race a provider call against its stage budget
async fn with_timeout<T, F>(stage: Stage, budget: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(PipelineError::Provider { stage, source }),
        Err(_) => Err(PipelineError::Timeout {
            stage,
            seconds: budget.as_secs(),
        }),
    }
}

/// Entry point for a `voice_query` message
pub async fn run_voice_query(
    state: Arc<AppState>,
    connection_id: String,
    request: VoiceQueryRequest,
    tx: mpsc::Sender<MessageRoute>,
) {
    status(&tx, "received", "Voice query received").await;
    if let Err(error) = voice_stages(&state, &connection_id, request, &tx).await {
        warn!("Voice query failed at {}: {}", error.stage(), error);
        emit_pipeline_error(&tx, &error).await;
    }
}

/// Entry point for a `text_query` message
pub async fn run_text_query(
    state: Arc<AppState>,
    connection_id: String,
    request: TextQueryRequest,
    tx: mpsc::Sender<MessageRoute>,
) {
    status(&tx, "received", "Text query received").await;
    if let Err(error) = text_stages(&state, &connection_id, request, &tx).await {
        warn!("Text query failed at {}: {}", error.stage(), error);
        emit_pipeline_error(&tx, &error).await;
    }
}

fn validate_voice(request: &VoiceQueryRequest) -> PipelineResult<String> {
    if request.id.trim().is_empty() {
        return Err(PipelineError::Validation(
            "voice query requires a non-empty id".to_string(),
        ));
    }
    let format = request.format.trim().to_lowercase();
    if !AUDIO_FORMATS.contains(&format.as_str()) {
        return Err(PipelineError::Validation(format!(
            "unsupported audio format '{}'; expected one of {}",
            request.format,
            AUDIO_FORMATS.join(", ")
        )));
    }
    if request.data.is_empty() {
        return Err(PipelineError::Validation(
            "voice query requires base64 audio data".to_string(),
        ));
    }
    Ok(format)
}

async fn voice_stages(
    state: &Arc<AppState>,
    connection_id: &str,
    request: VoiceQueryRequest,
    tx: &mpsc::Sender<MessageRoute>,
) -> PipelineResult<()> {
    // 1. Payload shape
    let format = validate_voice(&request)?;

    // 2. Required capabilities, before any decoding or I/O
    let stt = state
        .providers
        .stt
        .clone()
        .ok_or(PipelineError::Config {
            capability: "speech-to-text",
        })?;
    if state.providers.chat.is_none() {
        return Err(PipelineError::Config {
            capability: "ai-completion",
        });
    }
    if state.providers.tts.is_none() {
        return Err(PipelineError::Config {
            capability: "text-to-speech",
        });
    }

    // 3. Decode and bound the payload
    let bytes = BASE64
        .decode(strip_data_url_prefix(&request.data))
        .map_err(|_| PipelineError::Validation("audio payload is not valid base64".to_string()))?;
    if bytes.len() > state.config.max_audio_upload_bytes() {
        return Err(PipelineError::Validation(format!(
            "audio exceeds the {} MB upload limit",
            state.config.max_audio_upload_mb
        )));
    }

    // 4. Persist for the file-based STT provider
    status(tx, "uploading", "Storing audio").await;
    let temp = TempAudio::write(
        state.config.audio_temp_dir.as_deref(),
        &request.id,
        &format,
        &bytes,
    )
    .await?;

    // 5. Transcribe
    status(tx, "analyzing", "Transcribing audio").await;
    let transcript = with_timeout(
        Stage::Stt,
        state.config.stt_timeout,
        stt.transcribe(temp.path()),
    )
    .await?;
    info!("Transcribed query {}: {} char(s)", request.id, transcript.len());
    emit(
        tx,
        OutgoingMessage::SttDone {
            text: transcript.clone(),
        },
    )
    .await;

    // 6–7. AI completion and speech, shared with the text path
    chat_stages(state, connection_id, &request.id, transcript, true, tx).await?;

    // 9. Happy-path cleanup after a grace window
    temp.defer_removal(TEMP_FILE_GRACE);
    Ok(())
}

async fn text_stages(
    state: &Arc<AppState>,
    connection_id: &str,
    request: TextQueryRequest,
    tx: &mpsc::Sender<MessageRoute>,
) -> PipelineResult<()> {
    if request.id.trim().is_empty() {
        return Err(PipelineError::Validation(
            "text query requires a non-empty id".to_string(),
        ));
    }
    if request.text.trim().is_empty() {
        return Err(PipelineError::Validation(
            "text query requires non-empty text".to_string(),
        ));
    }
    if state.providers.chat.is_none() {
        return Err(PipelineError::Config {
            capability: "ai-completion",
        });
    }
    if request.tts && state.providers.tts.is_none() {
        return Err(PipelineError::Config {
            capability: "text-to-speech",
        });
    }

    // Synthetic echo so the client UI renders "what you said" uniformly
    emit(
        tx,
        OutgoingMessage::SttDone {
            text: request.text.clone(),
        },
    )
    .await;

    chat_stages(
        state,
        connection_id,
        &request.id,
        request.text,
        request.tts,
        tx,
    )
    .await
}

/// Steps shared by both paths: streamed completion, then optional speech
async fn chat_stages(
    state: &Arc<AppState>,
    connection_id: &str,
    query_id: &str,
    user_text: String,
    want_tts: bool,
    tx: &mpsc::Sender<MessageRoute>,
) -> PipelineResult<()> {
    let chat = state
        .providers
        .chat
        .clone()
        .ok_or(PipelineError::Config {
            capability: "ai-completion",
        })?;

    state
        .history
        .append(connection_id, ChatRole::User, user_text);
    status(tx, "thinking", "Waiting for the assistant").await;
    state.streams.open(connection_id, query_id);

    let streams = state.streams.clone();
    let cb_conn = connection_id.to_string();
    let cb_query = query_id.to_string();
    let cb_tx = tx.clone();
    let on_event: ChatEventCallback = Arc::new(move |event| {
        let streams = streams.clone();
        let conn = cb_conn.clone();
        let query = cb_query.clone();
        let tx = cb_tx.clone();
        Box::pin(async move {
            match event {
                ChatEvent::Chunk(text) => streams.push_chunk(&conn, &query, &text).await,
                ChatEvent::WebSearch => {
                    emit(
                        &tx,
                        OutgoingMessage::WebSearchActive {
                            message: "Searching the web for current information".to_string(),
                        },
                    )
                    .await;
                }
            }
        })
    });

    let history = state.history.history_of(connection_id);
    let outcome = match with_timeout(
        Stage::Ai,
        state.config.ai_timeout,
        chat.generate(&history, on_event),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(error) => {
            state.streams.fail(connection_id, query_id);
            return Err(error);
        }
    };

    state.streams.finish(connection_id, query_id).await;
    emit(
        tx,
        OutgoingMessage::AiDone {
            text: outcome.text.clone(),
        },
    )
    .await;
    state
        .history
        .append(connection_id, ChatRole::Model, outcome.text.clone());

    if want_tts {
        let tts = state
            .providers
            .tts
            .clone()
            .ok_or(PipelineError::Config {
                capability: "text-to-speech",
            })?;
        status(tx, "tts", "Synthesizing speech").await;
        let audio = with_timeout(
            Stage::Tts,
            state.config.tts_timeout,
            tts.synthesize(&outcome.text),
        )
        .await?;
        emit(
            tx,
            OutgoingMessage::TtsReady {
                audio: audio.audio_base64,
                duration: audio.duration_seconds,
            },
        )
        .await;
    }

    Ok(())
}
