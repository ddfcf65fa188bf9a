//! Integration tests for the voice/text query pipeline
//!
//! Drives the orchestrator against mock providers through a registered
//! in-memory connection and asserts the exact event ordering the kiosk
//! frontend depends on.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use docent::config::ServerConfig;
use docent::core::pipeline::{self, TextQueryRequest, VoiceQueryRequest};
use docent::core::providers::{
    ChatCompletion, ChatEvent, ChatEventCallback, ChatOutcome, ProviderError, Providers,
    SpeechAudio, SpeechToText, TextToSpeech,
};
use docent::core::registry::ClientRole;
use docent::core::history::ChatTurn;
use docent::handlers::ws::messages::{IncomingMessage, MessageRoute};
use docent::handlers::ws::processor::handle_incoming_message;
use docent::state::AppState;

// ---------------------------------------------------------------------------
// Mock providers
// ---------------------------------------------------------------------------

struct MockStt {
    transcript: String,
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, ProviderError> {
        assert!(audio_path.exists(), "temp audio must exist during STT");
        Ok(self.transcript.clone())
    }
}

struct MockChat {
    chunks: Vec<String>,
    web_search: bool,
}

#[async_trait]
impl ChatCompletion for MockChat {
    async fn generate(
        &self,
        _history: &[ChatTurn],
        on_event: ChatEventCallback,
    ) -> Result<ChatOutcome, ProviderError> {
        if self.web_search {
            on_event(ChatEvent::WebSearch).await;
        }
        let mut text = String::new();
        for chunk in &self.chunks {
            text.push_str(chunk);
            on_event(ChatEvent::Chunk(chunk.clone())).await;
        }
        Ok(ChatOutcome {
            text,
            used_web_search: self.web_search,
        })
    }
}

struct SlowChat;

#[async_trait]
impl ChatCompletion for SlowChat {
    async fn generate(
        &self,
        _history: &[ChatTurn],
        _on_event: ChatEventCallback,
    ) -> Result<ChatOutcome, ProviderError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(ProviderError::Empty)
    }
}

struct MockTts;

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, _text: &str) -> Result<SpeechAudio, ProviderError> {
        Ok(SpeechAudio {
            audio_base64: "QVVESU8=".to_string(),
            duration_seconds: 1.5,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn long_chunk(seed: &str) -> String {
    // Large enough to flush the coalescing buffer immediately
    seed.repeat(60)
}

fn mock_providers(chunks: Vec<String>, web_search: bool) -> Providers {
    Providers {
        stt: Some(Arc::new(MockStt {
            transcript: "what is a quasar".to_string(),
        })),
        chat: Some(Arc::new(MockChat { chunks, web_search })),
        tts: Some(Arc::new(MockTts)),
        image: None,
    }
}

async fn connect(
    state: &Arc<AppState>,
    role: ClientRole,
) -> (String, mpsc::Receiver<MessageRoute>, mpsc::Sender<MessageRoute>) {
    let (tx, rx) = mpsc::channel(256);
    let id = state
        .registry
        .register(tx.clone(), CancellationToken::new())
        .await;
    state.registry.set_role(&id, role).await;
    (id, rx, tx)
}

fn drain(rx: &mut mpsc::Receiver<MessageRoute>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(route) = rx.try_recv() {
        match route {
            MessageRoute::Outgoing(message) => {
                out.push(serde_json::to_value(&message).expect("serializable"))
            }
            MessageRoute::Serialized(json) => {
                out.push(serde_json::from_str(&json).expect("valid json"))
            }
            _ => {}
        }
    }
    out
}

fn types_of(events: &[serde_json::Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap_or("?").to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Scenario A: text query without TTS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_query_without_tts_emits_expected_sequence() {
    let state = AppState::with_providers(
        ServerConfig::default(),
        mock_providers(vec![long_chunk("Hello from the kiosk. ")], false),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_text_query(
        state.clone(),
        conn.clone(),
        TextQueryRequest {
            id: "q1".to_string(),
            text: "Hello".to_string(),
            tts: false,
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let types = types_of(&events);

    // status(received), stt_done echo, status(thinking), stream, ai_done
    assert_eq!(types[0], "status");
    assert_eq!(events[0]["stage"], "received");
    assert_eq!(types[1], "stt_done");
    assert_eq!(events[1]["text"], "Hello");
    assert_eq!(types[2], "status");
    assert_eq!(events[2]["stage"], "thinking");
    assert!(types[3..].iter().any(|t| t == "ai_stream"));
    assert_eq!(types.last().unwrap(), "ai_done");
    assert!(!types.iter().any(|t| t == "tts_ready"));
    assert!(!types.iter().any(|t| t == "error"));
}

// ---------------------------------------------------------------------------
// Scenario B: text query with TTS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_query_with_tts_appends_speech_events() {
    let state = AppState::with_providers(
        ServerConfig::default(),
        mock_providers(vec![long_chunk("Certainly. ")], false),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_text_query(
        state.clone(),
        conn.clone(),
        TextQueryRequest {
            id: "q2".to_string(),
            text: "Hello".to_string(),
            tts: true,
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let types = types_of(&events);

    // status(tts) then tts_ready, both after ai_done
    let ai_done_at = types.iter().position(|t| t == "ai_done").unwrap();
    let tts_ready_at = types.iter().position(|t| t == "tts_ready").unwrap();
    let status_tts_at = events
        .iter()
        .position(|e| e["type"] == "status" && e["stage"] == "tts")
        .unwrap();
    assert!(status_tts_at > ai_done_at && status_tts_at < tts_ready_at);
    assert_eq!(events[tts_ready_at]["audio"], "QVVESU8=");
    assert_eq!(events[tts_ready_at]["duration"], 1.5);
}

// ---------------------------------------------------------------------------
// Scenario C: oversize voice payload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversize_voice_payload_is_rejected_before_any_temp_file() {
    use base64::Engine;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        max_audio_upload_mb: 1,
        audio_temp_dir: Some(temp_dir.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let state = AppState::with_providers(config, mock_providers(vec!["ok".to_string()], false));
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    let oversized = vec![0u8; 1024 * 1024 + 1];
    let data = base64::engine::general_purpose::STANDARD.encode(&oversized);
    pipeline::run_voice_query(
        state.clone(),
        conn,
        VoiceQueryRequest {
            id: "q3".to_string(),
            format: "wav".to_string(),
            data,
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let errors: Vec<&serde_json::Value> =
        events.iter().filter(|e| e["type"] == "error").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["stage"], "validation");
    assert!(errors[0]["message"].as_str().unwrap().contains("1 MB"));

    // Nothing was persisted
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

// ---------------------------------------------------------------------------
// Voice happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn voice_query_transcribes_then_streams_then_speaks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        audio_temp_dir: Some(temp_dir.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let state = AppState::with_providers(
        config,
        mock_providers(vec![long_chunk("A quasar is. ")], false),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    use base64::Engine;
    let data = base64::engine::general_purpose::STANDARD.encode(b"riff-wav-bytes");
    pipeline::run_voice_query(
        state.clone(),
        conn,
        VoiceQueryRequest {
            id: "q4".to_string(),
            format: "WAV".to_string(),
            data: format!("data:audio/wav;base64,{data}"),
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let types = types_of(&events);
    let stage_of = |i: usize| events[i]["stage"].as_str().unwrap_or("").to_string();

    assert_eq!((types[0].as_str(), stage_of(0).as_str()), ("status", "received"));
    assert_eq!((types[1].as_str(), stage_of(1).as_str()), ("status", "uploading"));
    assert_eq!((types[2].as_str(), stage_of(2).as_str()), ("status", "analyzing"));
    assert_eq!(types[3], "stt_done");
    assert_eq!(events[3]["text"], "what is a quasar");
    assert!(types.contains(&"ai_done".to_string()));
    assert!(types.contains(&"tts_ready".to_string()));
    assert!(!types.contains(&"error".to_string()));
}

#[tokio::test]
async fn voice_query_without_stt_fails_fast_with_config_error() {
    let providers = Providers {
        stt: None,
        ..mock_providers(vec!["x".to_string()], false)
    };
    let state = AppState::with_providers(ServerConfig::default(), providers);
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_voice_query(
        state.clone(),
        conn,
        VoiceQueryRequest {
            id: "q5".to_string(),
            format: "wav".to_string(),
            data: "QUJD".to_string(),
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["stage"], "config");
    assert!(error["message"].as_str().unwrap().contains("speech-to-text"));
}

// ---------------------------------------------------------------------------
// Timeout mapping and web search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_ai_surfaces_a_timeout_error_tagged_ai() {
    let config = ServerConfig {
        ai_timeout: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let providers = Providers {
        chat: Some(Arc::new(SlowChat)),
        ..mock_providers(vec![], false)
    };
    let state = AppState::with_providers(config, providers);
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_text_query(
        state.clone(),
        conn.clone(),
        TextQueryRequest {
            id: "q6".to_string(),
            text: "Hello".to_string(),
            tts: false,
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["stage"], "ai");
    assert_eq!(error["code"], "timeout");
    // The failed stream was dropped immediately
    assert!(state.streams.retransmit(&conn, "q6", 0).is_none());
}

#[tokio::test]
async fn web_search_notice_arrives_before_the_stream() {
    let state = AppState::with_providers(
        ServerConfig::default(),
        mock_providers(vec![long_chunk("Grounded answer. ")], true),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_text_query(
        state.clone(),
        conn,
        TextQueryRequest {
            id: "q7".to_string(),
            text: "today's news".to_string(),
            tts: false,
        },
        tx,
    )
    .await;

    let events = drain(&mut rx);
    let types = types_of(&events);
    let notice_at = types.iter().position(|t| t == "web_search_active").unwrap();
    let first_chunk_at = types.iter().position(|t| t == "ai_stream").unwrap();
    assert!(notice_at < first_chunk_at);
    assert_eq!(
        types.iter().filter(|t| *t == "web_search_active").count(),
        1
    );
}

// ---------------------------------------------------------------------------
// Streaming retransmit through the dispatch path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retransmit_request_replays_a_stored_chunk() {
    let state = AppState::with_providers(
        ServerConfig::default(),
        mock_providers(vec![long_chunk("chunk one. "), long_chunk("chunk two. ")], false),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    pipeline::run_text_query(
        state.clone(),
        conn.clone(),
        TextQueryRequest {
            id: "q8".to_string(),
            text: "Hello".to_string(),
            tts: false,
        },
        tx.clone(),
    )
    .await;
    let original = drain(&mut rx);
    let first_chunk = original
        .iter()
        .find(|e| e["type"] == "ai_stream" && e["sequence"] == 0)
        .unwrap()
        .clone();

    let more = handle_incoming_message(
        IncomingMessage::AiStreamRetransmit {
            query_id: "q8".to_string(),
            sequence: 0,
        },
        &conn,
        &tx,
        &state,
    )
    .await;
    assert!(more);

    let replayed = drain(&mut rx);
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["chunk"], first_chunk["chunk"]);
    assert_eq!(replayed[0]["sequence"], 0);
}

// ---------------------------------------------------------------------------
// Conversation history bound across queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_capped_at_seven_turns_in_order() {
    let state = AppState::with_providers(
        ServerConfig::default(),
        mock_providers(vec![long_chunk("reply. ")], false),
    );
    let (conn, mut rx, tx) = connect(&state, ClientRole::Phone).await;

    for i in 0..5 {
        pipeline::run_text_query(
            state.clone(),
            conn.clone(),
            TextQueryRequest {
                id: format!("q{i}"),
                text: format!("question {i}"),
                tts: false,
            },
            tx.clone(),
        )
        .await;
    }
    drain(&mut rx);

    // 5 queries appended 10 turns; only the most recent 7 remain
    let history = state.history.history_of(&conn);
    assert_eq!(history.len(), 7);
    assert_eq!(history[1].content, "question 2");
    assert_eq!(history.last().unwrap().content, long_chunk("reply. "));
}
