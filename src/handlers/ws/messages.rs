//! WebSocket message types and routing
//!
//! Defines the JSON envelope spoken over the kiosk gateway. Every frame is a
//! tagged object; the `type` field selects the variant and payload fields are
//! camelCase. `MessageRoute` is the internal routing enum handed to each
//! connection's writer task.

use serde::{Deserialize, Serialize};

use crate::core::registry::ClientRole;

/// Client → server messages
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum IncomingMessage {
    /// Declare this connection's role. May be sent again; last write wins.
    Identify { role: ClientRole },
    /// Phone entered the photo-booth flow
    PolaroidEntered,
    /// Phone finished (or abandoned) the photo-booth flow
    PhotoCaptured,
    /// Voice query: base64 audio in one of the whitelisted container formats
    VoiceQuery {
        id: String,
        format: String,
        data: String,
    },
    /// Text query; `tts` requests spoken output as well
    TextQuery {
        id: String,
        text: String,
        #[serde(default)]
        tts: bool,
    },
    /// Phone submits an image to open an AI edit session
    StartAiEdit { image: String },
    /// Tablet claims an edit session
    AiEditAccept { session_id: String },
    /// Tablet requests an edit iteration on the session's current image
    AiEditPrompt {
        session_id: String,
        prompt: String,
        #[serde(default)]
        negative_prompt: Option<String>,
    },
    /// Tablet finalizes the session back to the originating phone
    AiEditFinalize {
        session_id: String,
        #[serde(default)]
        final_image: Option<String>,
    },
    /// Either party abandons the session
    AiEditCancel { session_id: String },
    /// Client detected a gap in an AI stream and wants a chunk again
    AiStreamRetransmit { query_id: String, sequence: u64 },
    /// Application-level liveness probe from the client (sensor devices)
    Ping,
    /// Application-level liveness reply from the client
    Pong,
}

/// Server → client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutgoingMessage {
    /// Handshake: sent immediately on accept with the assigned connection id
    Connected { client_id: String },
    /// Pipeline progress marker
    Status { stage: String, message: String },
    /// Stage-tagged failure; the socket stays open for further requests
    Error {
        stage: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Transcript of what the user said (echoed verbatim for text queries)
    SttDone { text: String },
    /// One streamed AI chunk with its envelope metadata
    AiStream {
        session_id: String,
        query_id: String,
        sequence: u64,
        chunk: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// Complete AI response text
    AiDone { text: String },
    /// Synthesized speech for the AI response
    TtsReady { audio: String, duration: f32 },
    /// One-shot notice that the answer is grounded in a web search
    WebSearchActive { message: String },
    /// Broadcast to tablets: a phone entered the photo booth
    PhotoBoothRequested,
    /// Broadcast to tablets: the photo-booth queue drained
    PolaroidQueueEmpty,
    /// Reply to the phone that opened an edit session
    AiEditStarted { session_id: String },
    /// Broadcast to tablets: a phone wants an image edited
    AiEditRequest { session_id: String, image: String },
    /// Reply to the tablet that claimed the session
    AiEditAccepted { session_id: String },
    /// The edit provider is working on the tablet's prompt
    AiEditProcessing { session_id: String },
    /// An edit iteration succeeded; the session's current image changed
    AiEditResult { session_id: String, image: String },
    /// Confirmation to the tablet that the session was finalized
    AiEditFinalized { session_id: String },
    /// Delivery of the final image to the originating phone
    AiEditComplete {
        session_id: String,
        edited_image: String,
    },
    /// The session was cancelled by the named party
    AiEditCancelled { session_id: String, by: String },
    /// An edit operation failed; the session state is unchanged
    AiEditError {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Application-level liveness probe to the client (sensor devices)
    Ping,
    /// Application-level liveness reply to the client
    Pong,
}

/// Internal routing for a connection's writer task
pub enum MessageRoute {
    /// Serialize and send as a text frame
    Outgoing(OutgoingMessage),
    /// Pre-serialized text frame (broadcasts serialize once)
    Serialized(String),
    /// Transport-level ping frame
    Ping,
    /// Send a close frame and end the writer
    Close,
}
