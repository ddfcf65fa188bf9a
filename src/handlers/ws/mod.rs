//! # WebSocket gateway module
//!
//! The `/ws` endpoint multiplexes every kiosk client role over one socket:
//! phones, tablets, and embedded sensor devices. A client connects, receives
//! `{"type": "connected", "clientId": "..."}`, declares itself with
//! `{"type": "identify", "role": "phone" | "tablet" | "esp32_sensor"}`, and
//! from then on messages are dispatched by their `type` tag:
//!
//! - `voice_query` / `text_query` — one-shot STT → AI → TTS pipeline with
//!   `status`, `stt_done`, `ai_stream`, `ai_done`, and `tts_ready` events
//! - `polaroid_entered` / `photo_captured` — photo-booth waiting room with
//!   `photo_booth_requested` / `polaroid_queue_empty` tablet broadcasts
//! - `start_ai_edit`, `ai_edit_accept`, `ai_edit_prompt`, `ai_edit_finalize`,
//!   `ai_edit_cancel` — the phone↔tablet image-edit handoff
//! - `ai_stream_retransmit` — re-request a streamed chunk by sequence number
//! - `ping` / `pong` — application-level liveness for sensor devices
//!
//! There is no authentication and roles are self-declared; the gateway is
//! deployed on a closed exhibit network.

pub mod edit_handler;
pub mod handler;
pub mod messages;
pub mod polaroid_handler;
pub mod processor;

pub use handler::{teardown, ws_gateway_handler};
pub use messages::{IncomingMessage, MessageRoute, OutgoingMessage};
