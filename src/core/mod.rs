pub mod edit_session;
pub mod heartbeat;
pub mod history;
pub mod pipeline;
pub mod polaroid;
pub mod providers;
pub mod registry;
pub mod streaming;

// Re-export commonly used types for convenience
pub use edit_session::{EditSession, EditSessionManager};
pub use history::{ChatRole, ChatTurn, ConversationStore, HISTORY_LIMIT};
pub use polaroid::PolaroidQueue;
pub use providers::{
    ChatCompletion, ChatEvent, ChatOutcome, ImageEditor, ProviderError, Providers, SpeechAudio,
    SpeechToText, TextToSpeech,
};
pub use registry::{ClientRole, ConnectionRegistry};
pub use streaming::StreamRegistry;
