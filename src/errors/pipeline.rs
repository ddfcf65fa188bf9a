//! Typed errors for the query pipeline
//!
//! Every pipeline stage returns a `PipelineError` that already carries the
//! stage it failed in, so the handler can emit a stage-tagged error event to
//! the client without inspecting error message text. The client uses the
//! stage to pick feedback copy ("couldn't hear you" vs "AI is unavailable").

use thiserror::Error;

use crate::core::providers::ProviderError;

/// Pipeline stage tags surfaced to clients in error events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Config,
    Upload,
    Stt,
    Ai,
    Tts,
    ImageEdit,
}

impl Stage {
    /// Wire name of the stage, matching the client UI's expectations
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Config => "config",
            Stage::Upload => "upload",
            Stage::Stt => "stt",
            Stage::Ai => "ai",
            Stage::Tts => "tts",
            Stage::ImageEdit => "image_edit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query pipeline error
///
/// The variants mirror the error taxonomy: `Validation` and `Config` are
/// client-resolvable, `Timeout` and `Provider` surface upstream failures.
/// None of them are retried by the server.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or oversized client input
    #[error("{0}")]
    Validation(String),

    /// A required upstream capability is not configured
    #[error("{capability} is not configured")]
    Config { capability: &'static str },

    /// Upstream provider exceeded its time budget
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    /// Upstream provider failed for a reason other than timeout
    #[error("{stage} failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    /// Writing or removing the temporary audio hand-off file failed
    #[error("audio upload failed: {0}")]
    Upload(#[from] std::io::Error),
}

impl PipelineError {
    /// The stage tag reported to the client
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::Config { .. } => Stage::Config,
            PipelineError::Timeout { stage, .. } => *stage,
            PipelineError::Provider { stage, .. } => *stage,
            PipelineError::Upload(_) => Stage::Upload,
        }
    }

    /// The taxonomy code reported to the client
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Config { .. } => "config",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Provider { .. } => "provider_error",
            PipelineError::Upload(_) => "provider_error",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
