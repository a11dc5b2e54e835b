//! The completion service seam.
//!
//! The narrator never talks to a model provider directly. Anything that can
//! turn a system prompt and a user message into text implements
//! [`CompletionService`]; provider clients live outside this crate.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a completion service may report.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Completion service unavailable: {0}")]
    Unavailable(String),
}

/// Produces raw model output for a prompt.
///
/// The returned text is expected to contain a structured segment record but
/// is untrusted; the narrator validates it before use. Implementations should
/// not retry internally, and timeouts or cancellation are the caller's
/// concern.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, user_message: &str) -> Result<String, CompletionError>;
}
