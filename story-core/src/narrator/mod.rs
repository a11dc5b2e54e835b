//! AI narrator module.
//!
//! Contains the prompt builder, the response parser, and the orchestrator
//! that ties them to a completion service.

mod orchestrator;
pub mod parse;
pub mod prompt;

pub use orchestrator::{StoryConfig, StoryError, StoryOrchestrator, BEGIN_INSTRUCTION};
pub use parse::{normalize, parse, validate, MalformedResponse};
pub use prompt::{build_prompt, PromptConfig, PromptError};
