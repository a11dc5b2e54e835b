//! Interactive branching-story engine driven by a text-completion model.
//!
//! This crate provides:
//! - Narrative state with a three-act structure and a free-form world state
//! - Prompt assembly for the narrator persona
//! - Validation of model output into typed narrative segments
//! - A per-turn orchestrator and a registry of concurrent sessions
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use story_core::{SessionRegistry, StoryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let completion = Arc::new(MyCompletionService::new());
//!     let registry = SessionRegistry::new(completion, StoryConfig::default());
//!
//!     let id = registry.create().await;
//!     let opening = registry.advance(id, None).await?;
//!     println!("{}", opening.narrative_text());
//!
//!     let next = registry.advance(id, Some(&opening.choices()[0])).await?;
//!     println!("{}", next.narrative_text());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod completion;
pub mod narrator;
pub mod segment;
pub mod session;
pub mod state;
pub mod testing;
pub mod world;

// Primary public API
pub use api::{handle_turn, ErrorBody, SegmentView, TurnBody, TurnReply, TurnRequest};
pub use completion::{CompletionError, CompletionService};
pub use narrator::{PromptConfig, StoryConfig, StoryError, StoryOrchestrator};
pub use segment::{Mood, NarrativeSegment, SegmentError};
pub use session::{SessionError, SessionId, SessionRegistry};
pub use state::{Act, ActSchedule, NarrativeState, ScheduleError, SnapshotError};
pub use testing::{ScriptedCompletion, ScriptedReply, TestHarness};
pub use world::{ElapsedTime, WorldRule, WorldState, WorldStateError, WorldValue};
