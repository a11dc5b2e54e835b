//! Testing utilities for stories.
//!
//! This module provides tools for deterministic tests without a model:
//! - `ScriptedCompletion`, a completion service that replays scripted replies
//! - `TestHarness` for driving a story turn by turn
//! - Assertion helpers for verifying story state

use crate::completion::{CompletionError, CompletionService};
use crate::narrator::{StoryConfig, StoryError, StoryOrchestrator};
use crate::segment::{Mood, NarrativeSegment};
use crate::state::{Act, NarrativeState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A scripted reply from the completion service.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply with this segment encoded as JSON.
    Segment(NarrativeSegment),
    /// Reply with this exact text.
    Raw(String),
    /// Fail with a transport error carrying this message.
    Fail(String),
}

impl ScriptedReply {
    /// The segment wrapped in a markdown code fence, the way chat models
    /// often answer.
    pub fn fenced(segment: &NarrativeSegment) -> Self {
        let json = serde_json::to_string_pretty(segment).unwrap_or_default();
        ScriptedReply::Raw(format!("```json\n{json}\n```"))
    }
}

/// One request the completion service received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub user_message: String,
}

/// A completion service that returns scripted replies in order.
///
/// Every request is recorded. Once the script runs out it repeats its
/// fallback segment if it has one, and otherwise reports itself unavailable.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<NarrativeSegment>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedCompletion {
    /// Create a service with scripted replies.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A service that answers every request with the same segment.
    pub fn repeating(segment: NarrativeSegment) -> Self {
        Self {
            fallback: Some(segment),
            ..Self::default()
        }
    }

    /// Add a reply to the end of the script.
    pub fn queue(&self, reply: ScriptedReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Every request received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// The most recent request.
    pub fn last_call(&self) -> Option<RecordedCall> {
        lock(&self.calls).last().cloned()
    }

    /// Scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, system: &str, user_message: &str) -> Result<String, CompletionError> {
        lock(&self.calls).push(RecordedCall {
            system: system.to_string(),
            user_message: user_message.to_string(),
        });

        let reply = lock(&self.replies)
            .pop_front()
            .or_else(|| self.fallback.clone().map(ScriptedReply::Segment));

        match reply {
            Some(ScriptedReply::Segment(segment)) => serde_json::to_string(&segment)
                .map_err(|e| CompletionError::Unavailable(e.to_string())),
            Some(ScriptedReply::Raw(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(CompletionError::Transport(message)),
            None => Err(CompletionError::Unavailable(
                "no more scripted replies".to_string(),
            )),
        }
    }
}

/// A small valid segment labelled with `label`.
pub fn sample_segment(label: &str) -> NarrativeSegment {
    NarrativeSegment::new(
        format!("{label}: the concrete hall hums under a diffuse neon glow."),
        vec![format!("{label}: go deeper"), format!("{label}: turn back")],
        Mood::Calm,
    )
}

/// Test harness for playing a story turn by turn.
pub struct TestHarness {
    /// The scripted completion service.
    pub completion: Arc<ScriptedCompletion>,
    /// The story under test.
    pub story: StoryOrchestrator,
}

impl TestHarness {
    /// Create a harness with the default story configuration.
    pub fn new() -> Self {
        Self::with_config(StoryConfig::default())
    }

    /// Create a harness with a custom story configuration.
    pub fn with_config(config: StoryConfig) -> Self {
        let completion = Arc::new(ScriptedCompletion::default());
        let story = StoryOrchestrator::new(completion.clone(), config);
        Self { completion, story }
    }

    /// Queue any scripted reply.
    pub fn expect_reply(&mut self, reply: ScriptedReply) -> &mut Self {
        self.completion.queue(reply);
        self
    }

    /// Queue a segment reply.
    pub fn expect_segment(&mut self, segment: NarrativeSegment) -> &mut Self {
        self.completion.queue(ScriptedReply::Segment(segment));
        self
    }

    /// Queue a raw text reply.
    pub fn expect_raw(&mut self, raw: impl Into<String>) -> &mut Self {
        self.completion.queue(ScriptedReply::Raw(raw.into()));
        self
    }

    /// Queue a completion failure.
    pub fn expect_failure(&mut self, message: impl Into<String>) -> &mut Self {
        self.completion.queue(ScriptedReply::Fail(message.into()));
        self
    }

    /// Play one turn.
    pub async fn choose(&mut self, choice: Option<&str>) -> Result<NarrativeSegment, StoryError> {
        self.story.advance(choice).await
    }

    pub fn state(&self) -> &NarrativeState {
        self.story.state()
    }

    pub fn act(&self) -> Act {
        self.state().current_act()
    }

    pub fn progress(&self) -> u32 {
        self.state().progress()
    }

    /// The system prompt of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.completion.last_call().map(|call| call.system)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the story is in the expected act.
#[track_caller]
pub fn assert_act(harness: &TestHarness, act: Act) {
    assert_eq!(
        harness.act(),
        act,
        "Expected act {act}, got act {}",
        harness.act()
    );
}

/// Assert the progress counter and that it agrees with the history.
#[track_caller]
pub fn assert_progress(harness: &TestHarness, progress: u32) {
    let state = harness.state();
    assert_eq!(
        state.progress(),
        progress,
        "Expected progress {progress}, got {}",
        state.progress()
    );
    assert!(
        state.is_consistent(),
        "Progress {} disagrees with history length {}",
        state.progress(),
        state.history().len()
    );
}
