//! The story orchestrator.
//!
//! `StoryOrchestrator` owns one story's state and is the only thing that
//! changes it. Each call to [`StoryOrchestrator::advance`] is one turn:
//! stage the bookkeeping, prompt the completion service, validate the
//! output, and only then commit.

use super::parse::{parse, MalformedResponse};
use super::prompt::{build_prompt, PromptConfig, PromptError};
use crate::completion::{CompletionError, CompletionService};
use crate::segment::NarrativeSegment;
use crate::state::{ActSchedule, NarrativeState, SnapshotError};
use crate::world::{ElapsedTime, WorldRule, WorldState};
use std::sync::Arc;
use thiserror::Error;

/// User message sent on the first turn of a story.
pub const BEGIN_INSTRUCTION: &str = "Begin the narrative.";

/// Errors from a story turn. None of them leave a partial turn behind.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] MalformedResponse),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
}

/// Configuration for a story.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// System prompt settings.
    pub prompt: PromptConfig,

    /// When the story moves between acts.
    pub schedule: ActSchedule,

    /// Per-turn world updates, applied in order.
    pub world_rules: Vec<Arc<dyn WorldRule>>,

    /// World a new story starts with.
    pub initial_world: WorldState,
}

impl StoryConfig {
    /// Default prompt and schedule, the elapsed-time rule, and the opening world.
    pub fn new() -> Self {
        Self {
            prompt: PromptConfig::default(),
            schedule: ActSchedule::default(),
            world_rules: vec![Arc::new(ElapsedTime::default())],
            initial_world: WorldState::opening(),
        }
    }

    /// Set the prompt configuration.
    pub fn with_prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the act schedule.
    pub fn with_schedule(mut self, schedule: ActSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Add a world rule after the existing ones.
    pub fn with_world_rule(mut self, rule: impl WorldRule + 'static) -> Self {
        self.world_rules.push(Arc::new(rule));
        self
    }

    /// Remove all world rules, including the default elapsed-time rule.
    pub fn without_world_rules(mut self) -> Self {
        self.world_rules.clear();
        self
    }

    /// Set the world a new story starts with.
    pub fn with_initial_world(mut self, world: WorldState) -> Self {
        self.initial_world = world;
        self
    }
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one story, one turn at a time.
///
/// An orchestrator has no internal locking; `advance` takes `&mut self`, so
/// sharing one between callers requires external synchronization (see
/// [`crate::session::SessionRegistry`]).
pub struct StoryOrchestrator {
    completion: Arc<dyn CompletionService>,
    config: StoryConfig,
    state: NarrativeState,
}

impl StoryOrchestrator {
    /// Start a new story.
    pub fn new(completion: Arc<dyn CompletionService>, config: StoryConfig) -> Self {
        let state = NarrativeState::new(config.initial_world.clone());
        Self {
            completion,
            config,
            state,
        }
    }

    /// Continue a story from an existing state.
    ///
    /// The state is checked against the configured act schedule first, so a
    /// snapshot edited outside the orchestrator cannot strand the story.
    pub fn resume(
        completion: Arc<dyn CompletionService>,
        config: StoryConfig,
        state: NarrativeState,
    ) -> Result<Self, SnapshotError> {
        state.check_snapshot(&config.schedule)?;
        Ok(Self {
            completion,
            config,
            state,
        })
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &NarrativeState {
        &self.state
    }

    /// An owned copy of the current state.
    pub fn snapshot(&self) -> NarrativeState {
        self.state.clone()
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    /// Play one turn.
    ///
    /// `choice` is the option the reader picked from the previous segment,
    /// or `None` to open the story. On any error the state is exactly as it
    /// was before the call, so the caller can retry with the same choice.
    /// Dropping the returned future before it completes has the same effect.
    pub async fn advance(&mut self, choice: Option<&str>) -> Result<NarrativeSegment, StoryError> {
        let mut staged = self.state.prompt_view(self.config.prompt.history_window);
        staged.record_choice(choice);
        staged.increment_progress();
        let progress = staged.progress();
        for rule in &self.config.world_rules {
            rule.apply(staged.world_mut(), progress);
        }

        let system_prompt = build_prompt(&staged, &self.config.prompt).inspect_err(|e| {
            tracing::warn!(progress, error = %e, "could not build prompt, turn not committed");
        })?;

        tracing::debug!(
            progress,
            act = %staged.current_act(),
            prompt_len = system_prompt.len(),
            "requesting narrative segment"
        );

        let raw = self
            .completion
            .complete(&system_prompt, &user_message(choice))
            .await
            .inspect_err(|e| {
                tracing::warn!(progress, error = %e, "completion failed, turn not committed");
            })?;

        let segment = parse(&raw).inspect_err(|e| {
            tracing::warn!(progress, error = %e, "malformed segment, turn not committed");
        })?;

        tracing::debug!(
            progress,
            mood = %segment.mood(),
            choices = segment.choices().len(),
            "segment accepted"
        );

        self.state.commit_turn(staged, segment.clone());

        if let Some(next) = self
            .config
            .schedule
            .advancement(self.state.current_act(), self.state.progress())
        {
            tracing::info!(
                from = %self.state.current_act(),
                to = %next,
                progress,
                "story advanced to next act"
            );
            self.state.set_act(next);
        }

        Ok(segment)
    }
}

/// The user-facing instruction sent alongside the system prompt.
fn user_message(choice: Option<&str>) -> String {
    match choice {
        Some(choice) => format!("The reader chose: \"{choice}\"\nContinue the story."),
        None => BEGIN_INSTRUCTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Mood;
    use crate::state::Act;
    use crate::testing::{ScriptedCompletion, ScriptedReply};
    use crate::world::WorldValue;

    fn stub_segment() -> NarrativeSegment {
        NarrativeSegment::new(
            "Cold air moves through the crack in the wall.",
            vec!["Follow the draft".into(), "Stay put".into()],
            Mood::Mysterious,
        )
    }

    fn orchestrator(replies: Vec<ScriptedReply>) -> (StoryOrchestrator, Arc<ScriptedCompletion>) {
        let completion = Arc::new(ScriptedCompletion::new(replies));
        let orchestrator = StoryOrchestrator::new(completion.clone(), StoryConfig::default());
        (orchestrator, completion)
    }

    #[test]
    fn test_user_message() {
        assert_eq!(user_message(None), BEGIN_INSTRUCTION);
        assert_eq!(
            user_message(Some("Open the door")),
            "The reader chose: \"Open the door\"\nContinue the story."
        );
    }

    #[tokio::test]
    async fn test_first_turn() {
        let (mut story, completion) = orchestrator(vec![ScriptedReply::Segment(stub_segment())]);

        let segment = story.advance(None).await.unwrap();

        assert_eq!(segment, stub_segment());
        assert_eq!(story.state().progress(), 1);
        assert_eq!(story.state().current_act(), Act::One);
        assert_eq!(story.state().history().len(), 1);
        assert_eq!(story.state().current_segment(), Some(&stub_segment()));
        assert_eq!(
            story.state().world().get(ElapsedTime::DEFAULT_KEY),
            Some(&WorldValue::Integer(5))
        );

        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_message, BEGIN_INSTRUCTION);
        assert!(calls[0].system.contains("Story Progress: 1 segments completed."));
        assert!(calls[0].system.contains(r#""time_elapsed_minutes": 5"#));
    }

    #[tokio::test]
    async fn test_completion_failure_rolls_back() {
        let (mut story, _) = orchestrator(vec![
            ScriptedReply::Segment(stub_segment()),
            ScriptedReply::Fail("connection reset".into()),
        ]);
        story.advance(None).await.unwrap();
        let before = story.snapshot();

        let err = story.advance(Some("Follow the draft")).await.unwrap_err();

        assert!(matches!(err, StoryError::Completion(_)));
        assert_eq!(story.snapshot(), before);
    }

    #[tokio::test]
    async fn test_malformed_response_rolls_back() {
        let (mut story, _) = orchestrator(vec![ScriptedReply::Raw(
            r#"{"narrative_text":"X","choices":["a"],"mood":"happy"}"#.into(),
        )]);

        let err = story.advance(None).await.unwrap_err();

        assert!(matches!(
            err,
            StoryError::MalformedResponse(MalformedResponse::UnknownMood { .. })
        ));
        assert_eq!(story.snapshot(), NarrativeState::default());
    }

    #[tokio::test]
    async fn test_invalid_world_never_reaches_completion() {
        let completion = Arc::new(ScriptedCompletion::new(vec![ScriptedReply::Segment(
            stub_segment(),
        )]));
        let config = StoryConfig::default()
            .with_initial_world(WorldState::new().with("omen", f64::NAN));
        let mut story = StoryOrchestrator::new(completion.clone(), config);

        let err = story.advance(None).await.unwrap_err();

        assert!(matches!(err, StoryError::Prompt(PromptError::InvalidWorldState(_))));
        assert!(completion.calls().is_empty());
        assert_eq!(story.state().progress(), 0);
    }

    #[tokio::test]
    async fn test_custom_schedule_and_rules() {
        #[derive(Debug)]
        struct Reputation;

        impl WorldRule for Reputation {
            fn apply(&self, world: &mut WorldState, progress: u32) {
                world.set("player_reputation", i64::from(progress) * 10);
            }
        }

        let completion = Arc::new(ScriptedCompletion::repeating(stub_segment()));
        let config = StoryConfig::default()
            .without_world_rules()
            .with_world_rule(Reputation)
            .with_schedule(ActSchedule::default().with_threshold(Act::One, 2).unwrap());
        let mut story = StoryOrchestrator::new(completion, config);

        story.advance(None).await.unwrap();
        assert_eq!(story.state().current_act(), Act::One);
        story.advance(Some("Stay put")).await.unwrap();
        assert_eq!(story.state().current_act(), Act::Two);

        let world = story.state().world();
        assert_eq!(world.get("player_reputation"), Some(&WorldValue::Integer(20)));
        assert_eq!(world.get(ElapsedTime::DEFAULT_KEY), Some(&WorldValue::Integer(0)));
    }

    #[tokio::test]
    async fn test_resume_continues_from_snapshot() {
        let (mut story, _) = orchestrator(vec![ScriptedReply::Segment(stub_segment())]);
        story.advance(None).await.unwrap();
        let snapshot = story.snapshot();

        let completion = Arc::new(ScriptedCompletion::repeating(stub_segment()));
        let mut resumed =
            StoryOrchestrator::resume(completion, StoryConfig::default(), snapshot).unwrap();
        resumed.advance(Some("Stay put")).await.unwrap();

        assert_eq!(resumed.state().progress(), 2);
        assert_eq!(resumed.state().last_choice(), Some("Stay put"));
    }

    #[tokio::test]
    async fn test_resume_checks_snapshot_against_schedule() {
        let (mut story, _) = orchestrator(vec![ScriptedReply::Segment(stub_segment())]);
        story.advance(None).await.unwrap();
        let snapshot = story.snapshot();

        // Turn one is act two under this schedule, so an act one snapshot is stale.
        let config = StoryConfig::default()
            .with_schedule(ActSchedule::default().with_threshold(Act::One, 1).unwrap());
        let completion = Arc::new(ScriptedCompletion::default());
        let err = StoryOrchestrator::resume(completion, config, snapshot).err();

        assert!(matches!(err, Some(SnapshotError::ActMismatch { expected: Act::Two, .. })));
    }
}
