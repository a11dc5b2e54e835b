//! Narrative state: acts, the act schedule, and the turn-by-turn record.

use crate::segment::{NarrativeSegment, SegmentError};
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One of the three coarse narrative phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Act {
    One,
    Two,
    Three,
}

impl Act {
    /// Highest act a story can reach.
    pub const CEILING: u8 = 3;

    pub fn number(self) -> u8 {
        match self {
            Act::One => 1,
            Act::Two => 2,
            Act::Three => 3,
        }
    }

    /// The act that follows this one, if any.
    pub fn next(self) -> Option<Act> {
        match self {
            Act::One => Some(Act::Two),
            Act::Two => Some(Act::Three),
            Act::Three => None,
        }
    }

    pub fn is_final(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for Act {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<u8> for Act {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Act::One),
            2 => Ok(Act::Two),
            3 => Ok(Act::Three),
            other => Err(format!("act must be between 1 and {}, got {other}", Act::CEILING)),
        }
    }
}

impl From<Act> for u8 {
    fn from(act: Act) -> Self {
        act.number()
    }
}

/// Errors from building an [`ActSchedule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Act {0} is the final act and cannot hand over")]
    FinalAct(Act),

    #[error("Act {act} threshold must be at least 1")]
    ZeroThreshold { act: Act },

    #[error("Act {act} threshold {turn} must be after act {other} threshold {other_turn}")]
    OutOfOrder {
        act: Act,
        turn: u32,
        other: Act,
        other_turn: u32,
    },
}

/// Turn thresholds at which the story moves to its next act.
///
/// Each entry fires at most once: only when the progress counter equals its
/// threshold and the story is currently in the entry's act. Thresholds grow
/// strictly from act to act, so every act is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActSchedule {
    thresholds: Vec<(Act, u32)>,
}

impl ActSchedule {
    pub const ACT_ONE_ENDS_AT: u32 = 5;
    pub const ACT_TWO_ENDS_AT: u32 = 10;

    /// A schedule with no transitions; the story stays in act one.
    pub fn empty() -> Self {
        Self {
            thresholds: Vec::new(),
        }
    }

    /// Set the turn at which `from` hands over to the next act.
    ///
    /// The turn must be later than the previous act's threshold and earlier
    /// than the next act's, when those are set.
    pub fn with_threshold(mut self, from: Act, turn: u32) -> Result<Self, ScheduleError> {
        if from.is_final() {
            return Err(ScheduleError::FinalAct(from));
        }
        if turn == 0 {
            return Err(ScheduleError::ZeroThreshold { act: from });
        }
        for (other, other_turn) in &self.thresholds {
            let misordered = (*other < from && *other_turn >= turn)
                || (*other > from && *other_turn <= turn);
            if misordered {
                return Err(ScheduleError::OutOfOrder {
                    act: from,
                    turn,
                    other: *other,
                    other_turn: *other_turn,
                });
            }
        }
        self.thresholds.retain(|(act, _)| *act != from);
        self.thresholds.push((from, turn));
        Ok(self)
    }

    pub fn threshold(&self, from: Act) -> Option<u32> {
        self.thresholds
            .iter()
            .find(|(act, _)| *act == from)
            .map(|(_, turn)| *turn)
    }

    /// The act to move to after the turn that brought progress to `progress`.
    pub fn advancement(&self, current: Act, progress: u32) -> Option<Act> {
        match self.threshold(current) {
            Some(turn) if turn == progress => current.next(),
            _ => None,
        }
    }

    /// The act a story following this schedule is in after `progress` turns.
    pub fn act_at(&self, progress: u32) -> Act {
        let mut act = Act::One;
        while let (Some(turn), Some(next)) = (self.threshold(act), act.next()) {
            if turn > progress {
                break;
            }
            act = next;
        }
        act
    }
}

impl Default for ActSchedule {
    fn default() -> Self {
        Self {
            thresholds: vec![
                (Act::One, Self::ACT_ONE_ENDS_AT),
                (Act::Two, Self::ACT_TWO_ENDS_AT),
            ],
        }
    }
}

/// Why a snapshot cannot be resumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("progress is {progress} but history has {history} segments")]
    ProgressMismatch { progress: u32, history: usize },

    #[error("act {act} does not match progress {progress}, expected act {expected}")]
    ActMismatch {
        act: Act,
        expected: Act,
        progress: u32,
    },

    #[error("history segment {index} is invalid: {source}")]
    InvalidSegment {
        index: usize,
        #[source]
        source: SegmentError,
    },
}

/// The turn-by-turn record of one story.
///
/// Only the orchestrator changes a state; everyone else reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    current_act: Act,
    history: Vec<NarrativeSegment>,
    world: WorldState,
    last_choice: Option<String>,
    progress: u32,
}

impl NarrativeState {
    /// A fresh story in act one with no history.
    pub fn new(world: WorldState) -> Self {
        Self {
            current_act: Act::One,
            history: Vec::new(),
            world,
            last_choice: None,
            progress: 0,
        }
    }

    pub fn current_act(&self) -> Act {
        self.current_act
    }

    /// Every segment produced so far, oldest first.
    pub fn history(&self) -> &[NarrativeSegment] {
        &self.history
    }

    /// The most recently produced segment.
    pub fn current_segment(&self) -> Option<&NarrativeSegment> {
        self.history.last()
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn last_choice(&self) -> Option<&str> {
        self.last_choice.as_deref()
    }

    /// Number of completed turns.
    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// The last `count` segments, oldest first.
    pub fn recent_history(&self, count: usize) -> &[NarrativeSegment] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    /// Whether the progress counter agrees with the history.
    ///
    /// Always true for states produced by the orchestrator. See
    /// [`NarrativeState::check_snapshot`] for the full check.
    pub fn is_consistent(&self) -> bool {
        usize::try_from(self.progress).is_ok_and(|p| p == self.history.len())
    }

    /// Check a state that did not come from an orchestrator, such as a
    /// client-held snapshot, against `schedule`.
    pub fn check_snapshot(&self, schedule: &ActSchedule) -> Result<(), SnapshotError> {
        if !self.is_consistent() {
            return Err(SnapshotError::ProgressMismatch {
                progress: self.progress,
                history: self.history.len(),
            });
        }
        let expected = schedule.act_at(self.progress);
        if self.current_act != expected {
            return Err(SnapshotError::ActMismatch {
                act: self.current_act,
                expected,
                progress: self.progress,
            });
        }
        for (index, segment) in self.history.iter().enumerate() {
            segment
                .check()
                .map_err(|source| SnapshotError::InvalidSegment { index, source })?;
        }
        Ok(())
    }

    pub(crate) fn record_choice(&mut self, choice: Option<&str>) {
        self.last_choice = choice.map(str::to_string);
    }

    pub(crate) fn increment_progress(&mut self) {
        self.progress += 1;
    }

    pub(crate) fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// A copy carrying only what the next prompt reads: everything except
    /// history older than the last `window` segments.
    pub(crate) fn prompt_view(&self, window: usize) -> NarrativeState {
        NarrativeState {
            current_act: self.current_act,
            history: self.recent_history(window).to_vec(),
            world: self.world.clone(),
            last_choice: self.last_choice.clone(),
            progress: self.progress,
        }
    }

    /// Adopt the turn bookkeeping of a staged view and append its segment.
    pub(crate) fn commit_turn(&mut self, staged: NarrativeState, segment: NarrativeSegment) {
        self.last_choice = staged.last_choice;
        self.progress = staged.progress;
        self.world = staged.world;
        self.history.push(segment);
    }

    #[cfg(test)]
    pub(crate) fn push_segment(&mut self, segment: NarrativeSegment) {
        self.history.push(segment);
    }

    pub(crate) fn set_act(&mut self, act: Act) {
        debug_assert!(act >= self.current_act, "acts never move backwards");
        self.current_act = act;
    }
}

impl Default for NarrativeState {
    fn default() -> Self {
        Self::new(WorldState::opening())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Mood;

    fn segment(n: usize) -> NarrativeSegment {
        NarrativeSegment::new(format!("Segment {n}"), vec!["on".into(), "off".into()], Mood::Calm)
    }

    #[test]
    fn test_act_ordering_and_next() {
        assert!(Act::One < Act::Two && Act::Two < Act::Three);
        assert_eq!(Act::One.next(), Some(Act::Two));
        assert_eq!(Act::Three.next(), None);
        assert!(Act::Three.is_final());
    }

    #[test]
    fn test_act_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Act::Two).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Act>("3").unwrap(), Act::Three);
        assert!(serde_json::from_str::<Act>("4").is_err());
    }

    #[test]
    fn test_default_schedule() {
        let schedule = ActSchedule::default();
        assert_eq!(schedule.advancement(Act::One, 4), None);
        assert_eq!(schedule.advancement(Act::One, 5), Some(Act::Two));
        assert_eq!(schedule.advancement(Act::Two, 5), None);
        assert_eq!(schedule.advancement(Act::One, 10), None);
        assert_eq!(schedule.advancement(Act::Two, 10), Some(Act::Three));
        assert_eq!(schedule.advancement(Act::Three, 15), None);
    }

    #[test]
    fn test_schedule_threshold_replacement() {
        let schedule = ActSchedule::default().with_threshold(Act::One, 2).unwrap();

        assert_eq!(schedule.threshold(Act::One), Some(2));
        assert_eq!(schedule.threshold(Act::Two), Some(10));
        assert_eq!(schedule.threshold(Act::Three), None);
    }

    #[test]
    fn test_schedule_rejects_unreachable_acts() {
        assert_eq!(
            ActSchedule::default().with_threshold(Act::Two, 3),
            Err(ScheduleError::OutOfOrder {
                act: Act::Two,
                turn: 3,
                other: Act::One,
                other_turn: 5,
            })
        );
        assert!(matches!(
            ActSchedule::default().with_threshold(Act::One, 10),
            Err(ScheduleError::OutOfOrder { other: Act::Two, .. })
        ));
        assert_eq!(
            ActSchedule::default().with_threshold(Act::Three, 20),
            Err(ScheduleError::FinalAct(Act::Three))
        );
        assert_eq!(
            ActSchedule::empty().with_threshold(Act::One, 0),
            Err(ScheduleError::ZeroThreshold { act: Act::One })
        );

        let later = ActSchedule::default()
            .with_threshold(Act::Two, 20)
            .and_then(|s| s.with_threshold(Act::One, 12))
            .unwrap();
        assert_eq!(later.threshold(Act::One), Some(12));
        assert_eq!(later.threshold(Act::Two), Some(20));
    }

    #[test]
    fn test_act_at_matches_turn_by_turn_replay() {
        let schedules = [
            ActSchedule::default(),
            ActSchedule::empty(),
            ActSchedule::empty().with_threshold(Act::Two, 3).unwrap(),
            ActSchedule::default().with_threshold(Act::One, 1).unwrap(),
        ];
        for schedule in schedules {
            let mut act = Act::One;
            for progress in 0..15 {
                if let Some(next) = schedule.advancement(act, progress) {
                    act = next;
                }
                assert_eq!(schedule.act_at(progress), act, "{schedule:?} at {progress}");
            }
        }
    }

    #[test]
    fn test_fresh_state() {
        let state = NarrativeState::default();
        assert_eq!(state.current_act(), Act::One);
        assert_eq!(state.progress(), 0);
        assert!(state.history().is_empty());
        assert!(state.current_segment().is_none());
        assert!(state.last_choice().is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_recent_history_window() {
        let mut state = NarrativeState::default();
        for n in 0..7 {
            state.push_segment(segment(n));
            state.increment_progress();
        }

        let recent = state.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].narrative_text(), "Segment 2");
        assert_eq!(state.current_segment().map(|s| s.narrative_text()), Some("Segment 6"));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_commit_turn_from_prompt_view() {
        let mut state = NarrativeState::default();
        for n in 0..3 {
            state.push_segment(segment(n));
            state.increment_progress();
        }

        let mut staged = state.prompt_view(1);
        assert_eq!(staged.history().len(), 1);
        staged.record_choice(Some("on"));
        staged.increment_progress();
        staged.world_mut().set("lamp_lit", true);

        state.commit_turn(staged, segment(3));
        assert_eq!(state.progress(), 4);
        assert_eq!(state.history().len(), 4);
        assert_eq!(state.last_choice(), Some("on"));
        assert!(state.world().get("lamp_lit").is_some());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_inconsistent_snapshot_detected() {
        let mut state = NarrativeState::default();
        state.increment_progress();
        assert!(!state.is_consistent());
        assert_eq!(
            state.check_snapshot(&ActSchedule::default()),
            Err(SnapshotError::ProgressMismatch { progress: 1, history: 0 })
        );
    }

    #[test]
    fn test_snapshot_act_must_follow_schedule() {
        let schedule = ActSchedule::default();
        let mut state = NarrativeState::default();
        for n in 0..7 {
            state.push_segment(segment(n));
            state.increment_progress();
        }

        assert_eq!(
            state.check_snapshot(&schedule),
            Err(SnapshotError::ActMismatch {
                act: Act::One,
                expected: Act::Two,
                progress: 7,
            })
        );

        state.set_act(Act::Two);
        assert_eq!(state.check_snapshot(&schedule), Ok(()));

        state.set_act(Act::Three);
        assert!(matches!(
            state.check_snapshot(&schedule),
            Err(SnapshotError::ActMismatch { expected: Act::Two, .. })
        ));
    }

    #[test]
    fn test_snapshot_rejects_invalid_segments() {
        let json = r#"{
            "current_act": 1,
            "history": [{"narrative_text": "", "choices": [], "mood": "calm"}],
            "world": {},
            "last_choice": null,
            "progress": 1
        }"#;
        let state: NarrativeState = serde_json::from_str(json).unwrap();

        assert_eq!(
            state.check_snapshot(&ActSchedule::default()),
            Err(SnapshotError::InvalidSegment {
                index: 0,
                source: SegmentError::EmptyNarrative,
            })
        );
    }
}
