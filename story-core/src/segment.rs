//! Narrative segments and their mood tags.
//!
//! A segment is the unit the narrator produces each turn. Its serde shape is
//! the exact record the model is instructed to emit, so a segment can be
//! written back out and parsed again without loss.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Predominant emotional tone of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,
    Tense,
    Joyful,
    Sad,
    Mysterious,
    Epic,
}

impl Mood {
    /// Every mood the narrator may use, in the order the prompt lists them.
    pub const ALL: [Mood; 6] = [
        Mood::Calm,
        Mood::Tense,
        Mood::Joyful,
        Mood::Sad,
        Mood::Mysterious,
        Mood::Epic,
    ];

    /// The lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Tense => "tense",
            Mood::Joyful => "joyful",
            Mood::Sad => "sad",
            Mood::Mysterious => "mysterious",
            Mood::Epic => "epic",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known mood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMood(pub String);

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str() == s)
            .ok_or_else(|| UnknownMood(s.to_string()))
    }
}

/// Content rules every segment must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("narrative_text is empty")]
    EmptyNarrative,

    #[error("choices is empty")]
    NoChoices,

    #[error("choice {index} is empty")]
    EmptyChoice { index: usize },
}

/// Check segment content before it is built. Whitespace-only text counts as
/// empty.
pub(crate) fn check_content(narrative_text: &str, choices: &[String]) -> Result<(), SegmentError> {
    if narrative_text.trim().is_empty() {
        return Err(SegmentError::EmptyNarrative);
    }
    if choices.is_empty() {
        return Err(SegmentError::NoChoices);
    }
    if let Some(index) = choices.iter().position(|c| c.trim().is_empty()) {
        return Err(SegmentError::EmptyChoice { index });
    }
    Ok(())
}

/// One produced unit of story.
///
/// Segments are immutable once built; the history owns them afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSegment {
    narrative_text: String,
    choices: Vec<String>,
    mood: Mood,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_prompt: Option<String>,
}

impl NarrativeSegment {
    /// Instructed ceiling on image prompt length, in words.
    pub const IMAGE_PROMPT_MAX_WORDS: usize = 15;

    /// Instructed ceiling on audio prompt length, in words.
    pub const AUDIO_PROMPT_MAX_WORDS: usize = 10;

    /// Instructed bounds on the number of choices.
    pub const MIN_CHOICES: usize = 2;
    pub const MAX_CHOICES: usize = 4;

    /// Create a segment with no media prompts.
    pub fn new(narrative_text: impl Into<String>, choices: Vec<String>, mood: Mood) -> Self {
        Self {
            narrative_text: narrative_text.into(),
            choices,
            mood,
            image_prompt: None,
            audio_prompt: None,
        }
    }

    /// Attach an image generation prompt.
    pub fn with_image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.image_prompt = Some(prompt.into());
        self
    }

    /// Attach an audio generation prompt.
    pub fn with_audio_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.audio_prompt = Some(prompt.into());
        self
    }

    pub fn narrative_text(&self) -> &str {
        &self.narrative_text
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn image_prompt(&self) -> Option<&str> {
        self.image_prompt.as_deref()
    }

    pub fn audio_prompt(&self) -> Option<&str> {
        self.audio_prompt.as_deref()
    }

    /// Verify the content rules. Segments from the parser always pass;
    /// deserialized ones may not.
    pub fn check(&self) -> Result<(), SegmentError> {
        check_content(&self.narrative_text, &self.choices)
    }

    /// Whether `choice` is one of this segment's own options.
    pub fn offers(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c == choice)
    }
}
