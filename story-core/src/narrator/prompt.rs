//! System prompt construction.
//!
//! [`build_prompt`] is a pure function of the narrative state and the prompt
//! configuration: the same inputs always produce the same text.

use crate::segment::{Mood, NarrativeSegment};
use crate::state::{Act, NarrativeState};
use crate::world::WorldStateError;
use serde::Serialize;
use thiserror::Error;

const BASE_PROMPT: &str = include_str!("prompts/narrator_base.txt");

/// Errors from building a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Invalid world state: {0}")]
    InvalidWorldState(#[from] WorldStateError),

    #[error("Failed to serialize prompt context: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for the narrator's system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    /// Language the narrative is written in.
    pub language: String,

    /// Extra style instructions appended after the output schema.
    pub style_notes: Option<String>,

    /// Number of recent segments summarized in the prompt.
    pub history_window: usize,

    /// Characters of each recent segment kept in its summary.
    pub excerpt_chars: usize,
}

impl PromptConfig {
    pub const DEFAULT_LANGUAGE: &'static str = "Portuguese (Portugal)";
    pub const DEFAULT_HISTORY_WINDOW: usize = 5;
    pub const DEFAULT_EXCERPT_CHARS: usize = 100;

    pub fn new() -> Self {
        Self {
            language: Self::DEFAULT_LANGUAGE.to_string(),
            style_notes: None,
            history_window: Self::DEFAULT_HISTORY_WINDOW,
            excerpt_chars: Self::DEFAULT_EXCERPT_CHARS,
        }
    }

    /// Set the narration language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Append extra style instructions.
    pub fn with_style_notes(mut self, notes: impl Into<String>) -> Self {
        self.style_notes = Some(notes.into());
        self
    }

    /// Set how many recent segments are summarized.
    pub fn with_history_window(mut self, segments: usize) -> Self {
        self.history_window = segments;
        self
    }

    /// Set how many characters of each recent segment are kept.
    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Condensed view of a past segment.
#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    text_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chosen_action: Option<&'a str>,
    mood: Mood,
}

impl<'a> HistoryEntry<'a> {
    fn new(segment: &'a NarrativeSegment, last_choice: Option<&str>, excerpt_chars: usize) -> Self {
        let chosen_action = last_choice.and_then(|choice| {
            segment
                .choices()
                .iter()
                .find(|c| c.as_str() == choice)
                .map(String::as_str)
        });

        Self {
            text_summary: excerpt(segment.narrative_text(), excerpt_chars),
            chosen_action,
            mood: segment.mood(),
        }
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// The output contract the model must honor.
fn output_schema() -> String {
    let moods = Mood::ALL
        .iter()
        .map(|m| format!("\"{m}\""))
        .collect::<Vec<_>>()
        .join(" | ");

    format!(
        r#"Your output MUST be a single JSON object with exactly these fields:

{{
  "narrative_text": string,  // The core narrative passage for this segment.
  "choices": string[],       // An array of {min}-{max} distinct choices the user can make.
  "mood": {moods},  // The predominant emotional tone of this segment.
  "image_prompt": string,    // (Optional) A concise, descriptive prompt (in English) for an AI image generator, reflecting the key visual elements of the narrative. Max {image_words} words.
  "audio_prompt": string     // (Optional) A concise, descriptive prompt (in English) for an AI audio generator, reflecting the key auditory elements or background soundscape of the narrative. Max {audio_words} words.
}}

Omit an optional field entirely rather than sending it empty or null.
Ensure that 'mood' accurately reflects the emotional state conveyed by 'narrative_text'.
If generating 'image_prompt' or 'audio_prompt', ensure they are highly relevant to 'narrative_text' and capture its essence."#,
        min = NarrativeSegment::MIN_CHOICES,
        max = NarrativeSegment::MAX_CHOICES,
        image_words = NarrativeSegment::IMAGE_PROMPT_MAX_WORDS,
        audio_words = NarrativeSegment::AUDIO_PROMPT_MAX_WORDS,
    )
}

/// Build the narrator's system prompt for the next turn.
///
/// Only the last `history_window` segments are summarized, so the prompt
/// stays roughly the same size however long the story runs.
pub fn build_prompt(state: &NarrativeState, config: &PromptConfig) -> Result<String, PromptError> {
    state.world().validate()?;
    let world_json = serde_json::to_string_pretty(state.world())?;

    let last_choice = state.last_choice();
    let recent: Vec<_> = state
        .recent_history(config.history_window)
        .iter()
        .map(|segment| HistoryEntry::new(segment, last_choice, config.excerpt_chars))
        .collect();

    let mut prompt = String::new();

    prompt.push_str(&BASE_PROMPT.trim_end().replace("{language}", &config.language));
    prompt.push_str("\n\n");
    prompt.push_str(&output_schema());

    if let Some(ref notes) = config.style_notes {
        prompt.push_str("\n\n## Additional Instructions\n");
        prompt.push_str(notes);
    }

    prompt.push_str("\n\n--- Current Story State ---\n");
    prompt.push_str(&format!("Act: {}/{}\n", state.current_act(), Act::CEILING));
    prompt.push_str(&format!("World State: {world_json}\n"));

    match last_choice {
        Some(choice) => prompt.push_str(&format!("Last User Choice: \"{choice}\"\n")),
        None => prompt.push_str("Last User Choice: None (Start of story)\n"),
    }

    prompt.push_str(&format!(
        "Recent Narrative Context (last {} segments):\n",
        config.history_window
    ));
    if recent.is_empty() {
        prompt.push_str("No history yet.\n");
    } else {
        prompt.push_str(&serde_json::to_string_pretty(&recent)?);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Story Progress: {} segments completed.\n",
        state.progress()
    ));

    prompt.push_str(
        "\nConsidering the above, generate the next segment of the story.\n\
         Remember to strictly follow the JSON output format.\n\
         Focus on progressing the plot, reacting to the 'Last User Choice', and evolving the 'World State'.\n\
         Maintain the established sensory and minimalist literary style.\n",
    );

    Ok(prompt)
}
