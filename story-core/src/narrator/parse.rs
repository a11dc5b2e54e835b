//! Turning raw model output into a validated [`NarrativeSegment`].
//!
//! Two independent stages:
//! - [`normalize`] is a best-effort cleanup of the text (markdown fences,
//!   prose around the record). It never fails.
//! - [`validate`] parses the cleaned text and enforces the segment schema.
//!
//! [`parse`] runs both.

use crate::segment::{check_content, Mood, NarrativeSegment, SegmentError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a response could not be turned into a segment.
#[derive(Debug, Error)]
pub enum MalformedResponse {
    #[error("Response is not valid JSON for a segment: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response is not a JSON object")]
    NotAnObject,

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error("Invalid mood '{mood}', expected one of: calm, tense, joyful, sad, mysterious, epic")]
    UnknownMood { mood: String },
}

/// Record shape the model is instructed to emit.
///
/// `mood` stays a string here so an unknown value gets its own error.
#[derive(Debug, Deserialize)]
struct WireSegment {
    narrative_text: String,
    choices: Vec<String>,
    mood: String,
    #[serde(default)]
    image_prompt: Option<String>,
    #[serde(default)]
    audio_prompt: Option<String>,
}

const FENCE: &str = "```";

/// Remove every markdown fence marker, along with a language tag that
/// directly follows an opening fence.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(FENCE) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + FENCE.len()..];

        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        // A tag sits alone on the fence line; anything else is prose.
        if after_tag.is_empty() || after_tag.starts_with(['\n', '\r']) {
            rest = after_tag;
        }
    }

    out.push_str(rest);
    out
}

/// Narrow `text` to the span from its first `{` to its last `}`.
fn slice_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Best-effort cleanup of raw model output.
pub fn normalize(raw: &str) -> String {
    let unfenced = strip_fences(raw);
    slice_braces(&unfenced).trim().to_string()
}

/// Parse cleaned text and enforce the segment schema.
///
/// Only non-emptiness of `choices` is enforced. The instructed 2-4 range,
/// distinctness, and the media prompt word ceilings are soft expectations:
/// violations are logged and the segment is accepted.
pub fn validate(text: &str) -> Result<NarrativeSegment, MalformedResponse> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(MalformedResponse::NotAnObject);
    }
    let wire: WireSegment = serde_json::from_value(value)?;

    check_content(&wire.narrative_text, &wire.choices)?;
    let mood: Mood = wire
        .mood
        .parse()
        .map_err(|_| MalformedResponse::UnknownMood { mood: wire.mood.clone() })?;

    warn_on_soft_limits(&wire);

    let mut segment = NarrativeSegment::new(wire.narrative_text, wire.choices, mood);
    if let Some(prompt) = wire.image_prompt {
        segment = segment.with_image_prompt(prompt);
    }
    if let Some(prompt) = wire.audio_prompt {
        segment = segment.with_audio_prompt(prompt);
    }
    Ok(segment)
}

/// Normalize then validate raw model output.
pub fn parse(raw: &str) -> Result<NarrativeSegment, MalformedResponse> {
    validate(&normalize(raw))
}

fn warn_on_soft_limits(wire: &WireSegment) {
    let count = wire.choices.len();
    if !(NarrativeSegment::MIN_CHOICES..=NarrativeSegment::MAX_CHOICES).contains(&count) {
        tracing::warn!(count, "segment has an unexpected number of choices");
    }

    let distinct = wire
        .choices
        .iter()
        .enumerate()
        .all(|(i, c)| !wire.choices[..i].contains(c));
    if !distinct {
        tracing::warn!("segment repeats a choice");
    }

    let too_long = |prompt: &Option<String>, limit: usize| {
        prompt
            .as_deref()
            .is_some_and(|p| p.split_whitespace().count() > limit)
    };
    if too_long(&wire.image_prompt, NarrativeSegment::IMAGE_PROMPT_MAX_WORDS) {
        tracing::warn!("image_prompt exceeds its word ceiling");
    }
    if too_long(&wire.audio_prompt, NarrativeSegment::AUDIO_PROMPT_MAX_WORDS) {
        tracing::warn!("audio_prompt exceeds its word ceiling");
    }
}
