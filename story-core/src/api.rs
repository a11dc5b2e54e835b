//! Turn endpoint request and response bodies.
//!
//! These are the JSON shapes a transport layer exchanges with clients, plus
//! [`handle_turn`], which maps a registry outcome to a status code and body.
//! Binding them to an actual HTTP server is left to the host.

use crate::segment::{Mood, NarrativeSegment};
use crate::session::{SessionError, SessionId, SessionRegistry};
use serde::{Deserialize, Serialize};

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_SERVER_ERROR: u16 = 500;

const TURN_FAILED: &str = "Could not generate the next story segment.";
const UNKNOWN_SESSION: &str = "Unknown story session.";

/// Inbound turn request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// The option the reader picked, or `null` to open the story.
    #[serde(default)]
    pub last_choice: Option<String>,
}

/// A segment as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentView {
    pub narrative_text: String,
    pub choices: Vec<String>,
    pub mood: Mood,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_prompt: Option<String>,
}

impl From<&NarrativeSegment> for SegmentView {
    fn from(segment: &NarrativeSegment) -> Self {
        Self {
            narrative_text: segment.narrative_text().to_string(),
            choices: segment.choices().to_vec(),
            mood: segment.mood(),
            image_prompt: segment.image_prompt().map(str::to_string),
            audio_prompt: segment.audio_prompt().map(str::to_string),
        }
    }
}

/// Error descriptor returned on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable summary.
    pub error: String,
    /// The underlying cause.
    pub details: String,
}

/// Response body: a segment on success, an error descriptor otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnBody {
    Segment(SegmentView),
    Error(ErrorBody),
}

/// Status code and body for one turn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub status: u16,
    pub body: TurnBody,
}

impl TurnReply {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl From<&SessionError> for TurnReply {
    fn from(err: &SessionError) -> Self {
        // Upstream and malformed-output failures share one status.
        let (status, error) = match err {
            SessionError::NotFound(_) => (STATUS_NOT_FOUND, UNKNOWN_SESSION),
            _ => (STATUS_SERVER_ERROR, TURN_FAILED),
        };
        Self {
            status,
            body: TurnBody::Error(ErrorBody {
                error: error.to_string(),
                details: err.to_string(),
            }),
        }
    }
}

/// Play one turn of `session_id` on behalf of a transport request.
pub async fn handle_turn(
    registry: &SessionRegistry,
    session_id: SessionId,
    request: TurnRequest,
) -> TurnReply {
    match registry
        .advance(session_id, request.last_choice.as_deref())
        .await
    {
        Ok(segment) => TurnReply {
            status: STATUS_OK,
            body: TurnBody::Segment(SegmentView::from(&segment)),
        },
        Err(err) => TurnReply::from(&err),
    }
}
