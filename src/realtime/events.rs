//! Inbound realtime events and their mapping to transcript entries.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::session::{Role, TranscriptMessage};

pub const ITEM_CREATED: &str = "conversation.item.created";
pub const ASSISTANT_TRANSCRIPT_DONE: &str = "response.audio_transcript.done";
pub const ASSISTANT_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const INPUT_TRANSCRIPT_COMPLETED: &str =
    "conversation.item.input_audio_transcription.completed";
pub const INPUT_TRANSCRIPT_DELTA: &str = "conversation.item.input_audio_transcription.delta";

/// Events received on the event channel.
///
/// Only the tags the interpreter acts on are modelled; everything else decodes
/// to `Unhandled`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "conversation.item.created")]
    ItemCreated {
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscriptDone {
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptCompleted {
        #[serde(default)]
        transcript: Option<String>,
    },

    // Reserved for incremental rendering
    #[serde(rename = "response.audio_transcript.delta")]
    AssistantTranscriptDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(other)]
    Unhandled,
}

impl RealtimeEvent {
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Wire tag, or `None` for unhandled events
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            RealtimeEvent::ItemCreated { .. } => Some(ITEM_CREATED),
            RealtimeEvent::AssistantTranscriptDone { .. } => Some(ASSISTANT_TRANSCRIPT_DONE),
            RealtimeEvent::InputTranscriptCompleted { .. } => Some(INPUT_TRANSCRIPT_COMPLETED),
            RealtimeEvent::AssistantTranscriptDelta { .. } => Some(ASSISTANT_TRANSCRIPT_DELTA),
            RealtimeEvent::InputTranscriptDelta { .. } => Some(INPUT_TRANSCRIPT_DELTA),
            RealtimeEvent::Unhandled => None,
        }
    }

    /// The transcript entry this event carries, if any.
    pub fn into_transcript(self, timestamp: DateTime<Utc>) -> Option<TranscriptMessage> {
        let tag = self.tag()?;
        let content = match self {
            RealtimeEvent::ItemCreated { transcript }
            | RealtimeEvent::AssistantTranscriptDone { transcript }
            | RealtimeEvent::InputTranscriptCompleted { transcript } => transcript?,
            _ => return None,
        };

        if content.is_empty() {
            return None;
        }

        Some(TranscriptMessage::new(role_for_tag(tag), content, timestamp))
    }
}

/// Speaker inferred from the tag name: tags mentioning `input` are the user.
pub fn role_for_tag(tag: &str) -> Role {
    if tag.contains("input") {
        Role::User
    } else {
        Role::Assistant
    }
}
