//! Realtime voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Microphone capture and the live input level meter
//! - The peer transport and its event channel to the speech model
//! - Transcript extraction from channel events
//! - Connection status and teardown

mod config;
mod pump;
mod session;
mod status;
mod transcript;

pub use config::SessionConfig;
pub use pump::TranscriptHandler;
pub use session::{GenerationHandler, SessionCollaborators, VoiceSession};
pub use status::ConnectionStatus;
pub use transcript::{Role, TranscriptLog, TranscriptMessage};
