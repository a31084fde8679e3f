use anyhow::Result;
use tracing::info;

use crate::transport::RemoteTrack;

/// Speaker side of a session: plays audio received from the remote peer
pub trait AudioOutput: Send + Sync {
    fn play(&self, track: &RemoteTrack) -> Result<Box<dyn Playback>>;
}

/// An active playback of one remote track
pub trait Playback: Send {
    /// Pause and detach from the remote track
    fn stop(&mut self);
}

/// Output that accepts remote audio and drops it
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOutput;

struct DiscardPlayback {
    track_id: String,
}

impl AudioOutput for DiscardOutput {
    fn play(&self, track: &RemoteTrack) -> Result<Box<dyn Playback>> {
        info!("Discarding remote audio track {}", track.id);
        Ok(Box::new(DiscardPlayback {
            track_id: track.id.clone(),
        }))
    }
}

impl Playback for DiscardPlayback {
    fn stop(&mut self) {
        info!("Detached remote audio track {}", self.track_id);
    }
}
