use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Downmix to mono floats in [-1.0, 1.0].
    pub fn mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        let scale = 1.0 / i16::MAX as f32;
        self.samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|s| *s as f32 * scale).sum();
                (sum / frame.len() as f32).clamp(-1.0, 1.0)
            })
            .collect()
    }
}

/// Capture settings requested from a media device
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Preferred sample rate in Hz
    pub sample_rate: u32,
    /// Preferred channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,     // Browser default capture rate
            channels: 1,            // Mono
            buffer_duration_ms: 20, // 20ms frames
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// One local capture track. Stopping it ends the capture feeding it.
#[derive(Debug)]
pub struct LocalAudioTrack {
    id: String,
    stopped: CancellationToken,
}

impl LocalAudioTrack {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stopped: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TrackState {
        if self.stopped.is_cancelled() {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn stop(&self) {
        self.stopped.cancel();
    }

    /// Token cancelled when the track stops. Capture tasks select on it.
    pub fn stopped(&self) -> CancellationToken {
        self.stopped.clone()
    }
}

impl Default for LocalAudioTrack {
    fn default() -> Self {
        Self::new()
    }
}

/// A local media stream: its tracks plus a tap of the captured frames.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<LocalAudioTrack>>,
    frames: broadcast::Sender<AudioFrame>,
}

impl MediaStream {
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: Vec::new(),
            frames,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_track(&mut self, track: Arc<LocalAudioTrack>) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[Arc<LocalAudioTrack>] {
        &self.tracks
    }

    /// Sender used by the capturing device to publish frames
    pub fn frame_sender(&self) -> broadcast::Sender<AudioFrame> {
        self.frames.clone()
    }

    /// Subscribe to captured frames (used by the analysis graph)
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames.subscribe()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.state() == TrackState::Live)
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of local microphone streams
///
/// Implementations:
/// - `WavFileDevice`: replays a WAV file in real time (demos/tests)
/// - `CpalMicrophone`: default system input device (feature `microphone`)
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a live microphone stream.
    ///
    /// Fails when access is denied or no device is available.
    async fn get_user_media(&self, config: &CaptureConfig) -> Result<MediaStream>;

    /// Get device name for logging
    fn name(&self) -> &str;
}
