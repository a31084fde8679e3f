use std::time::Duration;

use crate::audio::{CaptureConfig, DEFAULT_FFT_SIZE};

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label of the outbound event channel
    pub channel_label: String,

    /// Analyser window size (power of two)
    pub fft_size: usize,

    /// How often the level meter refreshes (one display frame by default)
    pub refresh_interval: Duration,

    /// How long to wait for the event channel to open after negotiation
    pub open_timeout: Duration,

    /// Microphone capture settings
    pub capture: CaptureConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_label: "oai-events".to_string(),
            fft_size: DEFAULT_FFT_SIZE,
            refresh_interval: Duration::from_millis(16), // ~60 Hz
            open_timeout: Duration::from_secs(15),
            capture: CaptureConfig::default(),
        }
    }
}
