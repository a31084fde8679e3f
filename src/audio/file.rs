use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureConfig, LocalAudioTrack, MediaDevices, MediaStream};

/// A WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into frames of `frame_ms` milliseconds each
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000).max(1) as usize
            * self.channels.max(1) as usize;

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Media device that plays a WAV file back as if it were a microphone
///
/// Frames are published at real-time pace until the track is stopped or,
/// unless `looping` is set, the file runs out.
pub struct WavFileDevice {
    path: PathBuf,
    looping: bool,
    name: String,
}

impl WavFileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("WAV file {}", path.display());
        Self {
            path,
            looping: false,
            name,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

#[async_trait::async_trait]
impl MediaDevices for WavFileDevice {
    async fn get_user_media(&self, config: &CaptureConfig) -> Result<MediaStream> {
        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV loader task failed")??;

        let frames = audio.frames(config.buffer_duration_ms);
        let track = Arc::new(LocalAudioTrack::new());
        let mut stream = MediaStream::new();
        stream.add_track(Arc::clone(&track));

        let sender = stream.frame_sender();
        let stopped = track.stopped();
        let frame_interval = Duration::from_millis(config.buffer_duration_ms.max(1));
        let looping = self.looping;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            let mut index = 0usize;
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if index >= frames.len() {
                    if looping && !frames.is_empty() {
                        index = 0;
                    } else {
                        debug!("WAV playback reached end of file");
                        break;
                    }
                }

                // No subscribers is fine; the analysis graph may not exist yet.
                let _ = sender.send(frames[index].clone());
                index += 1;
            }
        });

        info!(
            "Acquired {} ({}Hz, {} channels)",
            self.name, audio.sample_rate, audio.channels
        );

        Ok(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
