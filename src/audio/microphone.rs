// Default system microphone via cpal
//
// cpal streams are not Send, so each acquisition opens the input stream on a
// dedicated capture thread that keeps it alive until the track stops.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::error;

use super::backend::{AudioFrame, CaptureConfig, MediaDevices, MediaStream};
use super::capture::{open_capture_thread, CaptureFormat};

pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaDevices for CpalMicrophone {
    async fn get_user_media(&self, _config: &CaptureConfig) -> Result<MediaStream> {
        open_capture_thread("picasso-microphone", build_input_stream).await
    }

    fn name(&self) -> &str {
        "cpal default input"
    }
}

fn build_input_stream(sender: broadcast::Sender<AudioFrame>) -> Result<(Stream, CaptureFormat)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("Unable to find a default input device")?;

    let input_config = device
        .default_input_config()
        .context("Failed to fetch the default input configuration")?;

    let stream_config: StreamConfig = input_config.clone().into();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;
    let started = Instant::now();
    let err_fn = |err: cpal::StreamError| error!("Input stream error: {err}");

    let publish = move |samples: Vec<i16>| {
        let _ = sender.send(AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: started.elapsed().as_millis() as u64,
        });
    };

    let stream = match input_config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| {
                publish(
                    data.iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect(),
                )
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| publish(data.to_vec()),
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                publish(data.iter().map(|s| (*s as i32 - 32768) as i16).collect())
            },
            err_fn,
            None,
        )?,
        other => return Err(anyhow!("input sample format {:?} is not supported", other)),
    };

    stream
        .play()
        .context("Failed to start the audio input stream")?;

    Ok((
        stream,
        CaptureFormat {
            sample_rate,
            channels,
        },
    ))
}
