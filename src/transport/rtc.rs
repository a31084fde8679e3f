// WebRTC transport built on the webrtc crate
//
// Local microphone frames are downmixed, resampled to 48 kHz and sent as
// 20 ms Opus samples. Remote audio is announced as a `TransportEvent::Track`
// and its RTP is drained so the receiver never stalls. Data channel callbacks
// are forwarded as events on the transport's unbounded channel.

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{DataChannel, PeerTransport, RemoteTrack, SdpType, SessionDescription, TransportEvent, TransportFactory};
use crate::audio::{AudioFrame, LocalAudioTrack, MediaStream};

const OPUS_SAMPLE_RATE: u32 = 48000;
const OPUS_FRAME: usize = 960; // 20 ms at 48 kHz
const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);
const GATHER_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Builds peer connections with Opus audio and default interceptors
pub struct WebRtcTransportFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcTransportFactory {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("Failed to register codecs")?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .context("Failed to register interceptors")?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        })
    }

    /// Replace the ICE servers. An empty list gathers host candidates only.
    pub fn with_ice_servers(mut self, urls: Vec<String>) -> Self {
        self.ice_servers = urls;
        self
    }
}

#[async_trait::async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        let peer_connection = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers,
                    ..Default::default()
                })
                .await
                .context("Failed to create peer connection")?,
        );

        let (events, rx) = mpsc::unbounded_channel();

        let on_track_events = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = on_track_events.clone();
                Box::pin(async move {
                    let remote = RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                    };
                    info!("Remote track {} on stream {}", remote.id, remote.stream_id);
                    let _ = events.send(TransportEvent::Track(remote));

                    tokio::spawn(async move {
                        while track.read_rtp().await.is_ok() {}
                        debug!("Remote track {} ended", track.id());
                    });
                })
            },
        ));

        peer_connection.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            info!("Peer connection state: {}", state);
            Box::pin(async {})
        }));

        let transport = WebRtcTransport {
            peer_connection,
            events,
            tasks: Mutex::new(Vec::new()),
        };

        Ok((Arc::new(transport), rx))
    }
}

pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<TransportEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebRtcTransport {
    fn keep(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

#[async_trait::async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&self, track: Arc<LocalAudioTrack>, stream: &MediaStream) -> Result<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: OPUS_SAMPLE_RATE,
                channels: 1,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            track.id().to_owned(),
            stream.id().to_owned(),
        ));

        let rtp_sender = self
            .peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .context("Failed to add local track")?;

        // RTCP has to be read for the interceptors to work
        self.keep(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtp_sender.read(&mut buf).await.is_ok() {}
        }));

        let mut encoder = OpusFrames::new()?;
        let frames = stream.subscribe();
        let stopped = track.stopped();
        self.keep(tokio::spawn(async move {
            send_frames(frames, stopped, &mut encoder, &local).await;
        }));

        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let channel = self
            .peer_connection
            .create_data_channel(label, None)
            .await
            .with_context(|| format!("Failed to create data channel {}", label))?;

        let events = self.events.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = events.send(TransportEvent::ChannelOpen);
            })
        }));

        let events = self.events.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let events = events.clone();
            Box::pin(async move {
                if !message.is_string {
                    debug!("Ignoring binary data channel message ({} bytes)", message.data.len());
                    return;
                }
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::ChannelMessage(text));
                    }
                    Err(e) => warn!("Data channel message is not UTF-8: {}", e),
                }
            })
        }));

        let events = self.events.clone();
        channel.on_error(Box::new(move |err: webrtc::Error| {
            let events = events.clone();
            Box::pin(async move {
                let _ = events.send(TransportEvent::ChannelError(err.to_string()));
            })
        }));

        let events = self.events.clone();
        channel.on_close(Box::new(move || {
            let events = events.clone();
            Box::pin(async move {
                let _ = events.send(TransportEvent::ChannelClosed);
            })
        }));

        Ok(Arc::new(WebRtcDataChannel {
            label: label.to_string(),
            channel,
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        let mut gathered = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await
            .context("Failed to set local description")?;

        if tokio::time::timeout(GATHER_TIMEOUT, gathered.recv()).await.is_err() {
            warn!("ICE gathering incomplete after {:?}, sending what we have", GATHER_TIMEOUT);
        }
        Ok(())
    }

    async fn local_description(&self) -> Result<SessionDescription> {
        let local = self
            .peer_connection
            .local_description()
            .await
            .context("Local description is not set")?;
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await
            .context("Failed to set remote description")
    }

    async fn stop_transceivers(&self) {
        for transceiver in self.peer_connection.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                debug!("Failed to stop transceiver: {}", e);
            }
        }
    }

    async fn close(&self) -> Result<()> {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        self.peer_connection
            .close()
            .await
            .context("Failed to close peer connection")
    }
}

fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription> {
    let sdp = description.sdp.clone();
    let rtc = match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
    };
    rtc.map_err(|e| anyhow!("invalid {} SDP: {}", description.kind, e))
}

struct WebRtcDataChannel {
    label: String,
    channel: Arc<RTCDataChannel>,
}

#[async_trait::async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, text: String) -> Result<()> {
        self.channel
            .send_text(text)
            .await
            .with_context(|| format!("Failed to send on data channel {}", self.label))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close()
            .await
            .with_context(|| format!("Failed to close data channel {}", self.label))
    }
}

async fn send_frames(
    mut frames: broadcast::Receiver<AudioFrame>,
    stopped: tokio_util::sync::CancellationToken,
    encoder: &mut OpusFrames,
    track: &TrackLocalStaticSample,
) {
    loop {
        let frame = tokio::select! {
            _ = stopped.cancelled() => break,
            frame = frames.recv() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Opus sender lagged {} frames", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        for packet in encoder.push(&frame) {
            let sample = Sample {
                data: packet,
                duration: OPUS_FRAME_DURATION,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                debug!("Dropped audio sample: {}", e);
            }
        }
    }

    debug!("Local audio sender stopped");
}

/// Accumulates capture frames into 20 ms mono Opus packets
pub struct OpusFrames {
    encoder: audiopus::coder::Encoder,
    pending: Vec<i16>,
    output: Vec<u8>,
}

impl OpusFrames {
    pub fn new() -> Result<Self> {
        let encoder = audiopus::coder::Encoder::new(
            audiopus::SampleRate::Hz48000,
            audiopus::Channels::Mono,
            audiopus::Application::Voip,
        )
        .map_err(|e| anyhow!("Failed to create Opus encoder: {}", e))?;

        Ok(Self {
            encoder,
            pending: Vec::with_capacity(OPUS_FRAME * 2),
            output: vec![0u8; 1500],
        })
    }

    /// Buffer a frame and return every complete packet it produced.
    pub fn push(&mut self, frame: &AudioFrame) -> Vec<Bytes> {
        let mono = frame.mono_f32();
        let resampled = resample_linear(&mono, frame.sample_rate, OPUS_SAMPLE_RATE);
        self.pending
            .extend(resampled.iter().map(|s| (s * i16::MAX as f32) as i16));

        let mut packets = Vec::new();
        while self.pending.len() >= OPUS_FRAME {
            let chunk: Vec<i16> = self.pending.drain(..OPUS_FRAME).collect();
            match self.encoder.encode(&chunk, &mut self.output) {
                Ok(len) if len > 0 => packets.push(Bytes::copy_from_slice(&self.output[..len])),
                Ok(_) => {}
                Err(e) => warn!("Opus encode error: {}", e),
            }
        }
        packets
    }
}

/// Linear interpolation between sample rates
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || from == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to as u64 / from as u64) as usize;
    let step = from as f64 / to as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = (pos as usize).min(last);
            let next = (index + 1).min(last);
            let frac = (pos - index as f64) as f32;
            samples[index] + (samples[next] - samples[index]) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_linear(&samples, 48000, 48000), samples);
    }

    #[test]
    fn test_resample_upsamples_length_and_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 24000, 48000);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn test_resample_downsamples_length() {
        let out = resample_linear(&vec![0.0; 441], 44100, 48000);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn test_opus_frames_emit_one_packet_per_20ms() {
        let mut frames = OpusFrames::new().unwrap();

        // 10 ms: not enough for a packet yet
        assert!(frames.push(&frame(vec![0; 480], 48000)).is_empty());
        // 30 ms in total
        let packets = frames.push(&frame(vec![0; 960], 48000));
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].is_empty());
        assert_eq!(frames.pending.len(), 480);
    }

    #[test]
    fn test_opus_frames_resample_capture_rate() {
        let mut frames = OpusFrames::new().unwrap();
        // 20 ms at 16 kHz becomes one 48 kHz packet
        let packets = frames.push(&frame(vec![1000; 320], 16000));
        assert_eq!(packets.len(), 1);
        assert!(frames.pending.is_empty());
    }

    #[tokio::test]
    async fn test_offer_carries_audio_and_data_channel() {
        let factory = WebRtcTransportFactory::new()
            .unwrap()
            .with_ice_servers(Vec::new());
        let (transport, _events) = factory.create().await.unwrap();

        let track = Arc::new(LocalAudioTrack::new());
        let mut stream = MediaStream::new();
        stream.add_track(Arc::clone(&track));

        transport.add_track(Arc::clone(&track), &stream).await.unwrap();
        let channel = transport.create_data_channel("oai-events").await.unwrap();
        assert_eq!(channel.label(), "oai-events");

        let offer = transport.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=application"));
        assert!(offer.sdp.to_lowercase().contains("opus/48000"));

        transport.set_local_description(&offer).await.unwrap();
        let local = transport.local_description().await.unwrap();
        assert_eq!(local.kind, SdpType::Offer);
        assert!(local.sdp.contains("m=audio"));

        track.stop();
        transport.stop_transceivers().await;
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_description_before_offer_is_an_error() {
        let factory = WebRtcTransportFactory::new()
            .unwrap()
            .with_ice_servers(Vec::new());
        let (transport, _events) = factory.create().await.unwrap();

        assert!(transport.local_description().await.is_err());
        transport.close().await.unwrap();
    }
}
