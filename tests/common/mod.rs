// In-memory collaborators for driving a VoiceSession without devices or network

#![allow(dead_code)]

use anyhow::{bail, Result};
use chrono::Utc;
use picasso::audio::{
    open_capture_thread, AudioFrame, AudioOutput, CaptureConfig, CaptureFormat, LocalAudioTrack,
    MediaDevices, MediaStream, Playback,
};
use picasso::realtime::{CredentialProvider, EphemeralCredential, SdpNegotiator};
use picasso::session::{SessionCollaborators, SessionConfig, VoiceSession};
use picasso::transport::{
    DataChannel, PeerTransport, RemoteTrack, SessionDescription, TransportEvent, TransportFactory,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const SECRET: &str = "ek_test_secret_value";

// ============================================================================
// Media
// ============================================================================

#[derive(Default)]
pub struct FakeMedia {
    pub fail: bool,
    /// Publish a 440 Hz tone while the track is live
    pub tone: bool,
    pub calls: AtomicUsize,
    pub streams: Mutex<Vec<MediaStream>>,
}

impl FakeMedia {
    pub fn last_stream(&self) -> MediaStream {
        self.streams.lock().unwrap().last().cloned().expect("no stream acquired")
    }
}

#[async_trait::async_trait]
impl MediaDevices for FakeMedia {
    async fn get_user_media(&self, config: &CaptureConfig) -> Result<MediaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("Permission denied");
        }

        let track = Arc::new(LocalAudioTrack::new());
        let mut stream = MediaStream::new();
        stream.add_track(Arc::clone(&track));

        if self.tone {
            let sender = stream.frame_sender();
            let stopped = track.stopped();
            let sample_rate = config.sample_rate;
            let frame_len = (sample_rate as u64 * config.buffer_duration_ms / 1000) as usize;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(5));
                let mut n = 0u64;
                loop {
                    tokio::select! {
                        _ = stopped.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let samples = (0..frame_len)
                        .map(|i| {
                            let t = (n + i as u64) as f32 / sample_rate as f32;
                            ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 16000.0) as i16
                        })
                        .collect();
                    n += frame_len as u64;
                    let _ = sender.send(AudioFrame {
                        samples,
                        sample_rate,
                        channels: 1,
                        timestamp_ms: n * 1000 / sample_rate as u64,
                    });
                }
            });
        }

        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

/// A device opened on its own capture thread, the way a real microphone is.
/// Opening blocks until `release` is notified.
#[derive(Default)]
pub struct ThreadedMedia {
    pub release: Arc<Notify>,
    pub opening: Arc<AtomicBool>,
    /// Set once the device handle has been dropped
    pub closed: Arc<AtomicBool>,
}

pub struct DeviceHandle(Arc<AtomicBool>);

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl MediaDevices for ThreadedMedia {
    async fn get_user_media(&self, config: &CaptureConfig) -> Result<MediaStream> {
        let release = Arc::clone(&self.release);
        let opening = Arc::clone(&self.opening);
        let closed = Arc::clone(&self.closed);
        let format = CaptureFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
        };

        open_capture_thread("fake-capture", move |_frames| {
            opening.store(true, Ordering::SeqCst);
            futures::executor::block_on(release.notified());
            Ok((DeviceHandle(closed), format))
        })
        .await
    }

    fn name(&self) -> &str {
        "threaded fake microphone"
    }
}

// ============================================================================
// Credentials and negotiation
// ============================================================================

#[derive(Default)]
pub struct FakeCredentials {
    pub fail: bool,
    pub expired: bool,
    /// Hold the request until notified
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl CredentialProvider for FakeCredentials {
    async fn fetch_credential(&self) -> Result<EphemeralCredential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            bail!("Failed to get session token (500 Internal Server Error)");
        }

        let lifetime = if self.expired {
            chrono::Duration::seconds(-1)
        } else {
            chrono::Duration::seconds(60)
        };
        Ok(EphemeralCredential::new(
            SECRET,
            Utc::now() + lifetime,
            "sess_test",
            "gpt-realtime",
        ))
    }
}

#[derive(Default)]
pub struct FakeNegotiator {
    pub fail: bool,
    pub offers: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl SdpNegotiator for FakeNegotiator {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
    ) -> Result<SessionDescription> {
        self.offers
            .lock()
            .unwrap()
            .push((offer.sdp.clone(), credential.bearer().to_string()));
        if self.fail {
            bail!("Failed to establish WebRTC connection (400 Bad Request)");
        }
        Ok(SessionDescription::answer("v=0\r\ns=answer\r\n"))
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct FakeChannel {
    pub label: String,
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    pub close_fails: bool,
}

#[async_trait::async_trait]
impl DataChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("channel closed");
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_fails {
            bail!("channel already torn down");
        }
        Ok(())
    }
}

pub struct FakeTransport {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub auto_open: bool,
    pub tracks: Mutex<Vec<String>>,
    pub channels: Mutex<Vec<Arc<FakeChannel>>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub transceivers_stopped: AtomicBool,
    pub closed: AtomicBool,
    pub close_fails: bool,
}

impl FakeTransport {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn message(&self, json: serde_json::Value) {
        self.emit(TransportEvent::ChannelMessage(json.to_string()));
    }

    pub fn channel(&self) -> Arc<FakeChannel> {
        self.channels.lock().unwrap().last().cloned().expect("no channel created")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PeerTransport for FakeTransport {
    async fn add_track(&self, track: Arc<LocalAudioTrack>, _stream: &MediaStream) -> Result<()> {
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let channel = Arc::new(FakeChannel {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_fails: self.close_fails,
        });
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0\r\ns=offer\r\n"))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        *self.local.lock().unwrap() = Some(description.clone());
        Ok(())
    }

    async fn local_description(&self) -> Result<SessionDescription> {
        match self.local.lock().unwrap().clone() {
            Some(local) => Ok(local),
            None => bail!("local description not set"),
        }
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        *self.remote.lock().unwrap() = Some(description.clone());
        if self.auto_open {
            self.emit(TransportEvent::ChannelOpen);
        }
        Ok(())
    }

    async fn stop_transceivers(&self) {
        self.transceivers_stopped.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_fails {
            bail!("peer connection already closed");
        }
        Ok(())
    }
}

pub struct FakeTransports {
    pub auto_open: bool,
    /// Channels and transports created from now on fail to close
    pub close_fails: bool,
    pub created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl Default for FakeTransports {
    fn default() -> Self {
        Self {
            auto_open: true,
            close_fails: false,
            created: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTransports {
    pub fn last(&self) -> Arc<FakeTransport> {
        self.created.lock().unwrap().last().cloned().expect("no transport created")
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TransportFactory for FakeTransports {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport {
            events,
            auto_open: self.auto_open,
            tracks: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            transceivers_stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_fails: self.close_fails,
        });
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok((transport, rx))
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Default)]
pub struct FakeOutput {
    pub played: Mutex<Vec<RemoteTrack>>,
    pub stopped: Arc<AtomicUsize>,
}

struct FakePlayback {
    stopped: Arc<AtomicUsize>,
}

impl AudioOutput for FakeOutput {
    fn play(&self, track: &RemoteTrack) -> Result<Box<dyn Playback>> {
        self.played.lock().unwrap().push(track.clone());
        Ok(Box::new(FakePlayback {
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

impl Playback for FakePlayback {
    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Harness
// ============================================================================

#[derive(Default)]
pub struct Harness {
    pub media: Arc<FakeMedia>,
    pub credentials: Arc<FakeCredentials>,
    pub negotiator: Arc<FakeNegotiator>,
    pub transports: Arc<FakeTransports>,
    pub output: Arc<FakeOutput>,
}

impl Harness {
    pub fn collaborators(&self) -> SessionCollaborators {
        SessionCollaborators {
            media: self.media.clone(),
            credentials: self.credentials.clone(),
            negotiator: self.negotiator.clone(),
            transports: self.transports.clone(),
            output: self.output.clone(),
        }
    }

    pub fn session(&self) -> VoiceSession {
        self.session_with(test_config())
    }

    pub fn session_with(&self, config: SessionConfig) -> VoiceSession {
        VoiceSession::new(config, self.collaborators())
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        refresh_interval: Duration::from_millis(5),
        open_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}
