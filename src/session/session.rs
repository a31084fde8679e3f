use super::config::SessionConfig;
use super::pump::{DeliveryGate, EventPump, FatalHandler, PlaybackList, TranscriptHandler};
use super::status::ConnectionStatus;
use super::transcript::TranscriptMessage;
use crate::audio::{spawn_level_loop, AnalysisGraph, AudioOutput, MediaDevices, MediaStream};
use crate::error::SessionError;
use crate::realtime::{CredentialProvider, SdpNegotiator};
use crate::transport::{DataChannel, PeerTransport, TransportFactory};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type GenerationHandler = Arc<dyn Fn() + Send + Sync>;

/// External capabilities a voice session is built from
#[derive(Clone)]
pub struct SessionCollaborators {
    pub media: Arc<dyn MediaDevices>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub negotiator: Arc<dyn SdpNegotiator>,
    pub transports: Arc<dyn TransportFactory>,
    pub output: Arc<dyn AudioOutput>,
}

/// A realtime voice session with a remote speech model
///
/// Owns the microphone stream, the level meter, the peer transport and its
/// event channel. At most one connection attempt is live at a time; `stop`
/// releases whatever the current attempt acquired.
pub struct VoiceSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    collaborators: SessionCollaborators,
    status: Arc<watch::Sender<ConnectionStatus>>,
    level: Arc<watch::Sender<f32>>,
    resources: Mutex<Resources>,
    /// Taken for writing around cancellation; see `EventPump::interpret`
    delivery: DeliveryGate,
    last_error: Mutex<Option<String>>,
    on_generation_ready: Mutex<Option<GenerationHandler>>,
}

/// Everything the current attempt owns. Any subset may be present.
#[derive(Default)]
struct Resources {
    token: Option<CancellationToken>,
    level_loop: Option<JoinHandle<()>>,
    playback: Option<PlaybackList>,
    pump: Option<JoinHandle<()>>,
    channel: Option<Arc<dyn DataChannel>>,
    transport: Option<Arc<dyn PeerTransport>>,
    stream: Option<MediaStream>,
    analysis: Option<AnalysisGraph>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait out any transcript delivery in flight and hold off new ones.
fn quiesce(gate: &RwLock<()>) -> RwLockWriteGuard<'_, ()> {
    gate.write().unwrap_or_else(PoisonError::into_inner)
}

/// Run `future` unless the attempt is cancelled first.
async fn guarded<F: Future>(token: &CancellationToken, future: F) -> Result<F::Output, SessionError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionError::Cancelled),
        output = future => Ok(output),
    }
}

impl VoiceSession {
    pub fn new(config: SessionConfig, collaborators: SessionCollaborators) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (level, _) = watch::channel(0.0f32);

        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                status: Arc::new(status),
                level: Arc::new(level),
                resources: Mutex::new(Resources::default()),
                delivery: Arc::new(RwLock::new(())),
                last_error: Mutex::new(None),
                on_generation_ready: Mutex::new(None),
            }),
        }
    }

    /// Connect to the remote speech model.
    ///
    /// Returns false without touching the current session if one is already
    /// connecting or connected. Any failure along the way releases everything
    /// acquired so far, leaves the status at `Error` and returns false.
    pub async fn start<T, G>(&self, on_transcript: T, on_generation_ready: G) -> bool
    where
        T: Fn(TranscriptMessage) + Send + Sync + 'static,
        G: Fn() + Send + Sync + 'static,
    {
        self.inner
            .start(Arc::new(on_transcript), Arc::new(on_generation_ready))
            .await
    }

    /// Tear the session down. Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        self.inner.stop().await
    }

    /// Stop talking and hand control to the generation handler from `start`.
    pub async fn trigger_generation(&self) {
        let handler = lock(&self.inner.on_generation_ready).clone();
        self.stop().await;
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Send a client event over the open event channel
    pub async fn send_event(&self, event: &serde_json::Value) -> Result<()> {
        let channel = {
            let resources = lock(&self.inner.resources);
            if self.status() != ConnectionStatus::Connected {
                bail!("Session is not connected");
            }
            resources.channel.clone()
        }
        .context("Event channel is not available")?;

        channel.send(event.to_string()).await
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn level(&self) -> f32 {
        *self.inner.level.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn watch_level(&self) -> watch::Receiver<f32> {
        self.inner.level.subscribe()
    }

    /// Why the last attempt failed, if it did
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        let resources = {
            let _delivery = quiesce(&self.inner.delivery);
            let mut resources = lock(&self.inner.resources);
            if let Some(token) = resources.token.take() {
                token.cancel();
            }
            std::mem::take(&mut *resources)
        };
        resources.release_now();
    }
}

impl Inner {
    async fn start(self: &Arc<Self>, on_transcript: TranscriptHandler, on_generation_ready: GenerationHandler) -> bool {
        let Some(token) = self.begin() else {
            warn!("Connection already in progress or established");
            return false;
        };

        *lock(&self.on_generation_ready) = Some(on_generation_ready);

        match self.connect(&token, on_transcript).await {
            Ok(()) => {
                info!("Voice connection established successfully");
                true
            }
            Err(SessionError::Cancelled) => {
                info!("Voice connection abandoned: session was stopped");
                false
            }
            Err(err) => {
                error!("Error setting up realtime session: {}", err);
                self.fail(&token, err).await;
                false
            }
        }
    }

    /// Admit a new attempt if no session is starting or established.
    fn begin(&self) -> Option<CancellationToken> {
        let mut resources = lock(&self.resources);

        let admitted = self.status.send_if_modified(|status| {
            if status.is_active() {
                return false;
            }
            *status = ConnectionStatus::Connecting;
            true
        });
        if !admitted {
            return None;
        }

        let token = CancellationToken::new();
        resources.token = Some(token.clone());
        *lock(&self.last_error) = None;
        Some(token)
    }

    async fn connect(self: &Arc<Self>, token: &CancellationToken, on_transcript: TranscriptHandler) -> Result<(), SessionError> {
        let config = &self.config;
        let collaborators = &self.collaborators;

        // 1. Microphone
        info!("Requesting microphone from {}", collaborators.media.name());
        let stream = guarded(token, collaborators.media.get_user_media(&config.capture))
            .await?
            .map_err(SessionError::Acquisition)?;
        let adopted = stream.clone();
        self.adopt(token, move |r| r.stream = Some(adopted)).await?;

        // 2. Level meter
        let graph = AnalysisGraph::connect(&stream, config.fft_size).map_err(SessionError::Acquisition)?;
        let level_loop = spawn_level_loop(
            graph.analyser(),
            Arc::clone(&self.level),
            token.clone(),
            config.refresh_interval,
        );
        self.adopt(token, move |r| {
            r.analysis = Some(graph);
            r.level_loop = Some(level_loop);
        })
        .await?;

        // 3. Ephemeral credential
        let credential = guarded(token, collaborators.credentials.fetch_credential())
            .await?
            .map_err(SessionError::Credential)?;
        if credential.is_expired() {
            return Err(SessionError::Credential(anyhow!(
                "credential for session {} is already expired",
                credential.session_id
            )));
        }

        // 4. Transport, tracks, event handling, event channel
        let (transport, events) = guarded(token, collaborators.transports.create())
            .await?
            .map_err(SessionError::Transport)?;
        let adopted = Arc::clone(&transport);
        self.adopt(token, move |r| r.transport = Some(adopted)).await?;

        for track in stream.tracks() {
            guarded(token, transport.add_track(Arc::clone(track), &stream))
                .await?
                .map_err(SessionError::Transport)?;
        }

        let (opened_tx, opened_rx) = oneshot::channel();
        let playback: PlaybackList = Arc::new(Mutex::new(Vec::new()));
        let pump = EventPump {
            token: token.clone(),
            status: Arc::clone(&self.status),
            output: Arc::clone(&collaborators.output),
            playback: Arc::clone(&playback),
            on_transcript,
            delivery: Arc::clone(&self.delivery),
            opened: Some(opened_tx),
            on_fatal: Some(self.fatal_handler(token)),
            seen_streams: HashSet::new(),
        };
        let pump = tokio::spawn(pump.run(events));
        self.adopt(token, move |r| {
            r.playback = Some(playback);
            r.pump = Some(pump);
        })
        .await?;

        let channel = guarded(token, transport.create_data_channel(&config.channel_label))
            .await?
            .map_err(SessionError::Transport)?;
        self.adopt(token, move |r| r.channel = Some(channel)).await?;

        // 5. Offer/answer
        let offer = guarded(token, transport.create_offer())
            .await?
            .map_err(SessionError::Transport)?;
        guarded(token, transport.set_local_description(&offer))
            .await?
            .map_err(SessionError::Transport)?;
        let offer = guarded(token, transport.local_description())
            .await?
            .map_err(SessionError::Transport)?;
        let answer = guarded(token, collaborators.negotiator.negotiate(&offer, &credential))
            .await?
            .map_err(SessionError::Negotiation)?;
        guarded(token, transport.set_remote_description(&answer))
            .await?
            .map_err(SessionError::Negotiation)?;

        // 6. Connected once the event channel opens
        match guarded(token, tokio::time::timeout(config.open_timeout, opened_rx)).await? {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(SessionError::Transport(e)),
            Ok(Err(_)) => Err(SessionError::Transport(anyhow!(
                "event channel closed before opening"
            ))),
            Err(_) => Err(SessionError::ChannelOpenTimeout(config.open_timeout)),
        }
    }

    /// Hand a freshly acquired resource to the session.
    ///
    /// If the attempt was cancelled meanwhile, the resource is released here
    /// instead and the attempt ends.
    async fn adopt(&self, token: &CancellationToken, place: impl FnOnce(&mut Resources)) -> Result<(), SessionError> {
        let orphan = {
            let mut resources = lock(&self.resources);
            if !token.is_cancelled() {
                place(&mut resources);
                return Ok(());
            }
            let mut orphan = Resources::default();
            place(&mut orphan);
            orphan
        };

        orphan.release().await;
        Err(SessionError::Cancelled)
    }

    fn fatal_handler(self: &Arc<Self>, token: &CancellationToken) -> FatalHandler {
        let session = Arc::downgrade(self);
        let token = token.clone();
        Box::new(move |err| {
            let Some(session) = session.upgrade() else {
                return;
            };
            error!("Fatal transport error: {}", err);
            tokio::spawn(async move { session.fail(&token, err).await });
        })
    }

    /// Tear down a failed attempt, leaving the status at `Error`.
    async fn fail(&self, token: &CancellationToken, err: SessionError) {
        let resources = {
            let _delivery = quiesce(&self.delivery);
            let mut resources = lock(&self.resources);
            if token.is_cancelled() {
                // Already stopped
                return;
            }
            token.cancel();
            resources.token = None;
            *lock(&self.last_error) = Some(err.to_string());
            self.level.send_replace(0.0);
            self.status.send_replace(ConnectionStatus::Error);
            std::mem::take(&mut *resources)
        };

        resources.release().await;
    }

    async fn stop(&self) {
        info!("Stopping voice connection...");

        let resources = {
            let _delivery = quiesce(&self.delivery);
            let mut resources = lock(&self.resources);
            if let Some(token) = resources.token.take() {
                token.cancel();
            }
            self.level.send_replace(0.0);
            std::mem::take(&mut *resources)
        };

        resources.release().await;

        {
            let resources = lock(&self.resources);
            // A new attempt may have been admitted while releasing
            if resources.token.is_none() {
                self.status.send_replace(ConnectionStatus::Disconnected);
                self.level.send_replace(0.0);
            }
        }

        info!("Voice connection stopped");
    }
}

impl Resources {
    /// Release in dependency order. Only present handles are touched.
    async fn release(mut self) {
        if let Some(level_loop) = self.level_loop.take() {
            level_loop.abort();
        }

        if let Some(playback) = self.playback.take() {
            let mut list = lock(&playback);
            for mut item in list.drain(..) {
                item.stop();
            }
        }

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("Failed to close event channel {}: {:#}", channel.label(), e);
            }
        }

        if let Some(transport) = self.transport.take() {
            transport.stop_transceivers().await;
            if let Err(e) = transport.close().await {
                warn!("Failed to close transport: {:#}", e);
            }
        }

        if let Some(stream) = self.stream.take() {
            stream.stop_all();
        }

        if let Some(analysis) = self.analysis.take() {
            analysis.close();
        }
    }

    /// Synchronous best-effort release for when the session is dropped
    fn release_now(mut self) {
        if let Some(level_loop) = self.level_loop.take() {
            level_loop.abort();
        }
        if let Some(playback) = self.playback.take() {
            for mut item in lock(&playback).drain(..) {
                item.stop();
            }
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        let channel = self.channel.take();
        let transport = self.transport.take();
        if channel.is_some() || transport.is_some() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Some(channel) = channel {
                            if let Err(e) = channel.close().await {
                                warn!("Failed to close event channel {}: {:#}", channel.label(), e);
                            }
                        }
                        if let Some(transport) = transport {
                            transport.stop_transceivers().await;
                            if let Err(e) = transport.close().await {
                                warn!("Failed to close transport: {:#}", e);
                            }
                        }
                    });
                }
                Err(_) => warn!("No runtime to close the transport on; dropping it unclosed"),
            }
        }

        if let Some(stream) = self.stream.take() {
            stream.stop_all();
        }
        if let Some(analysis) = self.analysis.take() {
            analysis.close();
        }
    }
}
