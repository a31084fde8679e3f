// Transport event pump
//
// One task per session drains the transport's event stream: remote tracks go
// to the audio output, channel lifecycle drives the status, and channel
// messages are interpreted into transcript entries. Every event is dropped
// once the session's token is cancelled. Transcript delivery holds the read
// side of the delivery gate; teardown cancels under the write side, so no
// callback runs after `stop` returns.

use anyhow::anyhow;
use chrono::Utc;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::status::ConnectionStatus;
use super::transcript::TranscriptMessage;
use crate::audio::{AudioOutput, Playback};
use crate::error::SessionError;
use crate::realtime::RealtimeEvent;
use crate::transport::{RemoteTrack, TransportEvent};

pub type TranscriptHandler = Arc<dyn Fn(TranscriptMessage) + Send + Sync>;
pub(super) type FatalHandler = Box<dyn FnOnce(SessionError) + Send>;
pub(super) type PlaybackList = Arc<Mutex<Vec<Box<dyn Playback>>>>;
pub(super) type DeliveryGate = Arc<RwLock<()>>;

pub(super) struct EventPump {
    pub token: CancellationToken,
    pub status: Arc<watch::Sender<ConnectionStatus>>,
    pub output: Arc<dyn AudioOutput>,
    pub playback: PlaybackList,
    pub on_transcript: TranscriptHandler,
    pub delivery: DeliveryGate,
    /// Reports the first open (or the failure before it) to `start`
    pub opened: Option<oneshot::Sender<anyhow::Result<()>>>,
    /// Tears the session down after it has opened
    pub on_fatal: Option<FatalHandler>,
    pub seen_streams: HashSet<String>,
}

impl EventPump {
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        debug!("Event pump started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.recv() => event,
            };

            let flow = match event {
                Some(event) => self.handle(event),
                None => self.fatal(anyhow!("transport event stream ended")),
            };

            if flow.is_break() {
                break;
            }
        }

        debug!("Event pump stopped");
    }

    fn handle(&mut self, event: TransportEvent) -> ControlFlow<()> {
        if self.token.is_cancelled() {
            debug!("Ignoring {:?} - session is torn down", event);
            return ControlFlow::Break(());
        }

        match event {
            TransportEvent::Track(track) => self.attach_track(track),
            TransportEvent::ChannelOpen => self.mark_open(),
            TransportEvent::ChannelMessage(text) => self.interpret(&text),
            TransportEvent::ChannelError(reason) => {
                error!("Data channel error: {}", reason);
                return self.fatal(anyhow!("data channel error: {}", reason));
            }
            TransportEvent::ChannelClosed => {
                return self.fatal(anyhow!("event channel closed by remote"));
            }
        }

        ControlFlow::Continue(())
    }

    fn attach_track(&mut self, track: RemoteTrack) {
        if !self.seen_streams.insert(track.stream_id.clone()) {
            debug!("Remote stream {} already playing", track.stream_id);
            return;
        }

        match self.output.play(&track) {
            Ok(mut playback) => {
                let mut list = self.playback.lock().unwrap_or_else(PoisonError::into_inner);
                // Teardown drains this list after cancelling; never add to it afterwards
                if self.token.is_cancelled() {
                    playback.stop();
                } else {
                    list.push(playback);
                }
            }
            Err(e) => warn!("Audio play error for track {}: {:#}", track.id, e),
        }
    }

    fn mark_open(&mut self) {
        let token = &self.token;
        self.status.send_if_modified(|status| {
            if token.is_cancelled() || *status != ConnectionStatus::Connecting {
                return false;
            }
            *status = ConnectionStatus::Connected;
            true
        });

        info!("Data channel opened");

        if let Some(opened) = self.opened.take() {
            let _ = opened.send(Ok(()));
        }
    }

    fn interpret(&self, text: &str) {
        let event = match RealtimeEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Error parsing data channel message: {}", e);
                return;
            }
        };

        if let Some(message) = event.into_transcript(Utc::now()) {
            let _delivering = self.delivery.read().unwrap_or_else(PoisonError::into_inner);
            if self.token.is_cancelled() {
                return;
            }
            debug!("Transcript from {}: {}", message.role, message.content);
            (self.on_transcript)(message);
        }
    }

    fn fatal(&mut self, err: anyhow::Error) -> ControlFlow<()> {
        if let Some(opened) = self.opened.take() {
            let _ = opened.send(Err(err));
        } else if let Some(on_fatal) = self.on_fatal.take() {
            on_fatal(SessionError::Transport(err));
        }
        ControlFlow::Break(())
    }
}
