//! Peer transport boundary
//!
//! The session core drives a peer-to-peer media+data connection through these
//! traits and never touches a concrete WebRTC stack. A transport reports
//! everything that happens on its side (remote tracks, event channel
//! lifecycle, inbound channel messages) as `TransportEvent`s on the receiver
//! handed out when it is created.
//!
//! With the `voice` feature, `rtc` provides a WebRTC implementation.

#[cfg(feature = "voice")]
pub mod rtc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::{LocalAudioTrack, MediaStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// An SDP offer or answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Audio arriving from the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
}

/// Something the transport observed
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Remote audio track added
    Track(RemoteTrack),
    /// The event channel is ready for traffic
    ChannelOpen,
    /// Text message received on the event channel
    ChannelMessage(String),
    /// The event channel failed
    ChannelError(String),
    /// The event channel was closed by the remote side
    ChannelClosed,
}

/// Bidirectional event channel multiplexed over the transport
#[async_trait::async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    async fn send(&self, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// One peer connection
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach a local track. Tracks added before `create_offer` are part of it.
    async fn add_track(&self, track: Arc<LocalAudioTrack>, stream: &MediaStream) -> Result<()>;

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    /// The local description to hand to the remote peer. Only valid after
    /// `set_local_description`; may carry gathered candidates the raw offer lacks.
    async fn local_description(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    /// Stop every transceiver. Closing does not do this implicitly.
    async fn stop_transceivers(&self);

    async fn close(&self) -> Result<()>;
}

/// Builds peer connections
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self) -> Result<(Arc<dyn PeerTransport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}
