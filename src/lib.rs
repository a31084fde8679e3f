pub mod audio;
pub mod config;
pub mod error;
pub mod generation;
pub mod http;
pub mod openai;
pub mod realtime;
pub mod session;
pub mod transport;

pub use audio::{
    AnalysisGraph, Analyser, AudioFile, AudioFrame, AudioOutput, CaptureConfig, DiscardOutput,
    LocalAudioTrack, MediaDevices, MediaStream, TrackState, WavFileDevice,
};
pub use config::Config;
pub use error::{GenerationError, ImageGenerationError, SessionError, UpstreamError};
pub use generation::{Generation, GenerationClient};
pub use http::{create_router, AppState};
pub use openai::{GeneratedImage, OpenAiClient};
pub use realtime::{CredentialProvider, EphemeralCredential, RealtimeClient, RealtimeEvent, SdpNegotiator};
pub use session::{
    ConnectionStatus, Role, SessionCollaborators, SessionConfig, TranscriptLog, TranscriptMessage,
    VoiceSession,
};
pub use transport::{
    DataChannel, PeerTransport, RemoteTrack, SessionDescription, TransportEvent, TransportFactory,
};
