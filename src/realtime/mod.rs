//! Realtime speech service plumbing: credentials, negotiation and events.

pub mod client;
pub mod credentials;
pub mod events;
pub mod messages;

pub use client::RealtimeClient;
pub use credentials::{CredentialProvider, EphemeralCredential, SdpNegotiator};
pub use events::RealtimeEvent;
pub use messages::{ClientSecret, SessionToken};
