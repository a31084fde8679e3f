//! Upstream model API
//!
//! Thin reqwest client for the four calls the proxy server forwards:
//! realtime session creation, SDP exchange, chat completion for prompt
//! compilation and image generation.

mod client;
mod messages;

pub use client::{OpenAiClient, DEFAULT_BASE_URL};
pub use messages::{
    ChatMessage, ChatRequest, GeneratedImage, ImageRequest, RealtimeSession, RealtimeSessionRequest,
    StoredPrompt,
};
