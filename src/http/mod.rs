//! HTTP proxy server for the voice client
//!
//! Keeps the long-lived API key on the server and exposes:
//! - POST /api/realtime/token - Issue an ephemeral realtime credential
//! - POST /api/realtime - Exchange an SDP offer for the model's answer
//! - POST /api/compile-prompt - Compile a transcript into an image prompt
//! - POST /api/generate-image - Render an image prompt
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
