use crate::config::Config;
use crate::openai::OpenAiClient;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Upstream client holding the server API key
    pub openai: OpenAiClient,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let openai =
            OpenAiClient::with_base_url(config.openai.api_key.clone(), config.openai.base_url.clone());
        Self {
            config: Arc::new(config),
            openai,
        }
    }
}
