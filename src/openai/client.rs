use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use tracing::{debug, info};

use super::messages::{
    ChatRequest, ChatResponse, ErrorEnvelope, GeneratedImage, ImageRequest, ImageResponse,
    RealtimeSession, RealtimeSessionRequest,
};
use crate::error::UpstreamError;
use crate::realtime::credentials::redact;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const BETA_HEADER: &str = "OpenAI-Beta";
const REALTIME_BETA: &str = "realtime=v1";

/// Upstream model API client
///
/// Holds the server-side API key. The SDP exchange may instead be authorised
/// with an ephemeral key supplied by the caller.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn server_key(&self) -> Result<&str, UpstreamError> {
        self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)
    }

    fn post(&self, path: &str, key: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", key))
    }

    /// Create a realtime session and its ephemeral client secret
    pub async fn create_realtime_session(
        &self,
        request: &RealtimeSessionRequest,
    ) -> Result<RealtimeSession, UpstreamError> {
        let key = self.server_key()?;
        info!(
            "Creating realtime session for model {} with key {}",
            request.model,
            redact(key)
        );

        let response = self
            .post("/realtime/sessions", key)
            .header(BETA_HEADER, REALTIME_BETA)
            .json(request)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Trade an SDP offer for the upstream answer.
    ///
    /// `key` is whichever credential the caller presented: an ephemeral
    /// client secret or the server key.
    pub async fn exchange_sdp(&self, key: &str, model: &str, offer: String) -> Result<String, UpstreamError> {
        debug!("Forwarding SDP offer for model {} with key {}", model, redact(key));

        let response = self
            .post("/realtime", key)
            .query(&[("model", model)])
            .header(CONTENT_TYPE, "application/sdp")
            .header(BETA_HEADER, REALTIME_BETA)
            .body(offer)
            .send()
            .await?;

        Ok(check(response).await?.text().await?)
    }

    /// Run a chat completion and return the trimmed reply
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, UpstreamError> {
        let key = self.server_key()?;

        let response = self.post("/chat/completions", key).json(request).send().await?;
        let body: ChatResponse = check(response).await?.json().await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }

    pub async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage, UpstreamError> {
        let key = self.server_key()?;
        info!(
            "Generating image with {} using key {}",
            request.model,
            redact(key)
        );

        let response = self.post("/images/generations", key).json(request).send().await?;
        let body: ImageResponse = check(response).await?.json().await?;

        let image = body.data.into_iter().next().ok_or(UpstreamError::EmptyResponse)?;
        let url = match (image.url, image.b64_json) {
            (Some(url), _) => url,
            (None, Some(b64)) => data_url(&b64),
            (None, None) => return Err(UpstreamError::EmptyResponse),
        };

        Ok(GeneratedImage {
            url,
            revised_prompt: image.revised_prompt,
        })
    }
}

/// Pass successful responses through; turn the rest into `UpstreamError::Status`.
async fn check(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (None, body),
    };

    Err(UpstreamError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

/// Inline a base64 PNG payload as a data URL.
fn data_url(b64: &str) -> String {
    format!("data:image/png;base64,{}", b64)
}
