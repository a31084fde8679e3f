use serde::{Deserialize, Serialize};

use crate::realtime::ClientSecret;

#[derive(Debug, Clone, Serialize)]
pub struct StoredPrompt {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionSettings {
    pub model: String,
}

/// Body of `POST /realtime/sessions`
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeSessionRequest {
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<StoredPrompt>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    pub input_audio_transcription: TranscriptionSettings,
}

impl RealtimeSessionRequest {
    /// Use a stored prompt when one is configured, inline instructions otherwise.
    pub fn new(model: impl Into<String>, prompt_id: Option<&str>, instructions: &str) -> Self {
        let prompt = prompt_id
            .filter(|id| !id.is_empty())
            .map(|id| StoredPrompt { id: id.to_string() });
        let instructions = prompt.is_none().then(|| instructions.to_string());

        Self {
            model: model.into(),
            prompt,
            instructions,
            input_audio_transcription: TranscriptionSettings {
                model: "whisper-1".to_string(),
            },
        }
    }
}

/// Subset of the upstream realtime session object
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeSession {
    pub client_secret: ClientSecret,
    pub model: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub quality: String,
}

impl ImageRequest {
    /// One standard-quality 1024x1024 image
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: "dall-e-3".to_string(),
            prompt: prompt.into(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageData {
    pub url: Option<String>,
    pub b64_json: Option<String>,
    pub revised_prompt: Option<String>,
}

/// A generated image, either hosted or inlined as a data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
