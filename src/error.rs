//! Error types shared across the session core and the HTTP surface.

use thiserror::Error;

/// Why a voice session could not be established or was torn down.
///
/// Collaborators report failures as `anyhow::Error`; the session manager
/// attaches the step that failed so callers can tell them apart.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("ephemeral credential request failed: {0:#}")]
    Credential(anyhow::Error),

    #[error("session negotiation failed: {0:#}")]
    Negotiation(anyhow::Error),

    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),

    #[error("event channel did not open within {0:?}")]
    ChannelOpenTimeout(std::time::Duration),

    #[error("session was stopped while starting")]
    Cancelled,
}

/// Failure talking to the upstream model API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("OPENAI_API_KEY not configured")]
    MissingApiKey,

    #[error("upstream returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("upstream returned no data")]
    EmptyResponse,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// User-facing classification of image generation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageGenerationError {
    #[error("Invalid API key")]
    InvalidCredential,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Content policy violation")]
    ContentPolicy,

    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Failed to generate image")]
    Failed(String),
}

const CONTENT_POLICY_DETAILS: &str = "The image prompt contains content that violates OpenAI's usage policies. Please try rephrasing your request to be more appropriate.";

const CONTENT_POLICY_MESSAGE: &str = "Your request was flagged by content safety filters. Please try describing your image differently, focusing on artistic and appropriate content.";

impl ImageGenerationError {
    /// Classify an upstream failure the way the image endpoint reports it.
    pub fn from_upstream(err: &UpstreamError) -> Self {
        match err {
            UpstreamError::Status {
                status,
                code,
                message,
            } => match status {
                401 => ImageGenerationError::InvalidCredential,
                429 => ImageGenerationError::RateLimited,
                400 if code.as_deref() == Some("content_policy_violation")
                    || message.contains("content_policy") =>
                {
                    ImageGenerationError::ContentPolicy
                }
                400 => ImageGenerationError::InvalidRequest(if message.is_empty() {
                    "The prompt may be too long or contain invalid content".to_string()
                } else {
                    message.clone()
                }),
                _ => ImageGenerationError::Failed(message.clone()),
            },
            UpstreamError::EmptyResponse => {
                ImageGenerationError::Failed("No image data returned from OpenAI".to_string())
            }
            other => ImageGenerationError::Failed(other.to_string()),
        }
    }

    /// Rebuild the classification from an `{error, details}` response body.
    pub fn from_response(error: &str, details: Option<&str>) -> Self {
        let details = details.unwrap_or_default().to_string();
        match error {
            "Invalid API key" => ImageGenerationError::InvalidCredential,
            "Rate limit exceeded" => ImageGenerationError::RateLimited,
            "Content policy violation" => ImageGenerationError::ContentPolicy,
            "Invalid request" => ImageGenerationError::InvalidRequest(details),
            _ => ImageGenerationError::Failed(details),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ImageGenerationError::InvalidCredential => 401,
            ImageGenerationError::RateLimited => 429,
            ImageGenerationError::ContentPolicy | ImageGenerationError::InvalidRequest(_) => 400,
            ImageGenerationError::Failed(_) => 500,
        }
    }

    pub fn details(&self) -> String {
        match self {
            ImageGenerationError::InvalidCredential => {
                "Please check your OpenAI API key".to_string()
            }
            ImageGenerationError::RateLimited => {
                "Too many requests, please try again later".to_string()
            }
            ImageGenerationError::ContentPolicy => CONTENT_POLICY_DETAILS.to_string(),
            ImageGenerationError::InvalidRequest(details) => details.clone(),
            ImageGenerationError::Failed(details) if details.is_empty() => {
                "Unknown error occurred".to_string()
            }
            ImageGenerationError::Failed(details) => details.clone(),
        }
    }

    /// Message to show the person who asked for the image.
    pub fn user_message(&self) -> String {
        match self {
            ImageGenerationError::ContentPolicy => CONTENT_POLICY_MESSAGE.to_string(),
            other => other.details(),
        }
    }
}

/// Failure in the caller-side generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No conversation to compile")]
    EmptyTranscript,

    #[error("Failed to compile prompt: {0}")]
    Compile(String),

    #[error("{0}")]
    Image(#[from] ImageGenerationError),

    #[error("Failed to download image: {0}")]
    Download(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    /// Message to show the person who asked for the image.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Image(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, code: Option<&str>, message: &str) -> UpstreamError {
        UpstreamError::Status {
            status,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn classifies_each_upstream_status() {
        assert_eq!(
            ImageGenerationError::from_upstream(&status(401, None, "bad key")),
            ImageGenerationError::InvalidCredential
        );
        assert_eq!(
            ImageGenerationError::from_upstream(&status(429, None, "slow down")),
            ImageGenerationError::RateLimited
        );
        assert_eq!(
            ImageGenerationError::from_upstream(&status(
                400,
                Some("content_policy_violation"),
                "rejected"
            )),
            ImageGenerationError::ContentPolicy
        );
        assert_eq!(
            ImageGenerationError::from_upstream(&status(400, None, "blocked by content_policy")),
            ImageGenerationError::ContentPolicy
        );
        assert_eq!(
            ImageGenerationError::from_upstream(&status(400, None, "prompt too long")),
            ImageGenerationError::InvalidRequest("prompt too long".to_string())
        );
        assert_eq!(
            ImageGenerationError::from_upstream(&status(503, None, "overloaded")),
            ImageGenerationError::Failed("overloaded".to_string())
        );
    }

    #[test]
    fn response_round_trip_keeps_category() {
        for err in [
            ImageGenerationError::InvalidCredential,
            ImageGenerationError::RateLimited,
            ImageGenerationError::ContentPolicy,
            ImageGenerationError::InvalidRequest("too long".to_string()),
            ImageGenerationError::Failed("boom".to_string()),
        ] {
            let rebuilt =
                ImageGenerationError::from_response(&err.to_string(), Some(&err.details()));
            assert_eq!(rebuilt.status_code(), err.status_code());
            assert_eq!(rebuilt.to_string(), err.to_string());
        }
    }

    #[test]
    fn content_policy_has_dedicated_user_message() {
        let msg = ImageGenerationError::ContentPolicy.user_message();
        assert!(msg.contains("content safety filters"));
        assert_ne!(msg, ImageGenerationError::RateLimited.user_message());
    }
}
