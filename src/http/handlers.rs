use super::state::AppState;
use crate::error::{ImageGenerationError, UpstreamError};
use crate::generation::prompts::{COMPILATION_SYSTEM_PROMPT, PICASSO_INSTRUCTIONS, TRANSCRIPT_HEADER};
use crate::openai::{ChatMessage, ChatRequest, ImageRequest, RealtimeSessionRequest};
use crate::realtime::client::EPHEMERAL_KEY_HEADER;
use crate::realtime::credentials::redact;
use crate::realtime::SessionToken;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SdpParams {
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompilePromptResponse {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
        .into_response()
}

fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn missing_key() -> Response {
    error!("OPENAI_API_KEY not configured");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "OPENAI_API_KEY not configured",
        None,
    )
}

/// Pull a non-empty string field out of a JSON body.
fn string_field(body: &[u8], field: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get(field)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/realtime/token
/// Create an upstream realtime session and hand back its ephemeral secret
pub async fn create_token(State(state): State<AppState>) -> Response {
    if !state.openai.has_api_key() {
        return missing_key();
    }

    let settings = &state.config.openai;
    let request = RealtimeSessionRequest::new(
        settings.realtime_model.clone(),
        settings.realtime_prompt_id.as_deref(),
        PICASSO_INSTRUCTIONS,
    );

    match state.openai.create_realtime_session(&request).await {
        Ok(session) => {
            info!(
                "Created realtime session {} ({}), secret {}",
                session.id,
                session.model,
                redact(&session.client_secret.value)
            );
            let expires_at = Some(session.client_secret.expires_at);
            (
                StatusCode::OK,
                Json(SessionToken {
                    client_secret: session.client_secret,
                    model: session.model,
                    id: session.id,
                    expires_at,
                }),
            )
                .into_response()
        }
        Err(UpstreamError::Status {
            status, message, ..
        }) => {
            error!("Upstream rejected realtime session ({}): {}", status, message);
            error_response(
                upstream_status(status),
                "Failed to create session",
                Some(message),
            )
        }
        Err(e) => {
            error!("Error creating realtime session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

/// POST /api/realtime?model=
/// Forward an SDP offer upstream and return the answer
pub async fn exchange_sdp(
    State(state): State<AppState>,
    Query(params): Query<SdpParams>,
    headers: HeaderMap,
    offer: String,
) -> Response {
    let ephemeral = headers
        .get(EPHEMERAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let Some(key) = ephemeral.or_else(|| state.openai.api_key()) else {
        return (StatusCode::UNAUTHORIZED, "API key not found").into_response();
    };

    let model = params
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.openai.realtime_model.clone());

    debug!("Proxying SDP offer ({} bytes) for model {}", offer.len(), model);

    match state.openai.exchange_sdp(key, &model, offer).await {
        Ok(answer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/sdp")],
            answer,
        )
            .into_response(),
        Err(UpstreamError::Status {
            status, message, ..
        }) => {
            error!("Realtime API error ({}): {}", status, message);
            (
                upstream_status(status),
                [(header::CONTENT_TYPE, "text/plain")],
                message,
            )
                .into_response()
        }
        Err(e) => {
            error!("Error proxying SDP: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// POST /api/compile-prompt
/// Compile a conversation transcript into a single image prompt
pub async fn compile_prompt(State(state): State<AppState>, body: Bytes) -> Response {
    if !state.openai.has_api_key() {
        return missing_key();
    }

    let Some(transcript) = string_field(&body, "transcript") else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid transcript provided", None);
    };

    let request = ChatRequest {
        model: state.config.openai.chat_model.clone(),
        messages: vec![
            ChatMessage::system(COMPILATION_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}{}", TRANSCRIPT_HEADER, transcript)),
        ],
        temperature: 0.7,
        max_tokens: 200,
    };

    match state.openai.complete(&request).await {
        Ok(prompt) => {
            info!("Successfully compiled prompt ({} chars): {}", prompt.len(), prompt);
            (StatusCode::OK, Json(CompilePromptResponse { prompt })).into_response()
        }
        Err(e) => {
            error!("Error compiling prompt: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to compile prompt",
                Some(e.to_string()),
            )
        }
    }
}

/// POST /api/generate-image
/// Render an image prompt
pub async fn generate_image(State(state): State<AppState>, body: Bytes) -> Response {
    if !state.openai.has_api_key() {
        return missing_key();
    }

    let Some(prompt) = string_field(&body, "prompt") else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid prompt provided", None);
    };

    info!("Generating image for prompt: {}", prompt);

    match state.openai.generate_image(&ImageRequest::new(prompt)).await {
        Ok(image) => (
            StatusCode::OK,
            Json(GenerateImageResponse {
                image_url: image.url,
                revised_prompt: image.revised_prompt,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Error generating image: {}", e);
            let classified = ImageGenerationError::from_upstream(&e);
            error_response(
                upstream_status(classified.status_code()),
                &classified.to_string(),
                Some(classified.details()),
            )
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
