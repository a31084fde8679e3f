use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{GenerationError, ImageGenerationError};
use crate::openai::GeneratedImage;
use crate::session::TranscriptLog;

#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    transcript: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompileResponse {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationResponse {
    image_url: String,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

/// Prompt and image produced from one conversation
#[derive(Debug, Clone)]
pub struct Generation {
    pub prompt: String,
    pub image: GeneratedImage,
}

/// Drives prompt compilation and image generation through the proxy server
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    base_url: String,
}

impl GenerationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn compile_prompt(&self, transcript: &str) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(format!("{}/api/compile-prompt", self.base_url))
            .json(&CompileRequest { transcript })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = match response.json::<ErrorResponse>().await {
                Ok(body) => body.details.unwrap_or(body.error),
                Err(_) => status.to_string(),
            };
            return Err(GenerationError::Compile(details));
        }

        let body: CompileResponse = response.json().await?;
        Ok(body.prompt)
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let response = self
            .http
            .post(format!("{}/api/generate-image", self.base_url))
            .json(&ImageGenerationRequest { prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err = match response.json::<ErrorResponse>().await {
                Ok(body) => ImageGenerationError::from_response(&body.error, body.details.as_deref()),
                Err(_) => ImageGenerationError::Failed(status.to_string()),
            };
            return Err(err.into());
        }

        let body: ImageGenerationResponse = response.json().await?;
        Ok(GeneratedImage {
            url: body.image_url,
            revised_prompt: body.revised_prompt,
        })
    }

    /// Compile the conversation into a prompt, then render it.
    pub async fn generate_from_transcript(
        &self,
        transcript: &TranscriptLog,
    ) -> Result<Generation, GenerationError> {
        if transcript.is_empty() {
            return Err(GenerationError::EmptyTranscript);
        }

        info!("Compiling prompt from {} transcript entries", transcript.len());
        let prompt = self.compile_prompt(&transcript.render()).await?;
        info!("Compiled prompt: {}", prompt);

        let image = self.generate_image(&prompt).await?;
        if let Some(revised) = &image.revised_prompt {
            info!("Revised prompt: {}", revised);
        }

        Ok(Generation { prompt, image })
    }

    /// Save an image to `dir` as `picasso-<unix-millis>.png`.
    ///
    /// Accepts hosted URLs and base64 `data:` URLs.
    pub async fn download_image(&self, url: &str, dir: &Path) -> Result<PathBuf, GenerationError> {
        let path = dir.join(format!(
            "picasso-{}.png",
            chrono::Utc::now().timestamp_millis()
        ));

        if let Some(payload) = url.strip_prefix("data:") {
            let (_, data) = payload
                .split_once(";base64,")
                .ok_or_else(|| GenerationError::Download("unsupported data URL".to_string()))?;
            let bytes = STANDARD
                .decode(data)
                .map_err(|e| GenerationError::Download(e.to_string()))?;
            tokio::fs::write(&path, bytes).await?;
            info!("Saved image to {}", path.display());
            return Ok(path);
        }

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::Download(response.status().to_string()));
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        warn!("Failed to remove partial download {}: {}", path.display(), rm);
                    }
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!("Saved image to {}", path.display());
        Ok(path)
    }
}
