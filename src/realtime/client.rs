use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::info;

use super::credentials::{CredentialProvider, EphemeralCredential, SdpNegotiator};
use super::messages::SessionToken;
use crate::transport::SessionDescription;

pub const EPHEMERAL_KEY_HEADER: &str = "x-ephemeral-key";
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Client for the proxy server's realtime endpoints
///
/// - `POST /api/realtime/token` issues the ephemeral credential
/// - `POST /api/realtime` exchanges the SDP offer for an answer
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    http: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl RealtimeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: None,
        }
    }

    /// Ask the proxy to negotiate against a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait::async_trait]
impl CredentialProvider for RealtimeClient {
    async fn fetch_credential(&self) -> Result<EphemeralCredential> {
        let response = self
            .http
            .post(format!("{}/api/realtime/token", self.base_url))
            .send()
            .await
            .context("Failed to reach the credential endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Failed to get session token ({}): {}", status, body);
        }

        let token: SessionToken = response
            .json()
            .await
            .context("Malformed session token response")?;

        let credential = token.into_credential()?;
        info!(
            "Received ephemeral credential {} for session {}",
            credential.redacted(),
            credential.session_id
        );
        Ok(credential)
    }
}

#[async_trait::async_trait]
impl SdpNegotiator for RealtimeClient {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
    ) -> Result<SessionDescription> {
        let mut request = self
            .http
            .post(format!("{}/api/realtime", self.base_url))
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .header(EPHEMERAL_KEY_HEADER, credential.bearer())
            .body(offer.sdp.clone());

        if let Some(model) = &self.model {
            request = request.query(&[("model", model)]);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach the negotiation endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read negotiation response")?;

        if !status.is_success() {
            bail!("Failed to establish WebRTC connection ({}): {}", status, body);
        }

        Ok(SessionDescription::answer(body))
    }
}
