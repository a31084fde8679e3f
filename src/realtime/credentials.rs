use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::transport::SessionDescription;

/// Short-lived bearer value scoped to one session negotiation.
///
/// Formatting never reveals more than a short prefix of the secret.
#[derive(Clone)]
pub struct EphemeralCredential {
    value: String,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
    pub model: String,
}

impl EphemeralCredential {
    pub fn new(
        value: impl Into<String>,
        expires_at: DateTime<Utc>,
        session_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            expires_at,
            session_id: session_id.into(),
            model: model.into(),
        }
    }

    /// The secret itself, for the negotiation request only
    pub fn bearer(&self) -> &str {
        &self.value
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn redacted(&self) -> String {
        redact(&self.value)
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("value", &self.redacted())
            .field("expires_at", &self.expires_at)
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .finish()
    }
}

/// Keep at most the first 6 characters of a secret.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{}...", prefix)
}

/// Issues an ephemeral credential for a new session
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_credential(&self) -> Result<EphemeralCredential>;
}

/// Trades a local offer for the remote answer
#[async_trait::async_trait]
pub trait SdpNegotiator: Send + Sync {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
    ) -> Result<SessionDescription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let credential = EphemeralCredential::new(
            "ek_supersecretvalue",
            Utc::now() + chrono::Duration::seconds(60),
            "sess_1",
            "gpt-realtime",
        );
        let printed = format!("{:?}", credential);
        assert!(printed.contains("ek_sup..."));
        assert!(!printed.contains("supersecretvalue"));
        assert!(!credential.is_expired());
    }
}
