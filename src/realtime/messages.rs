use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::credentials::{redact, EphemeralCredential};

/// Secret half of a realtime session token
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("value", &redact(&self.value))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body returned by the credential endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub client_secret: ClientSecret,
    pub model: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl SessionToken {
    pub fn into_credential(self) -> Result<EphemeralCredential> {
        let expires_at = Utc
            .timestamp_opt(self.client_secret.expires_at, 0)
            .single()
            .context("Credential expiry is out of range")?;

        Ok(EphemeralCredential::new(
            self.client_secret.value,
            expires_at,
            self.id,
            self.model,
        ))
    }
}
