use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::openai::DEFAULT_BASE_URL;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub openai: OpenAiConfig,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub realtime_model: String,
    #[serde(default)]
    pub realtime_prompt_id: Option<String>,
    pub chat_model: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field(
                "api_key",
                &self.api_key.as_deref().map(crate::realtime::credentials::redact),
            )
            .field("base_url", &self.base_url)
            .field("realtime_model", &self.realtime_model)
            .field("realtime_prompt_id", &self.realtime_prompt_id)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub channel_label: String,
    pub fft_size: usize,
    pub refresh_interval_ms: u64,
    pub open_timeout_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Environment names honoured for compatibility, applied after everything else
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "openai.api_key"),
    ("OPENAI_REALTIME_MODEL", "openai.realtime_model"),
    ("OPENAI_REALTIME_PROMPT_ID", "openai.realtime_prompt_id"),
    ("OPENAI_GPT4_MODEL", "openai.chat_model"),
];

impl Config {
    /// Defaults, then the optional file at `path`, then `PICASSO__*` variables,
    /// then the plain `OPENAI_*` variables.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("service.name", "picasso")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 3000)?
            .set_default("openai.base_url", DEFAULT_BASE_URL)?
            .set_default("openai.realtime_model", "gpt-realtime")?
            .set_default("openai.chat_model", "gpt-4")?
            .set_default("session.channel_label", "oai-events")?
            .set_default("session.fft_size", 256)?
            .set_default("session.refresh_interval_ms", 16)?
            .set_default("session.open_timeout_secs", 15)?
            .set_default("session.sample_rate", 48000)?
            .set_default("session.channels", 1)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PICASSO").separator("__"));

        for (var, key) in ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let settings = builder.build().context("Failed to assemble configuration")?;
        Ok(settings.try_deserialize()?)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            channel_label: self.session.channel_label.clone(),
            fft_size: self.session.fft_size,
            refresh_interval: Duration::from_millis(self.session.refresh_interval_ms),
            open_timeout: Duration::from_secs(self.session.open_timeout_secs),
            capture: CaptureConfig {
                sample_rate: self.session.sample_rate,
                channels: self.session.channels,
                ..CaptureConfig::default()
            },
        }
    }
}
