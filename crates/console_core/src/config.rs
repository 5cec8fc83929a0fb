use std::fs;

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Externally supplied engine endpoints. The request/response base and the
/// push-stream base are the console's entire environment surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub stream_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".into(),
            stream_base_url: "ws://127.0.0.1:8000".into(),
        }
    }
}

impl Settings {
    /// Builds settings for an API base, deriving the stream base from it.
    pub fn for_api_base(api_base_url: impl Into<String>) -> Result<Self> {
        let api_base_url = api_base_url.into();
        let stream_base_url = derive_stream_url(&api_base_url)?;
        Ok(Self {
            api_base_url,
            stream_base_url,
        })
    }

    /// Address of the continuously-updating camera feed. Consumed as an
    /// opaque image resource, never decoded by the console.
    pub fn video_feed_url(&self) -> String {
        format!("{}/video_feed", self.api_base_url.trim_end_matches('/'))
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        match toml::from_str::<Settings>(&raw) {
            Ok(file_settings) => settings = file_settings,
            Err(err) => tracing::warn!(%err, "ignoring unreadable console.toml"),
        }
    }

    if let Ok(v) = std::env::var("ENGINE_API_URL") {
        settings.api_base_url = v;
    }
    if let Ok(v) = std::env::var("APP__ENGINE_API_URL") {
        settings.api_base_url = v;
    }

    if let Ok(v) = std::env::var("ENGINE_STREAM_URL") {
        settings.stream_base_url = v;
    }
    if let Ok(v) = std::env::var("APP__ENGINE_STREAM_URL") {
        settings.stream_base_url = v;
    }

    settings
}

/// Maps an http(s) API base onto the matching ws(s) stream base.
pub fn derive_stream_url(api_base_url: &str) -> Result<String> {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(anyhow!(
            "engine api url must start with http:// or https://: {api_base_url}"
        ))
    }
}
