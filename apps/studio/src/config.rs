use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use client_core::FileCredentialStore;
use serde::Deserialize;
use url::Url;

const CONFIG_FILE: &str = "studio.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub api_key: Option<String>,
    pub credential_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            api_key: None,
            credential_path: FileCredentialStore::default_path(),
            request_timeout_secs: 30,
        }
    }
}

/// Keys accepted in `studio.toml`; anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    api_key: Option<String>,
    credential_path: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg: FileSettings = toml::from_str(raw).context("invalid studio.toml")?;
        if let Some(v) = file_cfg.server_url {
            self.server_url = v;
        }
        if let Some(v) = file_cfg.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file_cfg.credential_path {
            self.credential_path = Some(v);
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        Ok(())
    }

    /// Later names win, so `APP__*` overrides the `PROMPT_STUDIO_*` spelling.
    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ["PROMPT_STUDIO_URL", "APP__SERVER_URL"] {
            if let Some(v) = var(key) {
                self.server_url = v;
            }
        }
        for key in ["PROMPT_STUDIO_API_KEY", "APP__API_KEY"] {
            if let Some(v) = var(key) {
                self.api_key = Some(v);
            }
        }
        if let Some(v) = var("APP__CREDENTIAL_PATH") {
            self.credential_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_secs = parsed;
            }
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        settings.apply_file(&raw)?;
    }
    settings.apply_env(|key| std::env::var(key).ok());

    Ok(settings)
}

pub fn validate_server_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid server url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("server url '{raw}' must use http or https");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
