use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub history_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // The credential is the one required setting; everything else has a
        // sensible default. Missing credential is a startup error, never a
        // runtime retry case.
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY is not set; add it to the environment or a .env file")?;
        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into());
        let base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".into());
        let history_path = std::env::var("MEALSNAP_HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_history_path());
        Ok(Self {
            api_key,
            model,
            base_url,
            history_path,
        })
    }
}

fn default_history_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share/mealsnap/history.json"),
        None => PathBuf::from("mealsnap-history.json"),
    }
}
