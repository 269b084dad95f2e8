//! Text completion backends for the assistant and suggestion routes.
//!
//! The provider is chosen per call from the settings document, so a change
//! made through `POST /api/settings` applies without a restart.

use omnibase_store::repo::settings::SettingsRepo;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("no {0} api key configured")]
    MissingKey(&'static str),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("settings unavailable: {0}")]
    Settings(#[from] omnibase_store::StoreError),
}

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    OpenAi,
    Gemini,
}

impl Backend {
    /// Anything other than `"gemini"` means OpenAI.
    fn from_setting(value: &str) -> Self {
        if value.eq_ignore_ascii_case("gemini") {
            Self::Gemini
        } else {
            Self::OpenAi
        }
    }
}

pub struct SettingsCompletionClient {
    settings: SettingsRepo,
    client: reqwest::Client,
}

impl SettingsCompletionClient {
    pub fn new(settings: SettingsRepo) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    async fn post_json(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<Value, AiError> {
        let resp = request
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Provider(format!("{status}: {text}")));
        }

        resp.json()
            .await
            .map_err(|e| AiError::Provider(format!("parse JSON: {e}")))
    }

    async fn openai(&self, key: &str, prompt: &str) -> Result<String, AiError> {
        debug!(model = OPENAI_MODEL, "completion request");
        let body = json!({
            "model": OPENAI_MODEL,
            "messages": [
                { "role": "system", "content": "You are a helpful assistant." },
                { "role": "user", "content": prompt },
            ],
            "temperature": 1,
            "max_tokens": 2048,
            "top_p": 1,
        });
        let request = self.client.post(OPENAI_URL).bearer_auth(key);
        openai_text(&self.post_json(request, &body).await?)
    }

    async fn gemini(&self, key: &str, prompt: &str) -> Result<String, AiError> {
        debug!(model = GEMINI_MODEL, "completion request");
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 1,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
                "responseMimeType": "text/plain",
            },
        });
        let url = format!("{GEMINI_BASE}/{GEMINI_MODEL}:generateContent");
        let request = self.client.post(url).query(&[("key", key)]);
        gemini_text(&self.post_json(request, &body).await?)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for SettingsCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let settings = self.settings.load().await?;
        match Backend::from_setting(&settings.ai_provider) {
            Backend::Gemini if settings.gemini_api_key.is_empty() => {
                Err(AiError::MissingKey("gemini"))
            }
            Backend::Gemini => self.gemini(&settings.gemini_api_key, prompt).await,
            Backend::OpenAi if settings.openai_api_key.is_empty() => {
                Err(AiError::MissingKey("openai"))
            }
            Backend::OpenAi => self.openai(&settings.openai_api_key, prompt).await,
        }
    }
}

fn openai_text(resp: &Value) -> Result<String, AiError> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AiError::Provider("response carries no message content".into()))
}

fn gemini_text(resp: &Value) -> Result<String, AiError> {
    let parts = resp["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| AiError::Provider("response carries no candidates".into()))?;
    Ok(parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .concat())
}
