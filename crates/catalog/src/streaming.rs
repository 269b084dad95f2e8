//! Streaming-availability catalog client (RapidAPI).
//!
//! Uses `GET /shows/search/title`, which answers with a bare list of shows.

use omnibase_store::repo::settings::SettingsRepo;
use tracing::{debug, warn};

use crate::CatalogError;
use crate::provider::CatalogProvider;

const API_HOST: &str = "streaming-availability.p.rapidapi.com";
const BASE_URL: &str = "https://streaming-availability.p.rapidapi.com";

pub struct StreamingAvailabilityClient {
    settings: SettingsRepo,
    fallback_key: String,
    client: reqwest::Client,
}

impl StreamingAvailabilityClient {
    /// The key stored in settings wins; `fallback_key` is used while none is set.
    pub fn new(settings: SettingsRepo, fallback_key: String) -> Self {
        Self {
            settings,
            fallback_key,
            client: reqwest::Client::new(),
        }
    }

    async fn api_key(&self) -> Result<String, CatalogError> {
        let stored = match self.settings.load().await {
            Ok(settings) => settings.streaming_api_key,
            Err(e) => {
                warn!(error = %e, "could not read settings, using fallback key");
                String::new()
            }
        };
        let key = if stored.is_empty() {
            self.fallback_key.clone()
        } else {
            stored
        };
        if key.is_empty() {
            return Err(CatalogError::Provider(
                "no streaming api key configured".into(),
            ));
        }
        Ok(key)
    }
}

#[async_trait::async_trait]
impl CatalogProvider for StreamingAvailabilityClient {
    fn name(&self) -> &str {
        "streaming-availability"
    }

    async fn search(&self, title: &str, region: &str) -> Result<serde_json::Value, CatalogError> {
        let api_key = self.api_key().await?;
        let url = format!("{BASE_URL}/shows/search/title");
        debug!(url = %url, title, region, "catalog request");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("country", region),
                ("title", title),
                ("series_granularity", "show"),
            ])
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", API_HOST)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }

        if !resp.status().is_success() {
            return Err(CatalogError::Provider(format!(
                "catalog returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| CatalogError::Provider(format!("parse JSON: {e}")))
    }
}
