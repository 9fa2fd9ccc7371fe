use crate::{cap_text, EntityCounts, EntityRecognizer, ProviderError};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct HttpRecognizerConfig {
    pub base_url: String,
    pub max_chars: usize,
}

/// Talks to an NER service exposing `POST {base_url}/entities` that answers
/// `{"entities": [{"label": "ORG", "text": "..."}]}`.
#[derive(Clone)]
pub struct HttpRecognizer {
    client: Client,
    cfg: Arc<HttpRecognizerConfig>,
}

impl HttpRecognizer {
    pub fn new(cfg: HttpRecognizerConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Deserialize)]
struct EntitiesApiResponse {
    entities: Vec<EntitySpan>,
}

#[derive(Deserialize)]
struct EntitySpan {
    label: String,
}

#[async_trait::async_trait]
impl EntityRecognizer for HttpRecognizer {
    async fn recognize(&self, text: &str) -> Result<EntityCounts, ProviderError> {
        #[derive(serde::Serialize)]
        struct EntitiesRequest<'a> {
            text: &'a str,
        }

        let body = EntitiesRequest {
            text: cap_text(text, self.cfg.max_chars),
        };

        let url = format!("{}/entities", self.cfg.base_url.trim_end_matches('/'));
        debug!(%url, chars = body.text.len(), "requesting entities");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                debug!(%url, error = %e, "entity request failed");
                ProviderError::RequestFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let parsed: EntitiesApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let counts = EntityCounts::from_labels(parsed.entities.iter().map(|e| e.label.as_str()));
        debug!(total = counts.total, "entities recognized");
        Ok(counts)
    }
}
