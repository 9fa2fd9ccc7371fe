use crate::{EntityCounts, EntityRecognizer, ProviderError};

/// Recognizer used when no NLP backend is configured: every count is zero.
#[derive(Debug, Default)]
pub struct NoopRecognizer;

#[async_trait::async_trait]
impl EntityRecognizer for NoopRecognizer {
    async fn recognize(&self, _text: &str) -> Result<EntityCounts, ProviderError> {
        Ok(EntityCounts::default())
    }
}
