//! Provider abstractions for named-entity recognition.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod noop;

/// Upper bound on the text handed to a recognizer in one call.
pub const DEFAULT_MAX_CHARS: usize = 1_000_000;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Entity counts per category for one piece of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub total: u32,
    pub person: u32,
    pub organization: u32,
    pub location: u32,
    pub monetary: u32,
    pub date: u32,
}

impl EntityCounts {
    /// Tallies spaCy-style labels. Unknown labels only count toward `total`.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counts = EntityCounts::default();
        for label in labels {
            counts.total += 1;
            match label {
                "PERSON" => counts.person += 1,
                "ORG" => counts.organization += 1,
                "GPE" => counts.location += 1,
                "MONEY" => counts.monetary += 1,
                "DATE" => counts.date += 1,
                _ => {}
            }
        }
        counts
    }
}

#[async_trait::async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<EntityCounts, ProviderError>;
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
pub fn cap_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    recognizers: HashMap<String, Arc<dyn EntityRecognizer>>,
    pub preferred: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recognizer(mut self, name: &str, provider: Arc<dyn EntityRecognizer>) -> Self {
        self.recognizers.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.recognizers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn recognizer(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EntityRecognizer>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no entity recognizer configured".into())
            })?;
        self.recognizers
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_onto_categories() {
        let counts =
            EntityCounts::from_labels(["PERSON", "ORG", "ORG", "GPE", "MONEY", "DATE", "NORP"]);
        assert_eq!(counts.total, 7);
        assert_eq!(counts.person, 1);
        assert_eq!(counts.organization, 2);
        assert_eq!(counts.location, 1);
        assert_eq!(counts.monetary, 1);
        assert_eq!(counts.date, 1);
    }

    #[test]
    fn cap_text_respects_char_boundaries() {
        assert_eq!(cap_text("héllo", 2), "hé");
        assert_eq!(cap_text("abc", 10), "abc");
        assert_eq!(cap_text("", 0), "");
    }

    #[test]
    fn registry_resolves_preferred_recognizer() {
        let reg = ProviderRegistry::new()
            .with_recognizer("noop", Arc::new(noop::NoopRecognizer))
            .set_preferred("noop");
        assert!(reg.recognizer(None).is_ok());
        assert!(matches!(
            reg.recognizer(Some("spacy")),
            Err(ProviderError::UnknownProvider(name)) if name == "spacy"
        ));
        assert!(ProviderRegistry::new().recognizer(None).is_err());
    }
}
