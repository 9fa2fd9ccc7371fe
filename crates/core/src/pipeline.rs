use crate::classifier::{FeedbackOutcome, RelevanceScorer, TrainOutcome};
use crate::config::AppConfig;
use crate::document::{self, DocumentInput};
use crate::features;
use crate::models::{DocumentResult, ScoredSection};
use crate::persistence::{SqliteStateStore, StateStore};
use crate::repository::ResultRepository;
use crate::scanner;
use crate::segmenter::Segmenter;
use anyhow::Context;
use providers::http::{HttpRecognizer, HttpRecognizerConfig};
use providers::noop::NoopRecognizer;
use providers::{cap_text, EntityCounts, EntityRecognizer, ProviderRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use storage::{connect, migrate};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Turns one document into scored sections. Holds no per-document state, so
/// a shared instance can analyze many documents concurrently.
pub struct Analyzer {
    segmenter: Segmenter,
    recognizer: Option<Arc<dyn EntityRecognizer>>,
    max_entity_chars: usize,
    scorer: Arc<RelevanceScorer>,
}

impl Analyzer {
    pub fn new(segmenter: Segmenter, scorer: Arc<RelevanceScorer>) -> Self {
        Self {
            segmenter,
            recognizer: None,
            max_entity_chars: providers::DEFAULT_MAX_CHARS,
            scorer,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn EntityRecognizer>, max_chars: usize) -> Self {
        self.recognizer = Some(recognizer);
        self.max_entity_chars = max_chars;
        self
    }

    pub fn scorer(&self) -> &Arc<RelevanceScorer> {
        &self.scorer
    }

    pub async fn analyze(&self, input: &DocumentInput, threshold: f64) -> DocumentResult {
        let started = Instant::now();
        let sections = self.segmenter.segment(&input.text, input.pages.as_deref());

        let mut scored = Vec::with_capacity(sections.len());
        let mut degraded = 0usize;
        for section in sections {
            let entities = self.entities(&section.content).await;
            let features = features::extract_with_entities(&section, &entities);
            let outcome = self.scorer.evaluate(&features);
            if outcome.is_degraded() {
                degraded += 1;
            }
            let tags = features::tags(&features);
            scored.push(ScoredSection {
                id: section.id,
                title: section.title,
                content: section.content,
                relevance_score: outcome.value(),
                page_number: section.page_number,
                features,
                tags,
            });
        }

        let mut result = DocumentResult {
            document_id: document::document_id(&input.name),
            document_name: input.name.clone(),
            total_sections: scored.len(),
            relevant_sections: 0,
            threshold,
            processing_time: 0.0,
            sections: scored,
        };
        result.relevant_sections = result.relevant_count(threshold);
        result.processing_time = started.elapsed().as_secs_f64();

        if degraded > 0 {
            warn!(document = %input.name, degraded, "sections scored with heuristic fallback");
        }
        info!(
            document = %input.name,
            sections = result.total_sections,
            relevant = result.relevant_sections,
            "document analyzed"
        );
        result
    }

    async fn entities(&self, content: &str) -> EntityCounts {
        let Some(recognizer) = &self.recognizer else {
            return EntityCounts::default();
        };
        match recognizer
            .recognize(cap_text(content, self.max_entity_chars))
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "entity recognition failed; using zero counts");
                EntityCounts::default()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub documents: Vec<DocumentResult>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub trained: bool,
    pub sample_count: Option<usize>,
    pub trained_at: Option<i64>,
    pub pending_feedback: usize,
    pub retrain_threshold: usize,
    pub entity_provider: String,
    pub documents: usize,
}

/// Database-backed front end over the analyzer, scorer and stored results.
pub struct Pipeline {
    config: AppConfig,
    analyzer: Arc<Analyzer>,
    repository: ResultRepository,
}

impl Pipeline {
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let pool = connect(&config.database.path).await.context("db connect")?;
        migrate(&pool).await.context("db migrate")?;

        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool.clone()));
        let scorer = Arc::new(RelevanceScorer::new(
            config.scoring.heuristic.clone(),
            config.training.clone(),
            store,
        ));
        scorer.load().await;

        let mut analyzer = Analyzer::new(
            Segmenter::new(config.segmenter.min_section_length),
            scorer,
        );
        if let Some(recognizer) = build_recognizer(&config) {
            analyzer = analyzer.with_recognizer(recognizer, config.entities.max_chars);
        }

        Ok(Self {
            repository: ResultRepository::new(pool),
            analyzer: Arc::new(analyzer),
            config,
        })
    }

    pub fn scorer(&self) -> &Arc<RelevanceScorer> {
        self.analyzer.scorer()
    }

    pub fn repository(&self) -> &ResultRepository {
        &self.repository
    }

    pub async fn process_document(
        &self,
        input: &DocumentInput,
        threshold: Option<f64>,
    ) -> anyhow::Result<DocumentResult> {
        let threshold = threshold.unwrap_or(self.config.scoring.threshold);
        let result = self.analyzer.analyze(input, threshold).await;
        self.repository
            .save_document(&result)
            .await
            .with_context(|| format!("saving results for {}", input.name))?;
        Ok(result)
    }

    /// Processes every supported file under `paths` concurrently. A file that
    /// fails is reported in the summary and does not stop the others.
    pub async fn process_paths(
        &self,
        paths: &[PathBuf],
        threshold: Option<f64>,
    ) -> anyhow::Result<BatchSummary> {
        let threshold = threshold.unwrap_or(self.config.scoring.threshold);
        let files = scanner::collect_documents(paths, &self.config.scan.exclude).await?;
        info!(files = files.len(), "processing documents");

        let mut tasks = JoinSet::new();
        for path in files {
            let analyzer = Arc::clone(&self.analyzer);
            tasks.spawn(async move {
                let outcome = match document::load(&path).await {
                    Ok(input) => Ok(analyzer.analyze(&input, threshold).await),
                    Err(e) => Err(e),
                };
                (path, outcome)
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (path, outcome) = joined.context("document task panicked")?;
            let saved = match outcome {
                Ok(result) => self
                    .repository
                    .save_document(&result)
                    .await
                    .map(|()| result),
                Err(e) => Err(e),
            };
            match saved {
                Ok(result) => summary.documents.push(result),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "document failed");
                    summary.failed.push(BatchFailure {
                        path,
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        summary
            .documents
            .sort_by(|a, b| a.document_name.cmp(&b.document_name));
        summary.failed.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(summary)
    }

    /// Stored result for `document_id`, re-filtered when `threshold` is given.
    pub async fn document(
        &self,
        document_id: &str,
        threshold: Option<f64>,
    ) -> anyhow::Result<Option<DocumentResult>> {
        let result = self.repository.load_document(document_id).await?;
        Ok(match threshold {
            Some(t) => result.map(|r| r.filtered(t)),
            None => result,
        })
    }

    /// Labels a stored section and feeds it into the training buffer.
    pub async fn feedback(
        &self,
        document_id: &str,
        section_id: u32,
        is_relevant: bool,
    ) -> anyhow::Result<FeedbackOutcome> {
        let features = self
            .repository
            .section_features(document_id, section_id)
            .await?
            .with_context(|| format!("section {section_id} of document {document_id} not found"))?;
        let outcome = self.scorer().add_feedback(features, is_relevant).await?;
        Ok(outcome)
    }

    /// Retrains on the pending feedback buffer right away.
    pub async fn train(&self) -> anyhow::Result<TrainOutcome> {
        Ok(self.scorer().retrain_from_feedback().await?)
    }

    pub async fn status(&self) -> anyhow::Result<StatusReport> {
        let scorer = self.scorer();
        let state = scorer.state();
        Ok(StatusReport {
            trained: state.is_some(),
            sample_count: state.as_ref().map(|s| s.sample_count),
            trained_at: state.as_ref().map(|s| s.trained_at),
            pending_feedback: scorer.pending_feedback().await?,
            retrain_threshold: self.config.training.retrain_threshold,
            entity_provider: self.config.entities.provider.clone(),
            documents: self.repository.list_documents().await?.len(),
        })
    }
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new().with_recognizer("noop", Arc::new(NoopRecognizer));

    if let Some(url) = &config.entities.url {
        let recognizer = HttpRecognizer::new(HttpRecognizerConfig {
            base_url: url.clone(),
            max_chars: config.entities.max_chars,
        });
        reg = reg.with_recognizer("http", Arc::new(recognizer));
    }

    reg.set_preferred(&config.entities.provider)
}

/// The configured entity recognizer, or `None` when entity features should
/// stay zero.
pub fn build_recognizer(config: &AppConfig) -> Option<Arc<dyn EntityRecognizer>> {
    if config.entities.provider == "none" {
        debug!("entity recognition disabled");
        return None;
    }
    match build_registry(config).recognizer(None) {
        Ok(recognizer) => Some(recognizer),
        Err(e) => {
            warn!(error = %e, "entity recognizer unavailable; entity features will be zero");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntityConfig, HeuristicConfig, TrainingConfig};
    use crate::persistence::MemoryStateStore;
    use providers::ProviderError;

    struct FixedRecognizer(EntityCounts);

    #[async_trait::async_trait]
    impl EntityRecognizer for FixedRecognizer {
        async fn recognize(&self, _text: &str) -> Result<EntityCounts, ProviderError> {
            Ok(self.0)
        }
    }

    struct FailingRecognizer;

    #[async_trait::async_trait]
    impl EntityRecognizer for FailingRecognizer {
        async fn recognize(&self, _text: &str) -> Result<EntityCounts, ProviderError> {
            Err(ProviderError::RequestFailed("offline".into()))
        }
    }

    fn analyzer() -> Analyzer {
        let scorer = RelevanceScorer::new(
            HeuristicConfig::default(),
            TrainingConfig::default(),
            Arc::new(MemoryStateStore::new()),
        );
        Analyzer::new(Segmenter::default(), Arc::new(scorer))
    }

    const SAMPLE: &str = "1. Introduction\nThis is filler.\n\n2. Financial Summary\nRevenue was $1,200,000, up 15% from last year. Contact: cfo@example.com.";

    #[tokio::test]
    async fn analyzes_sample_document() {
        let result = analyzer()
            .analyze(&DocumentInput::from_text("sample.txt", SAMPLE), 0.0)
            .await;
        assert_eq!(result.total_sections, 2);
        assert_eq!(result.relevant_sections, 2);
        let intro = &result.sections[0];
        let summary = &result.sections[1];
        assert_eq!(summary.title, "2. Financial Summary");
        assert!(summary.relevance_score > intro.relevance_score);
        assert!(summary.tags.contains(&crate::features::Tag::Financial));
        assert!(summary.tags.contains(&crate::features::Tag::ContactInfo));
    }

    #[tokio::test]
    async fn recognizer_counts_reach_features() {
        let counts = EntityCounts {
            total: 4,
            person: 1,
            organization: 2,
            location: 1,
            monetary: 0,
            date: 0,
        };
        let analyzer = analyzer().with_recognizer(Arc::new(FixedRecognizer(counts)), 100);
        let result = analyzer
            .analyze(&DocumentInput::from_text("sample.txt", SAMPLE), 0.5)
            .await;
        assert!(result.sections.iter().all(|s| s.features.entity_count == 4));
        assert!(result.sections.iter().all(|s| s.features.org_count == 2));
    }

    #[tokio::test]
    async fn recognizer_failure_yields_zero_entities() {
        let analyzer = analyzer().with_recognizer(Arc::new(FailingRecognizer), 100);
        let result = analyzer
            .analyze(&DocumentInput::from_text("sample.txt", SAMPLE), 0.5)
            .await;
        assert_eq!(result.total_sections, 2);
        assert!(result.sections.iter().all(|s| s.features.entity_count == 0));
    }

    #[test]
    fn recognizer_selection_follows_config() {
        let mut config = AppConfig::default();
        assert!(build_recognizer(&config).is_none());

        config.entities = EntityConfig {
            provider: "noop".into(),
            ..EntityConfig::default()
        };
        assert!(build_recognizer(&config).is_some());

        config.entities.provider = "http".into();
        assert!(build_recognizer(&config).is_none());
        config.entities.url = Some("http://localhost:9000".into());
        assert!(build_recognizer(&config).is_some());
        assert_eq!(build_registry(&config).names(), vec!["http", "noop"]);
    }
}
