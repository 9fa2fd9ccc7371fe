use crate::config::{HeuristicConfig, TrainingConfig};
use crate::features::{Feature, FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::forest::{ForestParams, ModelError, RandomForest};
use crate::heuristic::HeuristicScorer;
use crate::models::FeedbackSample;
use crate::persistence::{StateStore, StoreError};
use crate::scaler::StandardScaler;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Everything needed to score in learned mode. Replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    pub schema_version: u32,
    pub feature_order: Vec<String>,
    pub scaler: StandardScaler,
    pub model: RandomForest,
    pub sample_count: usize,
    /// Unix seconds.
    pub trained_at: i64,
}

impl ClassifierState {
    pub fn fit(samples: &[FeedbackSample], params: &ForestParams) -> Result<Self, ModelError> {
        let rows: Vec<Vec<f64>> = samples.iter().map(|s| s.features.to_vector()).collect();
        let labels: Vec<bool> = samples.iter().map(|s| s.is_relevant).collect();
        let scaler = StandardScaler::fit(&rows)?;
        let scaled = rows
            .iter()
            .map(|row| scaler.transform(row))
            .collect::<Result<Vec<_>, _>>()?;
        let model = RandomForest::fit(&scaled, &labels, params)?;
        Ok(Self {
            schema_version: FEATURE_SCHEMA_VERSION,
            feature_order: Feature::schema(),
            scaler,
            model,
            sample_count: samples.len(),
            trained_at: chrono::Utc::now().timestamp(),
        })
    }

    /// True when the state was trained against the current feature schema.
    pub fn matches_schema(&self) -> bool {
        self.schema_version == FEATURE_SCHEMA_VERSION && self.feature_order == Feature::schema()
    }

    /// Probability that `features` describes a relevant section.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let row = features.to_vector();
        if self.feature_order.len() != row.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.feature_order.len(),
                found: row.len(),
            });
        }
        let scaled = self.scaler.transform(&row)?;
        self.model.predict_proba(&scaled)
    }
}

/// How a score was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Heuristic(f64),
    Learned(f64),
    /// Learned scoring failed; `score` is the heuristic fallback.
    Degraded { score: f64, reason: String },
}

impl ScoreOutcome {
    pub fn value(&self) -> f64 {
        match self {
            ScoreOutcome::Heuristic(score) | ScoreOutcome::Learned(score) => *score,
            ScoreOutcome::Degraded { score, .. } => *score,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ScoreOutcome::Degraded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainOutcome {
    Skipped { samples: usize },
    Trained { samples: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedbackOutcome {
    /// Samples still buffered after this call.
    pub pending: usize,
    pub training: Option<TrainOutcome>,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("model fit failed: {0}")]
    Model(#[from] ModelError),
    #[error("state store failed: {0}")]
    Store(#[from] StoreError),
    #[error("training task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Scores feature vectors and owns the learned state and feedback loop.
///
/// Scoring clones the current state pointer under a short read lock, so it
/// never waits on a fit in progress. Training runs serialized and swaps the
/// whole state in after it has been persisted.
pub struct RelevanceScorer {
    heuristic: HeuristicScorer,
    training: TrainingConfig,
    state: RwLock<Option<Arc<ClassifierState>>>,
    store: Arc<dyn StateStore>,
    train_lock: tokio::sync::Mutex<()>,
}

impl RelevanceScorer {
    pub fn new(
        heuristic: HeuristicConfig,
        training: TrainingConfig,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            heuristic: HeuristicScorer::new(heuristic),
            training,
            state: RwLock::new(None),
            store,
            train_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Installs the persisted state if there is a usable one. Returns whether
    /// the scorer is now in learned mode.
    pub async fn load(&self) -> bool {
        match self.store.load_state().await {
            Ok(Some(state)) if state.matches_schema() => {
                info!(
                    samples = state.sample_count,
                    trained_at = state.trained_at,
                    "loaded classifier state"
                );
                self.install(state);
                true
            }
            Ok(Some(state)) => {
                warn!(
                    stored = state.schema_version,
                    current = FEATURE_SCHEMA_VERSION,
                    "persisted classifier uses another feature schema; using heuristic scoring"
                );
                false
            }
            Ok(None) => {
                debug!("no persisted classifier state");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to load classifier state; using heuristic scoring");
                false
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    pub fn state(&self) -> Option<Arc<ClassifierState>> {
        self.state.read().clone()
    }

    pub fn heuristic(&self) -> &HeuristicScorer {
        &self.heuristic
    }

    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.evaluate(features).value()
    }

    pub fn evaluate(&self, features: &FeatureVector) -> ScoreOutcome {
        let Some(state) = self.state() else {
            return ScoreOutcome::Heuristic(self.heuristic.score(features));
        };
        match state.predict(features) {
            Ok(proba) => ScoreOutcome::Learned(proba),
            Err(e) => {
                warn!(error = %e, "learned scoring failed; falling back to heuristic");
                ScoreOutcome::Degraded {
                    score: self.heuristic.score(features),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fits a new state from `samples` and persists it. The feedback buffer
    /// is left alone.
    pub async fn train(&self, samples: Vec<FeedbackSample>) -> Result<TrainOutcome, TrainError> {
        let _guard = self.train_lock.lock().await;
        let count = samples.len();
        let Some(state) = self.fit(samples).await? else {
            return Ok(TrainOutcome::Skipped { samples: count });
        };
        self.store.save_state(&state).await?;
        self.install(state);
        info!(samples = count, "classifier trained");
        Ok(TrainOutcome::Trained { samples: count })
    }

    /// Trains on the whole pending buffer and clears it in the same commit.
    /// On failure the buffer and the installed state are unchanged.
    pub async fn retrain_from_feedback(&self) -> Result<TrainOutcome, TrainError> {
        let _guard = self.train_lock.lock().await;
        let samples = self.store.pending_feedback().await?;
        let consumed = samples.len();
        let Some(state) = self.fit(samples).await? else {
            return Ok(TrainOutcome::Skipped { samples: consumed });
        };
        self.store.commit_training(&state, consumed).await?;
        self.install(state);
        info!(samples = consumed, "classifier retrained from feedback");
        Ok(TrainOutcome::Trained { samples: consumed })
    }

    /// Buffers one labelled sample; retrains once the buffer reaches the
    /// configured threshold.
    pub async fn add_feedback(
        &self,
        features: FeatureVector,
        is_relevant: bool,
    ) -> Result<FeedbackOutcome, TrainError> {
        let sample = FeedbackSample {
            features,
            is_relevant,
        };
        let pending = self.store.append_feedback(&sample).await?;
        info!(pending, is_relevant, "feedback recorded");
        if pending < self.training.retrain_threshold {
            return Ok(FeedbackOutcome {
                pending,
                training: None,
            });
        }

        let training = self.retrain_from_feedback().await?;
        let pending = self.store.pending_count().await?;
        Ok(FeedbackOutcome {
            pending,
            training: Some(training),
        })
    }

    pub async fn pending_feedback(&self) -> Result<usize, StoreError> {
        self.store.pending_count().await
    }

    async fn fit(
        &self,
        samples: Vec<FeedbackSample>,
    ) -> Result<Option<ClassifierState>, TrainError> {
        if samples.len() < self.training.min_samples {
            warn!(
                samples = samples.len(),
                required = self.training.min_samples,
                "not enough samples to train; skipping"
            );
            return Ok(None);
        }
        let params = ForestParams::from(&self.training);
        let state =
            tokio::task::spawn_blocking(move || ClassifierState::fit(&samples, &params)).await??;
        Ok(Some(state))
    }

    fn install(&self, state: ClassifierState) {
        *self.state.write() = Some(Arc::new(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStateStore;

    fn relevant(i: u32) -> FeatureVector {
        FeatureVector {
            word_count: 150 + i,
            has_table: true,
            entity_count: 5,
            number_count: 8,
            text_density: 0.8,
            ..Default::default()
        }
    }

    fn irrelevant(i: u32) -> FeatureVector {
        FeatureVector {
            word_count: 30 + i,
            text_density: 0.4,
            ..Default::default()
        }
    }

    fn samples(n: u32) -> Vec<FeedbackSample> {
        (0..n)
            .map(|i| FeedbackSample {
                features: if i % 2 == 0 { relevant(i) } else { irrelevant(i) },
                is_relevant: i % 2 == 0,
            })
            .collect()
    }

    fn training() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 20,
            ..TrainingConfig::default()
        }
    }

    fn scorer(store: Arc<MemoryStateStore>) -> RelevanceScorer {
        RelevanceScorer::new(HeuristicConfig::default(), training(), store)
    }

    #[tokio::test]
    async fn untrained_scorer_uses_heuristic() {
        let scorer = scorer(Arc::new(MemoryStateStore::new()));
        assert!(!scorer.load().await);
        let features = relevant(0);
        assert_eq!(
            scorer.evaluate(&features),
            ScoreOutcome::Heuristic(scorer.heuristic().score(&features))
        );
    }

    #[tokio::test]
    async fn too_few_samples_is_a_no_op() {
        let scorer = scorer(Arc::new(MemoryStateStore::new()));
        let outcome = scorer.train(samples(9)).await.unwrap();
        assert_eq!(outcome, TrainOutcome::Skipped { samples: 9 });
        assert!(!scorer.is_trained());
    }

    #[tokio::test]
    async fn training_orders_separable_classes() {
        let store = Arc::new(MemoryStateStore::new());
        let scorer = scorer(store.clone());
        let outcome = scorer.train(samples(12)).await.unwrap();
        assert_eq!(outcome, TrainOutcome::Trained { samples: 12 });
        assert!(scorer.is_trained());

        let high = scorer.evaluate(&relevant(40));
        let low = scorer.evaluate(&irrelevant(41));
        assert!(matches!(high, ScoreOutcome::Learned(_)));
        assert!(high.value() > low.value());
        assert!((0.0..=1.0).contains(&high.value()));

        // A fresh scorer over the same store picks the state back up.
        let reloaded = RelevanceScorer::new(HeuristicConfig::default(), training(), store);
        assert!(reloaded.load().await);
        assert_eq!(reloaded.score(&relevant(40)), high.value());
    }

    #[tokio::test]
    async fn failed_persist_keeps_previous_state() {
        let store = Arc::new(MemoryStateStore::new());
        let scorer = scorer(store.clone());
        store.set_fail_writes(true);
        let err = scorer.train(samples(12)).await.unwrap_err();
        assert!(matches!(err, TrainError::Store(StoreError::Unavailable(_))));
        assert!(!scorer.is_trained());
    }

    #[tokio::test]
    async fn single_class_training_fails() {
        let scorer = scorer(Arc::new(MemoryStateStore::new()));
        let all_relevant: Vec<FeedbackSample> = (0..10)
            .map(|i| FeedbackSample {
                features: relevant(i),
                is_relevant: true,
            })
            .collect();
        let err = scorer.train(all_relevant).await.unwrap_err();
        assert!(matches!(err, TrainError::Model(ModelError::SingleClass)));
        assert!(!scorer.is_trained());
    }

    #[tokio::test]
    async fn tenth_feedback_triggers_training() {
        let store = Arc::new(MemoryStateStore::new());
        let scorer = scorer(store.clone());
        let batch = samples(10);
        for (i, sample) in batch.iter().take(9).enumerate() {
            let outcome = scorer
                .add_feedback(sample.features.clone(), sample.is_relevant)
                .await
                .unwrap();
            assert_eq!(outcome.pending, i + 1);
            assert_eq!(outcome.training, None);
            assert!(!scorer.is_trained());
        }

        let last = &batch[9];
        let outcome = scorer
            .add_feedback(last.features.clone(), last.is_relevant)
            .await
            .unwrap();
        assert_eq!(outcome.training, Some(TrainOutcome::Trained { samples: 10 }));
        assert_eq!(outcome.pending, 0);
        assert!(scorer.is_trained());
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_retrain_retains_buffer() {
        let store = Arc::new(MemoryStateStore::new());
        let scorer = scorer(store.clone());
        let batch = samples(10);
        for sample in batch.iter().take(9) {
            scorer
                .add_feedback(sample.features.clone(), sample.is_relevant)
                .await
                .unwrap();
        }
        // Appends still land; only the training commit fails.
        store.append_feedback(&batch[9]).await.unwrap();
        store.set_fail_writes(true);
        let err = scorer.retrain_from_feedback().await.unwrap_err();
        assert!(matches!(err, TrainError::Store(_)));
        assert!(!scorer.is_trained());
        assert_eq!(store.pending_count().await.unwrap(), 10);

        store.set_fail_writes(false);
        let outcome = scorer.retrain_from_feedback().await.unwrap();
        assert_eq!(outcome, TrainOutcome::Trained { samples: 10 });
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broken_state_degrades_to_heuristic() {
        let scorer = scorer(Arc::new(MemoryStateStore::new()));
        let mut state = ClassifierState::fit(&samples(12), &ForestParams::from(&training())).unwrap();
        state.scaler.mean.pop();
        scorer.install(state);

        let features = relevant(3);
        let outcome = scorer.evaluate(&features);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), scorer.heuristic().score(&features));
    }

    #[tokio::test]
    async fn stale_schema_is_not_loaded() {
        let store = Arc::new(MemoryStateStore::new());
        let mut state = ClassifierState::fit(&samples(12), &ForestParams::from(&training())).unwrap();
        state.schema_version = FEATURE_SCHEMA_VERSION + 1;
        store.save_state(&state).await.unwrap();

        let scorer = scorer(store);
        assert!(!scorer.load().await);
        assert!(!scorer.is_trained());
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = ClassifierState::fit(&samples(12), &ForestParams::from(&training())).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: ClassifierState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        assert!(back.matches_schema());
        let probe = relevant(7);
        assert_eq!(state.predict(&probe).unwrap(), back.predict(&probe).unwrap());
    }
}
