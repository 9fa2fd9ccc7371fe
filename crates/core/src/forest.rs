//! Binary random forest over dense `f64` rows.
//!
//! Trees are grown on bootstrap samples with balanced class weights, gini
//! impurity and a random subset of `sqrt(n_features)` candidate features per
//! split. Leaves store the weighted fraction of positive samples, and the
//! forest probability is the mean over trees.

use crate::config::TrainingConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no training samples")]
    EmptyTrainingSet,
    #[error("expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("training labels contain a single class")]
    SingleClass,
    #[error("non-finite value in input")]
    NonFinite,
    #[error("corrupt model: {0}")]
    Corrupt(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        (&TrainingConfig::default()).into()
    }
}

impl From<&TrainingConfig> for ForestParams {
    fn from(cfg: &TrainingConfig) -> Self {
        Self {
            n_estimators: cfg.n_estimators,
            max_depth: cfg.max_depth,
            min_samples_split: cfg.min_samples_split,
            seed: cfg.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        proba: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(Node::Leaf { proba }) => return Ok(*proba),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row
                        .get(*feature)
                        .ok_or(ModelError::Corrupt("split feature out of range"))?;
                    idx = if value <= threshold { *left } else { *right };
                }
                None => return Err(ModelError::Corrupt("node index out of range")),
            }
        }
        Err(ModelError::Corrupt("cycle in tree"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: &ForestParams) -> Result<Self, ModelError> {
        let n = rows.len();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if labels.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                found: labels.len(),
            });
        }
        let n_features = rows[0].len();
        for row in rows {
            if row.len() != n_features {
                return Err(ModelError::DimensionMismatch {
                    expected: n_features,
                    found: row.len(),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite);
            }
        }

        let positives = labels.iter().filter(|l| **l).count();
        if positives == 0 || positives == n {
            return Err(ModelError::SingleClass);
        }
        // Balanced weights: n / (2 * class_count).
        let class_weight = [
            n as f64 / (2.0 * (n - positives) as f64),
            n as f64 / (2.0 * positives as f64),
        ];

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators.max(1) {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                rows,
                labels,
                class_weight,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split.max(2),
                max_features: ((n_features as f64).sqrt() as usize).max(1),
                rng: &mut rng,
                nodes: Vec::new(),
            };
            builder.grow(sample, 0);
            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        Ok(Self { n_features, trees })
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                found: row.len(),
            });
        }
        if self.trees.is_empty() {
            return Err(ModelError::Corrupt("forest has no trees"));
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict(row)?;
        }
        let proba = total / self.trees.len() as f64;
        if proba.is_finite() {
            Ok(proba.clamp(0.0, 1.0))
        } else {
            Err(ModelError::NonFinite)
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [bool],
    class_weight: [f64; 2],
    max_depth: usize,
    min_samples_split: usize,
    max_features: usize,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let weights = self.class_totals(&samples);
        let total = weights[0] + weights[1];
        let proba = if total > 0.0 { weights[1] / total } else { 0.5 };

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { proba });

        let pure = weights[0] == 0.0 || weights[1] == 0.0;
        if depth >= self.max_depth || samples.len() < self.min_samples_split || pure {
            return idx;
        }
        let Some((feature, threshold)) = self.best_split(&samples, weights) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.rows[i][feature] <= threshold);
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        idx
    }

    fn class_totals(&self, samples: &[usize]) -> [f64; 2] {
        let mut totals = [0.0; 2];
        for &i in samples {
            let class = usize::from(self.labels[i]);
            totals[class] += self.class_weight[class];
        }
        totals
    }

    /// Best (feature, threshold) by weighted gini. Keeps drawing features past
    /// `max_features` until at least one valid split is found.
    fn best_split(&mut self, samples: &[usize], parent: [f64; 2]) -> Option<(usize, f64)> {
        let parent_impurity = gini(parent);
        let n_features = self.rows[samples[0]].len();
        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(&mut *self.rng);

        let mut best: Option<(usize, f64, f64)> = None;
        for (visited, &feature) in candidates.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            let mut column: Vec<(f64, bool)> = samples
                .iter()
                .map(|&i| (self.rows[i][feature], self.labels[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = [0.0; 2];
            for k in 1..column.len() {
                let (value, label) = column[k - 1];
                let class = usize::from(label);
                left[class] += self.class_weight[class];
                let next = column[k].0;
                if next <= value {
                    continue;
                }
                let right = [parent[0] - left[0], parent[1] - left[1]];
                let wl = left[0] + left[1];
                let wr = right[0] + right[1];
                let impurity = (wl * gini(left) + wr * gini(right)) / (wl + wr);
                if parent_impurity - impurity <= MIN_IMPURITY_DECREASE {
                    continue;
                }
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some((feature, threshold, impurity));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn gini(weights: [f64; 2]) -> f64 {
    let total = weights[0] + weights[1];
    if total <= 0.0 {
        return 0.0;
    }
    let p = weights[1] / total;
    2.0 * p * (1.0 - p)
}
