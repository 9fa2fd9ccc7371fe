use crate::features::Feature;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scan: ScanPaths,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub entities: EntityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/docsieve.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanPaths {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub min_section_length: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_section_length: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Default cutoff used to count relevant sections.
    pub threshold: f64,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            heuristic: HeuristicConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: Feature,
    pub weight: f64,
}

/// Tuning constants of the heuristic scorer. The defaults are empirical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub weights: Vec<FeatureWeight>,
    /// Word count treated as a fully "healthy" section length.
    pub optimal_word_count: f64,
    /// Count at which generic count features saturate.
    pub count_saturation: f64,
    pub ratio_scale: f64,
    pub density_band: (f64, f64),
    pub density_center: f64,
    pub density_slope: f64,
    pub short_section_words: f64,
    pub short_section_penalty: f64,
    pub number_indicator_min: f64,
    pub entity_indicator_min: f64,
    pub boost_min_indicators: usize,
    pub boost_factor: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        let weights = [
            (Feature::WordCount, 0.05),
            (Feature::DigitRatio, 0.15),
            (Feature::CurrencyCount, 0.10),
            (Feature::PercentageCount, 0.08),
            (Feature::NumberCount, 0.10),
            (Feature::DateCount, 0.08),
            (Feature::EntityCount, 0.12),
            (Feature::PersonCount, 0.05),
            (Feature::OrgCount, 0.05),
            (Feature::LocationCount, 0.03),
            (Feature::HasTable, 0.15),
            (Feature::BulletListCount, 0.08),
            (Feature::NumberedListCount, 0.08),
            (Feature::TextDensity, 0.05),
        ]
        .into_iter()
        .map(|(feature, weight)| FeatureWeight { feature, weight })
        .collect();

        Self {
            weights,
            optimal_word_count: 200.0,
            count_saturation: 5.0,
            ratio_scale: 5.0,
            density_band: (0.6, 0.9),
            density_center: 0.75,
            density_slope: 2.0,
            short_section_words: 20.0,
            short_section_penalty: 0.3,
            number_indicator_min: 3.0,
            entity_indicator_min: 2.0,
            boost_min_indicators: 3,
            boost_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Buffered feedback count that triggers a retrain.
    pub retrain_threshold: usize,
    /// Fewer samples than this make `train` a no-op.
    pub min_samples: usize,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            retrain_threshold: 10,
            min_samples: 10,
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// `none`, `noop` or `http`.
    pub provider: String,
    pub url: Option<String>,
    pub max_chars: usize,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            url: None,
            max_chars: providers::DEFAULT_MAX_CHARS,
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("DOCSIEVE").separator("__"));
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
