use crate::config::HeuristicConfig;
use crate::features::{Feature, FeatureVector};

/// Deterministic weighted-sum scorer used until a model has been trained.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// The short-section penalty is applied after the clamp, so a short
    /// section never scores above `short_section_penalty` times its
    /// unpenalized score.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        let unpenalized = self.unpenalized(features);
        if f64::from(features.word_count) < self.config.short_section_words {
            unpenalized * self.config.short_section_penalty
        } else {
            unpenalized
        }
    }

    /// Weighted sum with the indicator boost, clamped, before the
    /// short-section penalty.
    pub fn unpenalized(&self, features: &FeatureVector) -> f64 {
        let mut score: f64 = self
            .config
            .weights
            .iter()
            .map(|w| self.normalize(w.feature, features.get(w.feature)) * w.weight)
            .sum();
        if self.indicator_count(features) >= self.config.boost_min_indicators {
            score *= self.config.boost_factor;
        }
        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 1.0)
    }

    /// Maps a raw feature value onto [0, 1].
    pub fn normalize(&self, feature: Feature, value: f64) -> f64 {
        let cfg = &self.config;
        let normalized = match feature {
            Feature::WordCount => value / cfg.optimal_word_count,
            Feature::HasTable => {
                if value > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Feature::TextDensity => {
                let (low, high) = cfg.density_band;
                if (low..=high).contains(&value) {
                    1.0
                } else {
                    1.0 - (value - cfg.density_center).abs() * cfg.density_slope
                }
            }
            Feature::DigitRatio => value * cfg.ratio_scale,
            _ => value / cfg.count_saturation,
        };
        normalized.clamp(0.0, 1.0)
    }

    /// How many of the structural indicators hold for `features`.
    pub fn indicator_count(&self, features: &FeatureVector) -> usize {
        [
            features.has_table,
            f64::from(features.number_count) > self.config.number_indicator_min,
            f64::from(features.entity_count) > self.config.entity_indicator_min,
            features.bullet_list_count > 0,
            features.date_count > 0,
        ]
        .into_iter()
        .filter(|hit| *hit)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> HeuristicScorer {
        HeuristicScorer::default()
    }

    fn rich_features() -> FeatureVector {
        FeatureVector {
            word_count: 150,
            digit_ratio: 0.15,
            currency_count: 3,
            percentage_count: 2,
            number_count: 10,
            date_count: 2,
            entity_count: 5,
            person_count: 2,
            org_count: 1,
            location_count: 1,
            has_table: true,
            bullet_list_count: 3,
            numbered_list_count: 0,
            text_density: 0.75,
            ..Default::default()
        }
    }

    #[test]
    fn data_dense_section_scores_high() {
        let score = scorer().score(&rich_features());
        assert!(score > 0.5, "score was {score}");
        assert!(score <= 1.0);
    }

    #[test]
    fn minimal_section_scores_low() {
        let features = FeatureVector {
            word_count: 10,
            text_density: 0.5,
            ..Default::default()
        };
        assert!(scorer().score(&features) < 0.5);
    }

    #[test]
    fn normalization_curves() {
        let s = scorer();
        assert_eq!(s.normalize(Feature::WordCount, 100.0), 0.5);
        assert_eq!(s.normalize(Feature::WordCount, 1000.0), 1.0);
        assert_eq!(s.normalize(Feature::HasTable, 1.0), 1.0);
        assert_eq!(s.normalize(Feature::HasTable, 0.0), 0.0);
        assert_eq!(s.normalize(Feature::TextDensity, 0.6), 1.0);
        assert_eq!(s.normalize(Feature::TextDensity, 0.9), 1.0);
        assert!((s.normalize(Feature::TextDensity, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(s.normalize(Feature::TextDensity, 0.0), 0.0);
        assert!((s.normalize(Feature::DigitRatio, 0.1) - 0.5).abs() < 1e-12);
        assert_eq!(s.normalize(Feature::DigitRatio, 0.5), 1.0);
        assert_eq!(s.normalize(Feature::CurrencyCount, 2.0), 0.4);
        assert_eq!(s.normalize(Feature::EntityCount, 50.0), 1.0);
    }

    #[test]
    fn indicators_use_strict_thresholds() {
        let s = scorer();
        let at_limit = FeatureVector {
            number_count: 3,
            entity_count: 2,
            ..Default::default()
        };
        assert_eq!(s.indicator_count(&at_limit), 0);
        let over = FeatureVector {
            number_count: 4,
            entity_count: 3,
            ..Default::default()
        };
        assert_eq!(s.indicator_count(&over), 2);
    }

    #[test]
    fn score_is_monotonic_in_indicator_count() {
        let s = scorer();
        let steps = [
            FeatureVector::default(),
            FeatureVector {
                has_table: true,
                ..Default::default()
            },
            FeatureVector {
                has_table: true,
                number_count: 4,
                ..Default::default()
            },
            FeatureVector {
                has_table: true,
                number_count: 4,
                entity_count: 3,
                ..Default::default()
            },
            FeatureVector {
                has_table: true,
                number_count: 4,
                entity_count: 3,
                bullet_list_count: 1,
                ..Default::default()
            },
            FeatureVector {
                has_table: true,
                number_count: 4,
                entity_count: 3,
                bullet_list_count: 1,
                date_count: 1,
                ..Default::default()
            },
        ];
        for word_count in [0, 200] {
            let mut previous = 0.0;
            for (expected, base) in steps.iter().enumerate() {
                let features = FeatureVector {
                    word_count,
                    ..base.clone()
                };
                assert_eq!(s.indicator_count(&features), expected);
                let score = s.score(&features);
                assert!(score >= previous, "{score} < {previous} at {expected}");
                previous = score;
            }
        }
    }

    #[test]
    fn short_sections_are_penalized() {
        let s = scorer();
        let short = FeatureVector {
            word_count: 19,
            ..rich_features()
        };
        let penalized = s.score(&short);
        assert!(penalized <= 0.3 * s.unpenalized(&short) + 1e-12);

        let long = FeatureVector {
            word_count: 20,
            ..rich_features()
        };
        assert_eq!(s.score(&long), s.unpenalized(&long));
    }

    #[test]
    fn saturated_short_section_scores_penalty_factor() {
        let s = scorer();
        let saturated = FeatureVector {
            word_count: 19,
            digit_ratio: 0.5,
            currency_count: 9,
            percentage_count: 9,
            number_count: 9,
            date_count: 9,
            entity_count: 9,
            person_count: 9,
            org_count: 9,
            location_count: 9,
            has_table: true,
            bullet_list_count: 9,
            numbered_list_count: 9,
            text_density: 0.75,
            ..Default::default()
        };
        assert_eq!(s.unpenalized(&saturated), 1.0);
        assert!((s.score(&saturated) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let s = scorer();
        let saturated = FeatureVector {
            word_count: u32::MAX,
            digit_ratio: 10.0,
            currency_count: 1000,
            percentage_count: 1000,
            number_count: 1000,
            date_count: 1000,
            entity_count: 1000,
            person_count: 1000,
            org_count: 1000,
            location_count: 1000,
            has_table: true,
            bullet_list_count: 1000,
            numbered_list_count: 1000,
            text_density: 0.8,
            ..Default::default()
        };
        assert_eq!(s.score(&saturated), 1.0);
        assert_eq!(s.score(&FeatureVector::default()), 0.0);
        let odd = FeatureVector {
            digit_ratio: f64::NAN,
            text_density: -3.0,
            ..Default::default()
        };
        let score = s.score(&odd);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn custom_constants_are_honored() {
        let cfg = HeuristicConfig {
            short_section_penalty: 0.0,
            ..HeuristicConfig::default()
        };
        let s = HeuristicScorer::new(cfg);
        let short = FeatureVector {
            word_count: 5,
            ..rich_features()
        };
        assert_eq!(s.score(&short), 0.0);
    }
}
