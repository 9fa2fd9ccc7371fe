//! Per-section numeric features and the descriptive tags derived from them.

use crate::models::Section;
use providers::EntityCounts;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Bumped whenever the feature set or its order changes. Persisted models
/// trained against another version are not loaded.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());
static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());
static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$£€¥₹]\s*\d+|\d+\.\d{2}").unwrap());
static PERCENTAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.?\d*\s*%").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.?\d*").unwrap());
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}",
        r"|\d{4}[-/]\d{1,2}[-/]\d{1,2}",
        r"|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2},?\s+\d{4}",
    ))
    .unwrap()
});
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[•\-*◦▪]\s+").unwrap());
static NUMBERED_LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+").unwrap());

const TABLE_GLYPHS: [char; 5] = ['|', '┃', '─', '═', '│'];

/// Names of the feature schema, in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    WordCount,
    SentenceCount,
    CharCount,
    LineCount,
    DigitCount,
    DigitRatio,
    CurrencyCount,
    PercentageCount,
    NumberCount,
    DateCount,
    EmailCount,
    UrlCount,
    PhoneCount,
    HasTable,
    BulletListCount,
    NumberedListCount,
    TextDensity,
    EntityCount,
    PersonCount,
    OrgCount,
    LocationCount,
    MoneyCount,
    DateEntityCount,
    AvgWordLength,
    AvgSentenceLength,
}

impl Feature {
    pub const ALL: [Feature; 25] = [
        Feature::WordCount,
        Feature::SentenceCount,
        Feature::CharCount,
        Feature::LineCount,
        Feature::DigitCount,
        Feature::DigitRatio,
        Feature::CurrencyCount,
        Feature::PercentageCount,
        Feature::NumberCount,
        Feature::DateCount,
        Feature::EmailCount,
        Feature::UrlCount,
        Feature::PhoneCount,
        Feature::HasTable,
        Feature::BulletListCount,
        Feature::NumberedListCount,
        Feature::TextDensity,
        Feature::EntityCount,
        Feature::PersonCount,
        Feature::OrgCount,
        Feature::LocationCount,
        Feature::MoneyCount,
        Feature::DateEntityCount,
        Feature::AvgWordLength,
        Feature::AvgSentenceLength,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::WordCount => "word_count",
            Feature::SentenceCount => "sentence_count",
            Feature::CharCount => "char_count",
            Feature::LineCount => "line_count",
            Feature::DigitCount => "digit_count",
            Feature::DigitRatio => "digit_ratio",
            Feature::CurrencyCount => "currency_count",
            Feature::PercentageCount => "percentage_count",
            Feature::NumberCount => "number_count",
            Feature::DateCount => "date_count",
            Feature::EmailCount => "email_count",
            Feature::UrlCount => "url_count",
            Feature::PhoneCount => "phone_count",
            Feature::HasTable => "has_table",
            Feature::BulletListCount => "bullet_list_count",
            Feature::NumberedListCount => "numbered_list_count",
            Feature::TextDensity => "text_density",
            Feature::EntityCount => "entity_count",
            Feature::PersonCount => "person_count",
            Feature::OrgCount => "org_count",
            Feature::LocationCount => "location_count",
            Feature::MoneyCount => "money_count",
            Feature::DateEntityCount => "date_entity_count",
            Feature::AvgWordLength => "avg_word_length",
            Feature::AvgSentenceLength => "avg_sentence_length",
        }
    }

    pub fn schema() -> Vec<String> {
        Feature::ALL.iter().map(|f| f.name().to_string()).collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-schema feature record. Missing keys deserialize as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    pub word_count: u32,
    pub sentence_count: u32,
    pub char_count: u32,
    pub line_count: u32,
    pub digit_count: u32,
    pub digit_ratio: f64,
    pub currency_count: u32,
    pub percentage_count: u32,
    pub number_count: u32,
    pub date_count: u32,
    pub email_count: u32,
    pub url_count: u32,
    pub phone_count: u32,
    pub has_table: bool,
    pub bullet_list_count: u32,
    pub numbered_list_count: u32,
    pub text_density: f64,
    pub entity_count: u32,
    pub person_count: u32,
    pub org_count: u32,
    pub location_count: u32,
    pub money_count: u32,
    pub date_entity_count: u32,
    pub avg_word_length: f64,
    pub avg_sentence_length: f64,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::WordCount => self.word_count.into(),
            Feature::SentenceCount => self.sentence_count.into(),
            Feature::CharCount => self.char_count.into(),
            Feature::LineCount => self.line_count.into(),
            Feature::DigitCount => self.digit_count.into(),
            Feature::DigitRatio => self.digit_ratio,
            Feature::CurrencyCount => self.currency_count.into(),
            Feature::PercentageCount => self.percentage_count.into(),
            Feature::NumberCount => self.number_count.into(),
            Feature::DateCount => self.date_count.into(),
            Feature::EmailCount => self.email_count.into(),
            Feature::UrlCount => self.url_count.into(),
            Feature::PhoneCount => self.phone_count.into(),
            Feature::HasTable => {
                if self.has_table {
                    1.0
                } else {
                    0.0
                }
            }
            Feature::BulletListCount => self.bullet_list_count.into(),
            Feature::NumberedListCount => self.numbered_list_count.into(),
            Feature::TextDensity => self.text_density,
            Feature::EntityCount => self.entity_count.into(),
            Feature::PersonCount => self.person_count.into(),
            Feature::OrgCount => self.org_count.into(),
            Feature::LocationCount => self.location_count.into(),
            Feature::MoneyCount => self.money_count.into(),
            Feature::DateEntityCount => self.date_entity_count.into(),
            Feature::AvgWordLength => self.avg_word_length,
            Feature::AvgSentenceLength => self.avg_sentence_length,
        }
    }

    /// Values in schema order, booleans as 0/1.
    pub fn to_vector(&self) -> Vec<f64> {
        Feature::ALL.iter().map(|f| self.get(*f)).collect()
    }
}

/// Human-readable labels derived from a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Numbers,
    Table,
    Dates,
    Financial,
    List,
    Entities,
    ContactInfo,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Numbers => "numbers",
            Tag::Table => "table",
            Tag::Dates => "dates",
            Tag::Financial => "financial",
            Tag::List => "list",
            Tag::Entities => "entities",
            Tag::ContactInfo => "contact_info",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn tags(features: &FeatureVector) -> Vec<Tag> {
    let rules = [
        (features.number_count > 5, Tag::Numbers),
        (features.has_table, Tag::Table),
        (
            features.date_count > 0 || features.date_entity_count > 0,
            Tag::Dates,
        ),
        (
            features.currency_count > 0 || features.money_count > 0,
            Tag::Financial,
        ),
        (
            features.bullet_list_count > 0 || features.numbered_list_count > 0,
            Tag::List,
        ),
        (
            features.person_count > 0 || features.org_count > 0,
            Tag::Entities,
        ),
        (
            features.email_count > 0 || features.phone_count > 0,
            Tag::ContactInfo,
        ),
    ];
    rules
        .into_iter()
        .filter_map(|(hit, tag)| hit.then_some(tag))
        .collect()
}

pub fn extract(section: &Section) -> FeatureVector {
    extract_with_entities(section, &EntityCounts::default())
}

pub fn extract_with_entities(section: &Section, entities: &EntityCounts) -> FeatureVector {
    content_features(&section.content, entities)
}

pub fn content_features(content: &str, entities: &EntityCounts) -> FeatureVector {
    let char_count = content.chars().count() as u32;
    let digit_count = count(&DIGIT_RE, content);
    let word_count = count(&WORD_RE, content);
    let sentence_count = SENTENCE_SPLIT_RE
        .split(content)
        .filter(|s| !s.trim().is_empty())
        .count() as u32;

    FeatureVector {
        word_count,
        sentence_count,
        char_count,
        line_count: content.split('\n').count() as u32,
        digit_count,
        digit_ratio: f64::from(digit_count) / f64::from(char_count.max(1)),
        currency_count: count(&CURRENCY_RE, content),
        percentage_count: count(&PERCENTAGE_RE, content),
        number_count: count(&NUMBER_RE, content),
        date_count: count(&DATE_RE, content),
        email_count: count(&EMAIL_RE, content),
        url_count: count(&URL_RE, content),
        phone_count: count(&PHONE_RE, content),
        has_table: content.contains(TABLE_GLYPHS),
        bullet_list_count: count_lines(&BULLET_RE, content),
        numbered_list_count: count_lines(&NUMBERED_LIST_RE, content),
        text_density: text_density(content),
        entity_count: entities.total,
        person_count: entities.person,
        org_count: entities.organization,
        location_count: entities.location,
        money_count: entities.monetary,
        date_entity_count: entities.date,
        avg_word_length: f64::from(char_count) / f64::from(word_count.max(1)),
        avg_sentence_length: f64::from(word_count) / f64::from(sentence_count.max(1)),
    }
}

fn count(re: &Regex, text: &str) -> u32 {
    re.find_iter(text).count() as u32
}

fn count_lines(re: &Regex, text: &str) -> u32 {
    text.lines().filter(|line| re.is_match(line)).count() as u32
}

fn text_density(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alphanumeric = text.chars().filter(|c| c.is_alphanumeric()).count();
    alphanumeric as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(content: &str) -> Section {
        Section {
            id: 1,
            title: "Section 1".into(),
            content: content.into(),
            start_line: 0,
            end_line: 1,
            page_number: Some(1),
        }
    }

    #[test]
    fn schema_order_matches_vector() {
        let names = Feature::schema();
        assert_eq!(names.len(), 25);
        assert_eq!(names[0], "word_count");
        assert_eq!(names[13], "has_table");
        assert_eq!(names[24], "avg_sentence_length");

        let features = FeatureVector {
            has_table: true,
            word_count: 7,
            ..Default::default()
        };
        let vector = features.to_vector();
        assert_eq!(vector.len(), 25);
        assert_eq!(vector[0], 7.0);
        assert_eq!(vector[13], 1.0);
    }

    #[test]
    fn financial_paragraph_features() {
        let f = extract(&section(
            "2. Financial Summary\nRevenue was $1,200,000, up 15% from last year. Contact: cfo@example.com.",
        ));
        assert!(f.currency_count >= 1);
        assert!(f.percentage_count >= 1);
        assert_eq!(f.email_count, 1);
        assert_eq!(f.line_count, 2);
        assert_eq!(f.url_count, 0);
        assert!(!f.has_table);
        assert!(f.digit_ratio > 0.0 && f.digit_ratio < 1.0);
    }

    #[test]
    fn lexical_counts() {
        let f = extract(&section("Hello world. How are you?! Fine..."));
        assert_eq!(f.word_count, 6);
        assert_eq!(f.sentence_count, 3);
        assert_eq!(f.char_count, 34);
        assert_eq!(f.avg_sentence_length, 2.0);
        assert!((f.avg_word_length - 34.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn dates_contacts_and_structure() {
        let content = "Filed 12/31/2023 and 2024-01-15, signed March 3, 2024.\n\
                       Call (555) 123-4567 or see https://example.com/report\n\
                       • first point\n\
                       - second point\n\
                       1. step one\n\
                       2) step two\n\
                       | Q1 | Q2 |";
        let f = extract(&section(content));
        assert_eq!(f.date_count, 3);
        assert_eq!(f.phone_count, 1);
        assert_eq!(f.url_count, 1);
        assert_eq!(f.bullet_list_count, 2);
        assert_eq!(f.numbered_list_count, 2);
        assert!(f.has_table);
    }

    #[test]
    fn empty_content_is_all_zero_with_guards() {
        let f = extract(&section(""));
        assert_eq!(f.word_count, 0);
        assert_eq!(f.sentence_count, 0);
        assert_eq!(f.char_count, 0);
        assert_eq!(f.line_count, 1);
        assert_eq!(f.digit_ratio, 0.0);
        assert_eq!(f.text_density, 0.0);
        assert_eq!(f.avg_word_length, 0.0);
        assert_eq!(f.avg_sentence_length, 0.0);
    }

    #[test]
    fn entity_counts_flow_into_features() {
        let entities = EntityCounts {
            total: 6,
            person: 1,
            organization: 2,
            location: 1,
            monetary: 1,
            date: 1,
        };
        let f = extract_with_entities(&section("Acme Corp hired Jane in Paris."), &entities);
        assert_eq!(f.entity_count, 6);
        assert_eq!(f.org_count, 2);
        assert_eq!(f.money_count, 1);
        assert_eq!(
            tags(&f),
            vec![Tag::Dates, Tag::Financial, Tag::Entities]
        );
    }

    #[test]
    fn tags_follow_rule_order() {
        let f = FeatureVector {
            number_count: 6,
            has_table: true,
            date_count: 1,
            currency_count: 2,
            numbered_list_count: 1,
            person_count: 1,
            phone_count: 1,
            ..Default::default()
        };
        let labels: Vec<&str> = tags(&f).into_iter().map(Tag::as_str).collect();
        assert_eq!(
            labels,
            vec!["numbers", "table", "dates", "financial", "list", "entities", "contact_info"]
        );
        assert!(tags(&FeatureVector::default()).is_empty());
        assert!(tags(&FeatureVector {
            number_count: 5,
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn sparse_json_defaults_missing_keys_to_zero() {
        let f: FeatureVector =
            serde_json::from_str(r#"{"word_count": 150, "has_table": true}"#).unwrap();
        assert_eq!(f.word_count, 150);
        assert!(f.has_table);
        assert_eq!(f.entity_count, 0);
        assert_eq!(f.text_density, 0.0);
    }

    #[test]
    fn digit_count_agrees_with_number_matches() {
        let f = content_features("½ ² ٣ 5", &EntityCounts::default());
        assert_eq!(f.digit_count, 2);
        assert_eq!(f.number_count, 2);
    }
}
