use crate::features::{FeatureVector, Tag};
use serde::{Deserialize, Serialize};

/// A contiguous, titled span of document text produced by segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: u32,
    pub title: String,
    pub content: String,
    /// 0-based, half-open line range.
    pub start_line: usize,
    pub end_line: usize,
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSection {
    pub id: u32,
    pub title: String,
    pub content: String,
    pub relevance_score: f64,
    pub page_number: Option<u32>,
    pub features: FeatureVector,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub document_id: String,
    pub document_name: String,
    pub total_sections: usize,
    pub relevant_sections: usize,
    pub threshold: f64,
    pub processing_time: f64,
    pub sections: Vec<ScoredSection>,
}

impl DocumentResult {
    pub fn relevant_count(&self, threshold: f64) -> usize {
        self.sections
            .iter()
            .filter(|s| s.relevance_score >= threshold)
            .count()
    }

    /// Keeps only sections scoring at or above `threshold`.
    pub fn filtered(mut self, threshold: f64) -> Self {
        self.sections.retain(|s| s.relevance_score >= threshold);
        self.relevant_sections = self.sections.len();
        self.threshold = threshold;
        self
    }

    pub fn section(&self, id: u32) -> Option<&ScoredSection> {
        self.sections.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSample {
    pub features: FeatureVector,
    pub is_relevant: bool,
}
