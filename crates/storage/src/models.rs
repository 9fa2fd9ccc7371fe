use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub threshold: f64,
    pub processing_time: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub document_id: String,
    pub section_id: i64,
    pub title: String,
    pub content: String,
    pub relevance_score: f64,
    pub page_number: Option<i64>,
    pub features_json: String,
    pub tags_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassifierState {
    pub schema_version: i64,
    pub state_json: String,
    pub sample_count: i64,
    pub trained_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: i64,
    pub features_json: String,
    pub is_relevant: bool,
    pub created_at: i64,
}
