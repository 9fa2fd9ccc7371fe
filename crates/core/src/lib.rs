//! Core library: segmentation, feature extraction, relevance scoring and the
//! feedback loop that retrains the scorer.

pub mod classifier;
pub mod config;
pub mod document;
pub mod export;
pub mod features;
pub mod forest;
pub mod heuristic;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod repository;
pub mod scaler;
pub mod scanner;
pub mod segmenter;
