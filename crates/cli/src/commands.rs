//! Argument parsing helpers and plain-text reports for the `docsieve` binary.

use clap::ValueEnum;
use docsieve_core::classifier::{FeedbackOutcome, TrainOutcome};
use docsieve_core::models::DocumentResult;
use docsieve_core::pipeline::{BatchSummary, StatusReport};
use docsieve_core::repository::DocumentSummary;
use std::fmt::Write;

const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Label {
    Relevant,
    Irrelevant,
}

impl Label {
    pub fn is_relevant(self) -> bool {
        matches!(self, Label::Relevant)
    }
}

/// clap value parser for relevance cutoffs.
pub fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("`{s}` is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("threshold must be between 0 and 1, got {value}"))
    }
}

pub fn document_report(result: &DocumentResult, full: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}]: {} sections, {} at or above {:.2} ({:.3}s)",
        result.document_name,
        result.document_id,
        result.total_sections,
        result.relevant_sections,
        result.threshold,
        result.processing_time
    );
    for s in &result.sections {
        let marker = if s.relevance_score >= result.threshold {
            '*'
        } else {
            ' '
        };
        let page = s
            .page_number
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let tags: Vec<String> = s.tags.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "{marker} #{:<3} {:.3}  p.{page:<3} {}{}",
            s.id,
            s.relevance_score,
            s.title,
            if tags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", tags.join(", "))
            }
        );
        if full {
            for line in s.content.lines() {
                let _ = writeln!(out, "        {line}");
            }
        } else {
            let _ = writeln!(out, "        {}", preview(&s.content));
        }
    }
    out
}

pub fn batch_report(summary: &BatchSummary) -> String {
    let mut out = String::new();
    for doc in &summary.documents {
        let _ = writeln!(
            out,
            "{}  {}  sections {}  relevant {}",
            doc.document_id, doc.document_name, doc.total_sections, doc.relevant_sections
        );
    }
    for failure in &summary.failed {
        let _ = writeln!(out, "failed  {}: {}", failure.path.display(), failure.error);
    }
    let _ = writeln!(
        out,
        "processed {}, failed {}",
        summary.documents.len(),
        summary.failed.len()
    );
    out
}

pub fn document_list(documents: &[DocumentSummary]) -> String {
    if documents.is_empty() {
        return "no processed documents\n".to_string();
    }
    let mut out = String::new();
    for doc in documents {
        let when = chrono::DateTime::from_timestamp(doc.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}  {}  {} sections  {when}",
            doc.id, doc.name, doc.total_sections
        );
    }
    out
}

pub fn feedback_report(outcome: &FeedbackOutcome) -> String {
    match outcome.training {
        Some(training) => format!("feedback recorded; {}", train_report(&training)),
        None => format!("feedback recorded; {} pending", outcome.pending),
    }
}

pub fn train_report(outcome: &TrainOutcome) -> String {
    match outcome {
        TrainOutcome::Trained { samples } => format!("classifier trained on {samples} samples"),
        TrainOutcome::Skipped { samples } => {
            format!("training skipped: only {samples} samples pending")
        }
    }
}

pub fn status_report(status: &StatusReport) -> String {
    let mode = if status.trained { "learned" } else { "heuristic" };
    let mut out = String::new();
    let _ = writeln!(out, "scoring mode: {mode}");
    if let (Some(samples), Some(at)) = (status.sample_count, status.trained_at) {
        let when = chrono::DateTime::from_timestamp(at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| at.to_string());
        let _ = writeln!(out, "last trained: {when} on {samples} samples");
    }
    let _ = writeln!(
        out,
        "pending feedback: {}/{}",
        status.pending_feedback, status.retrain_threshold
    );
    let _ = writeln!(out, "entity provider: {}", status.entity_provider);
    let _ = writeln!(out, "stored documents: {}", status.documents);
    out
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_parser_bounds() {
        assert_eq!(parse_threshold("0.7"), Ok(0.7));
        assert_eq!(parse_threshold("1"), Ok(1.0));
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("-0.1").is_err());
        assert!(parse_threshold("high").is_err());
    }

    #[test]
    fn previews_are_flattened_and_capped() {
        assert_eq!(preview("a\n  b\tc"), "a b c");
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.len(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn train_and_feedback_messages() {
        assert_eq!(
            train_report(&TrainOutcome::Trained { samples: 10 }),
            "classifier trained on 10 samples"
        );
        let pending = FeedbackOutcome {
            pending: 3,
            training: None,
        };
        assert_eq!(feedback_report(&pending), "feedback recorded; 3 pending");
    }
}
