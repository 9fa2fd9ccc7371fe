use crate::features::Tag;
use crate::models::DocumentResult;
use serde::Serialize;
use std::fmt::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => anyhow::bail!("unknown export format: {other}"),
        }
    }
}

#[derive(Serialize)]
struct ExportedSection<'a> {
    id: u32,
    title: &'a str,
    content: &'a str,
    relevance_score: f64,
    page_number: Option<u32>,
    tags: &'a [Tag],
}

#[derive(Serialize)]
struct ExportedDocument<'a> {
    document_name: &'a str,
    total_sections: usize,
    relevant_sections: usize,
    threshold: f64,
    sections: Vec<ExportedSection<'a>>,
}

/// Renders the sections of `result` scoring at or above `threshold`.
pub fn render(
    result: &DocumentResult,
    threshold: f64,
    format: ExportFormat,
) -> anyhow::Result<String> {
    let relevant: Vec<_> = result
        .sections
        .iter()
        .filter(|s| s.relevance_score >= threshold)
        .collect();

    match format {
        ExportFormat::Json => {
            let doc = ExportedDocument {
                document_name: &result.document_name,
                total_sections: result.total_sections,
                relevant_sections: relevant.len(),
                threshold,
                sections: relevant
                    .iter()
                    .map(|s| ExportedSection {
                        id: s.id,
                        title: &s.title,
                        content: &s.content,
                        relevance_score: s.relevance_score,
                        page_number: s.page_number,
                        tags: &s.tags,
                    })
                    .collect(),
            };
            Ok(serde_json::to_string_pretty(&doc)?)
        }
        ExportFormat::Text => {
            let rule = "=".repeat(80);
            let thin = "-".repeat(80);
            let mut out = String::new();
            writeln!(out, "Document: {}", result.document_name)?;
            writeln!(out, "Total Sections: {}", result.total_sections)?;
            writeln!(out, "Relevant Sections: {}", relevant.len())?;
            writeln!(out, "Threshold: {threshold}")?;
            writeln!(out, "\n{rule}\n")?;
            for s in relevant {
                let page = s
                    .page_number
                    .map_or_else(|| "-".to_string(), |p| p.to_string());
                writeln!(
                    out,
                    "\n{} (Score: {:.2}, Page: {page})",
                    s.title, s.relevance_score
                )?;
                writeln!(out, "{thin}")?;
                writeln!(out, "{}\n", s.content)?;
            }
            Ok(out)
        }
    }
}
