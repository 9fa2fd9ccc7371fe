//! Splits flat document text into titled sections at header lines.

use crate::models::Section;
use regex::Regex;
use std::sync::LazyLock;

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+\.)+\s+(.+)$").unwrap());
static ROMAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([IVXivx]+\.)\s+(.+)$").unwrap());
static LETTERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]\.)\s+(.+)$").unwrap());
static ALL_CAPS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z\s]{3,}$").unwrap());
static TITLE_CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+$").unwrap());
static VISUAL_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-=*]{5,}$").unwrap());

pub const FALLBACK_TITLE: &str = "Document Content";
pub const BREAK_TITLE: &str = "Section Break";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Numbered,
    Roman,
    Lettered,
    AllCaps,
    TitleCase,
    VisualBreak,
}

/// One entry of the header table: a predicate over a trimmed line and the
/// title it produces.
pub struct HeaderRule {
    pub kind: HeaderKind,
    matches: fn(&str) -> bool,
    title: fn(&str) -> String,
}

impl HeaderRule {
    pub fn apply(&self, line: &str) -> Option<String> {
        if (self.matches)(line) {
            Some((self.title)(line))
        } else {
            None
        }
    }
}

fn line_title(line: &str) -> String {
    line.to_string()
}

/// Evaluated top to bottom; the first matching rule wins.
pub static HEADER_RULES: [HeaderRule; 6] = [
    HeaderRule {
        kind: HeaderKind::Numbered,
        matches: |l| NUMBERED_RE.is_match(l),
        title: line_title,
    },
    HeaderRule {
        kind: HeaderKind::Roman,
        matches: |l| ROMAN_RE.is_match(l),
        title: line_title,
    },
    HeaderRule {
        kind: HeaderKind::Lettered,
        matches: |l| LETTERED_RE.is_match(l),
        title: line_title,
    },
    HeaderRule {
        kind: HeaderKind::AllCaps,
        matches: |l| ALL_CAPS_RE.is_match(l) && l.chars().filter(|c| *c != ' ').count() >= 4,
        title: line_title,
    },
    HeaderRule {
        kind: HeaderKind::TitleCase,
        matches: |l| TITLE_CASE_RE.is_match(l) && (10..=100).contains(&l.chars().count()),
        title: line_title,
    },
    HeaderRule {
        kind: HeaderKind::VisualBreak,
        matches: |l| VISUAL_BREAK_RE.is_match(l),
        title: |_| BREAK_TITLE.to_string(),
    },
];

/// Classifies an already-trimmed line.
pub fn detect_header(line: &str) -> Option<(HeaderKind, String)> {
    HEADER_RULES
        .iter()
        .find_map(|rule| rule.apply(line).map(|title| (rule.kind, title)))
}

/// Linear interpolation of a line index onto `page_count` pages.
pub fn estimate_page(start_line: usize, total_lines: usize, page_count: usize) -> u32 {
    if page_count <= 1 || total_lines == 0 {
        return 1;
    }
    let ratio = start_line as f64 / total_lines as f64;
    let page = (ratio * page_count as f64).floor() as usize + 1;
    page.clamp(1, page_count) as u32
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    min_section_length: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Segmenter {
    pub fn new(min_section_length: usize) -> Self {
        Self { min_section_length }
    }

    pub fn segment(&self, text: &str, pages: Option<&[String]>) -> Vec<Section> {
        let lines: Vec<&str> = text.split('\n').collect();
        let page_count = pages.map(<[String]>::len).unwrap_or(0);

        let mut boundaries = find_boundaries(&lines);
        // Without any header the document is one undivided span.
        if boundaries.iter().all(|(_, _, title)| title.is_none()) {
            boundaries.clear();
        }

        let mut sections = Vec::new();
        for (start, end, title) in boundaries {
            let content = lines[start..end].join("\n").trim().to_string();
            if content.is_empty() || content.chars().count() < self.min_section_length {
                continue;
            }
            let id = sections.len() as u32 + 1;
            sections.push(Section {
                id,
                title: title.unwrap_or_else(|| format!("Section {id}")),
                content,
                start_line: start,
                end_line: end,
                page_number: Some(estimate_page(start, lines.len(), page_count)),
            });
        }

        if sections.is_empty() {
            let trimmed = text.trim();
            if !trimmed.is_empty() && trimmed.chars().count() >= self.min_section_length {
                sections.push(Section {
                    id: 1,
                    title: FALLBACK_TITLE.to_string(),
                    content: trimmed.to_string(),
                    start_line: 0,
                    end_line: lines.len(),
                    page_number: Some(1),
                });
            }
        }

        tracing::debug!(
            lines = lines.len(),
            sections = sections.len(),
            "segmented document"
        );
        sections
    }
}

fn find_boundaries(lines: &[&str]) -> Vec<(usize, usize, Option<String>)> {
    let mut boundaries = Vec::new();
    let mut current_start = 0;
    let mut current_title: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        let Some((_, title)) = detect_header(stripped) else {
            continue;
        };
        if i > current_start {
            boundaries.push((current_start, i, current_title.take()));
            current_start = i;
            current_title = Some(title);
        } else if current_title.is_none() {
            current_title = Some(title);
        }
    }

    if current_start < lines.len() {
        boundaries.push((current_start, lines.len(), current_title));
    }
    boundaries
}
