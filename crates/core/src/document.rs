use anyhow::Context;
use std::path::Path;
use thiserror::Error;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];
const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
}

/// Raw text of one document plus optional per-page texts.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub name: String,
    pub text: String,
    pub pages: Option<Vec<String>>,
}

impl DocumentInput {
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let pages = split_pages(&text);
        Self {
            name: name.into(),
            text,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.as_ref().map_or(1, Vec::len)
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reads a plain-text document. Invalid UTF-8 is replaced, form feeds
/// separate pages.
pub async fn load(path: &Path) -> anyhow::Result<DocumentInput> {
    if !is_supported(path) {
        return Err(DocumentError::Unsupported(path.display().to_string()).into());
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(DocumentInput::from_text(name, text))
}

/// Page texts when the document has explicit page breaks.
fn split_pages(text: &str) -> Option<Vec<String>> {
    if !text.contains(PAGE_BREAK) {
        return None;
    }
    Some(text.split(PAGE_BREAK).map(str::to_string).collect())
}

/// Unique id for a processing run of `name`.
pub fn document_id(name: &str) -> String {
    let now = chrono::Utc::now();
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true).as_bytes());
    hasher.update(&rand::random::<u64>().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported(Path::new("report.TXT")));
        assert!(is_supported(Path::new("notes/readme.md")));
        assert!(!is_supported(Path::new("scan.pdf")));
        assert!(!is_supported(Path::new("Makefile")));
    }

    #[test]
    fn form_feeds_split_pages() {
        let doc = DocumentInput::from_text("a.txt", "page one\x0cpage two\x0cpage three");
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages.as_ref().unwrap()[1], "page two");

        let single = DocumentInput::from_text("b.txt", "no breaks here");
        assert!(single.pages.is_none());
        assert_eq!(single.page_count(), 1);
    }

    #[tokio::test]
    async fn load_reads_lossy_utf8() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("memo.txt");
        std::fs::write(&path, b"Revenue \xff grew\x0cAppendix").unwrap();

        let doc = load(&path).await.unwrap();
        assert_eq!(doc.name, "memo.txt");
        assert!(doc.text.contains('\u{FFFD}'));
        assert_eq!(doc.page_count(), 2);
    }

    #[tokio::test]
    async fn load_rejects_unsupported_types() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(err.downcast_ref::<DocumentError>().is_some());
    }

    #[test]
    fn document_ids_are_hex_and_distinct() {
        let a = document_id("report.txt");
        let b = document_id("other.txt");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
