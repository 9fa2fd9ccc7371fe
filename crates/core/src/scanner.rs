//! Expands files and directories into the list of documents to process.

use crate::document::is_supported;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files under `roots` that are not hidden or excluded. Explicitly named
/// files are returned even when unsupported so the caller can report them.
pub async fn collect_documents(
    roots: &[PathBuf],
    excludes: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    let exclude_set = build_globset(excludes)?;
    let roots = roots.to_vec();

    let found = task::spawn_blocking(move || {
        let mut found = Vec::new();
        for root in roots {
            if root.is_file() {
                found.push(root);
                continue;
            }
            for entry in WalkDir::new(&root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &exclude_set))
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                let path = entry.path();
                if !entry.file_type().is_file() {
                    continue;
                }
                if !is_supported(path) {
                    debug!(path = %path.display(), "skipping unsupported file");
                    continue;
                }
                found.push(path.to_path_buf());
            }
        }
        found.sort();
        found.dedup();
        found
    })
    .await?;

    Ok(found)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !excludes.is_match(path) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
