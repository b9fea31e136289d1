//! Specification Merger: one document per resource, built from the
//! fragments found along its directory path.
//!
//! Every call re-reads the filesystem; nothing is cached between calls so
//! edits are always observed.

use std::io::ErrorKind;
use std::path::Path;

use crate::document::{deep_merge, empty, Document};
use crate::error::SpecError;

/// Fragment file names, in lookup order. The first one present wins.
pub const FRAGMENT_NAMES: &[&str] = &["spec.json", "spec.yaml", "spec.yml"];

/// Read the fragment stored directly in `dir`, if any.
///
/// A missing file (or missing directory) is `Ok(None)`. A present but
/// unreadable or unparsable file is an error.
pub async fn read_fragment(dir: &Path) -> Result<Option<Document>, SpecError> {
    for name in FRAGMENT_NAMES {
        let path = dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => return parse_fragment(&content, &path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(source) => return Err(SpecError::Io { path, source }),
        }
    }
    Ok(None)
}

/// Merge every fragment from `root` down to `root/sub_path`.
///
/// `sub_path` is slash-delimited (`users/{id}/GET`). Deeper fragments win on
/// scalar and sequence conflicts; mappings merge key-wise.
pub async fn load_merged(root: &Path, sub_path: &str) -> Result<Document, SpecError> {
    let mut merged = empty();
    let mut dir = root.to_path_buf();

    if let Some(fragment) = read_fragment(&dir).await? {
        merged = deep_merge(&merged, &fragment);
    }
    for segment in sub_path.split('/').filter(|s| !s.is_empty()) {
        dir.push(segment);
        if let Some(fragment) = read_fragment(&dir).await? {
            tracing::trace!(path = %dir.display(), "merging specification fragment");
            merged = deep_merge(&merged, &fragment);
        }
    }
    Ok(merged)
}

fn parse_fragment(content: &str, path: &Path) -> Result<Document, SpecError> {
    // YAML parser also accepts JSON.
    let value: Document = serde_yaml::from_str(content).map_err(|e| SpecError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    match value {
        Document::Object(_) => Ok(value),
        Document::Null => Ok(empty()),
        _ => Err(SpecError::Malformed {
            path: path.to_path_buf(),
            message: "specification root must be a mapping".into(),
        }),
    }
}
