//! Local storage for raw uploads.
//!
//! Files land in the configured upload directory as `{doc_id}_{sanitized filename}`. The
//! directory is append-only apart from removing the file of an ingest that failed.

use crate::parsing::DocumentFormat;
use std::io;
use std::path::{Path, PathBuf};

/// Writes uploads beneath a root directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Store rooted at `root`; the directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory receiving uploads.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` and return the stored path.
    pub async fn save(&self, doc_id: &str, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(format!("{doc_id}_{filename}"));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Upload stored");
        Ok(path)
    }

    /// Best-effort removal of a stored upload.
    pub async fn remove(&self, path: &Path) {
        if let Err(error) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %error, "Failed to remove stored upload");
        }
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts and trailing separators are dropped, whitespace becomes `_`, and anything outside ASCII
/// alphanumerics and `.-_` is removed. When nothing usable is left of the stem, the
/// name becomes `upload` plus the original extension.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .find(|part| !part.trim().is_empty())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == '_').to_string();

    if DocumentFormat::from_filename(&cleaned).is_some() {
        return cleaned;
    }
    match Path::new(base).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if DocumentFormat::from_filename(base).is_some() => {
            format!("upload.{}", ext.to_ascii_lowercase())
        }
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_kept() {
        assert_eq!(sanitize_filename("cardio_notes.pdf"), "cardio_notes.pdf");
        assert_eq!(sanitize_filename("Week-3.Renal.DOCX"), "Week-3.Renal.DOCX");
    }

    #[test]
    fn directories_and_spaces_are_neutralized() {
        assert_eq!(sanitize_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my notes.md"), "my_notes.md");
    }

    #[test]
    fn trailing_separators_keep_the_last_named_component() {
        assert_eq!(sanitize_filename("notes/chem.txt/"), "chem.txt");
        assert_eq!(sanitize_filename("notes\\bio.md\\ "), "bio.md");
        assert_eq!(sanitize_filename("/"), "");
    }

    #[test]
    fn non_ascii_stems_fall_back_to_upload() {
        assert_eq!(sanitize_filename("生理学.pdf"), "upload.pdf");
        assert_eq!(sanitize_filename("résumé.txt"), "rsum.txt");
    }

    #[tokio::test]
    async fn save_and_remove_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::new(dir.path().join("uploads"));

        let path = store.save("doc-1", "notes.txt", b"hello").await.expect("save");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("doc-1_notes.txt"));
        assert_eq!(tokio::fs::read(&path).await.expect("read"), b"hello");

        store.remove(&path).await;
        assert!(!path.exists());
    }
}
