//! Durable storage for uploaded files.
//!
//! Files are written under the configured uploads directory with a
//! collision-resistant `{uuid}-{sanitized_name}` name; the returned path is
//! recorded on the document row as its `file_ref`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Replace path separators and shell-hostile characters in a client-supplied
/// filename. Keeps alphanumerics, dots, dashes, and underscores.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Persist uploaded bytes and return the stored path.
pub fn save_upload(uploads_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(uploads_dir)?;
    let unique_name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(original_name));
    let path = uploads_dir.join(unique_name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Remove a stored file if it still exists. Missing files are not an error;
/// deletion must stay idempotent.
pub fn delete_file(file_ref: &str) -> Result<()> {
    let path = Path::new(file_ref);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Read a stored file back for serving.
pub fn read_file(file_ref: &str) -> Result<Vec<u8>> {
    Ok(std::fs::read(file_ref)?)
}
