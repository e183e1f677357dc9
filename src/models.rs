//! Core data models.
//!
//! These types represent the documents, chunks, folders, ledger entries, and
//! summaries that flow through the ingestion and organization pipeline.
//! Timestamps are unix seconds (UTC); ids are UUID v4 strings.

use serde::{Deserialize, Serialize};

/// LLM-extracted document attributes plus any extra freeform keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentMetadata {
    /// Flatten the metadata into the text that gets embedded.
    pub fn to_embedding_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(ref topic) = self.topic {
            parts.push(format!("Topic: {}", topic));
        }
        if let Some(ref field) = self.field {
            parts.push(format!("Field: {}", field));
        }
        if !self.keywords.is_empty() {
            parts.push(format!("Keywords: {}", self.keywords.join(", ")));
        }
        if let Some(ref methodology) = self.methodology {
            parts.push(format!("Methodology: {}", methodology));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{}: {}", key, value));
        }
        parts.join(". ")
    }
}

/// A contiguous slice of a document's extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub token_count: i64,
}

/// A node in a per-user folder tree.
#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Folder {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A folder with its children attached, produced by tree reconstruction.
#[derive(Debug, Clone, Serialize)]
pub struct FolderNode {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub children: Vec<FolderNode>,
}

/// The per-(user, document) ownership ledger row: visibility, naming,
/// favorites, folder placement, and personal summary attachment.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub document_id: String,
    pub folder_id: Option<String>,
    pub summary_id: Option<String>,
    pub document_name: Option<String>,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Derived summary text (plus optional cached diagram lines) attached to
/// exactly one ledger entry at a time.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub id: String,
    pub summary_text: String,
    pub summary_model: Option<String>,
    pub diagram: Option<Vec<String>>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A document as seen through one user's ledger entry: the per-user display
/// name replaces the shared title, and the embedding vector is never
/// included.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentListing {
    pub id: String,
    pub title: Option<String>,
    pub metadata: DocumentMetadata,
    pub doc_date: Option<String>,
    pub file_ref: Option<String>,
    pub file_size: Option<i64>,
    pub formatted_file_size: String,
    pub content_hash: String,
    pub status: String,
    pub is_favorite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

/// Result of an upload: either a freshly ingested document or a reused one
/// (same bytes previously uploaded by another user).
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document_id: String,
    pub title: Option<String>,
    pub file_ref: Option<String>,
    pub total_chunks: i64,
    pub reused: bool,
}

/// Result of a per-user document removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRemoval {
    /// Other users still hold the document; only the caller's entry was removed.
    LibraryOnly,
    /// The caller held the last entry; document, chunks, summary, and file are gone.
    Purged,
}

/// Human-readable file size, e.g. `2.5 MB`.
pub fn format_file_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let exp = (((bytes as f64).ln() / 1024f64.ln()) as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    // Trim trailing zeros the way a float display would
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}
