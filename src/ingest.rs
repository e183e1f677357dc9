//! Document ingestion pipeline and the per-user deletion path.
//!
//! Upload flow: dedup check → durable file write → text extraction →
//! LLM attribute extraction → chunking → metadata embedding → transactional
//! persistence → folder resolution → ledger attach. Identical bytes uploaded
//! by a second user skip extraction entirely and only gain a ledger entry.
//!
//! Deletion is the mirror image and the central correctness mechanism for
//! sharing: detach the caller's ledger entry first, then garbage-collect the
//! document, its unreferenced chunks, the dangling summary, and the stored
//! file only when no other ledger entry remains. Referrer counts are
//! re-checked inside the transaction, never carried over from earlier reads.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{mime_from_filename, ExtractError, TextExtractor};
use crate::ledger;
use crate::llm::{vec_to_blob, LanguageModel};
use crate::models::{DocumentMetadata, DocumentRemoval, UploadOutcome};
use crate::prompts::{self, run_prompt, ATTRIBUTE_EXTRACTION};
use crate::storage;

/// An uploaded file plus the client-supplied fields that accompany it.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub title: Option<String>,
    pub folder_id: Option<String>,
    pub bytes: Vec<u8>,
}

/// Attributes pulled out of the document text by the language model.
#[derive(Debug, Default)]
struct ExtractedAttributes {
    metadata: DocumentMetadata,
    doc_date: Option<String>,
    extra: serde_json::Value,
}

pub async fn upload_document(
    pool: &SqlitePool,
    config: &Config,
    llm: &dyn LanguageModel,
    extractor: &dyn TextExtractor,
    owner_id: &str,
    upload: Upload,
) -> Result<UploadOutcome> {
    if upload.bytes.is_empty() {
        return Err(Error::bad_request("File not retrieved or empty"));
    }

    let title = upload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&upload.file_name)
        .to_string();

    let mut hasher = Sha256::new();
    hasher.update(&upload.bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    // Dedup check: one physical document per content hash
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ?")
        .bind(&content_hash)
        .fetch_optional(pool)
        .await?;

    if let Some(document_id) = existing {
        if ledger::find_entry(pool, owner_id, &document_id).await?.is_some() {
            return Err(Error::conflict("Duplicate file upload"));
        }

        // Same bytes from a different user: reuse the document, skip all
        // extraction and embedding work
        let folder_id = resolve_folder(pool, owner_id, upload.folder_id.as_deref()).await?;
        ledger::attach(pool, owner_id, &document_id, folder_id.as_deref(), Some(title.as_str())).await?;

        let total_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
                .bind(&document_id)
                .fetch_one(pool)
                .await?;
        let file_ref: Option<String> =
            sqlx::query_scalar("SELECT file_ref FROM documents WHERE id = ?")
                .bind(&document_id)
                .fetch_optional(pool)
                .await?
                .flatten();

        return Ok(UploadOutcome {
            document_id,
            title: Some(title),
            file_ref,
            total_chunks,
            reused: true,
        });
    }

    // Persist the raw file before extraction so the reference survives
    let file_ref = storage::save_upload(&config.storage.uploads_dir, &upload.file_name, &upload.bytes)?
        .to_string_lossy()
        .into_owned();

    let mime = mime_from_filename(&upload.file_name);
    let text = extractor.extract(&upload.bytes, mime).map_err(|e| match e {
        ExtractError::UnsupportedType(t) => Error::bad_request(format!("Unsupported file type: {}", t)),
        ExtractError::Empty => Error::bad_request("Unable to extract text from file"),
        ExtractError::Parse(_) => Error::internal(e),
    })?;

    let attributes = extract_attributes(llm, config, &text).await?;
    let chunks = chunk_text(&text, config.chunking.max_chars);
    let embedding = embed_metadata(llm, &attributes.metadata).await?;

    // Persist document, chunks, and join rows as one unit
    let document_id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    let metadata_json = serde_json::to_string(&attributes.metadata)?;
    let extra_json = serde_json::to_string(&attributes.extra)?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, title, metadata_json, metadata_vector, doc_date, extra_json,
             file_ref, file_size, content_hash, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'processed', ?, ?)
        "#,
    )
    .bind(&document_id)
    .bind(&title)
    .bind(&metadata_json)
    .bind(embedding.as_deref().map(vec_to_blob))
    .bind(&attributes.doc_date)
    .bind(&extra_json)
    .bind(&file_ref)
    .bind(upload.bytes.len() as i64)
    .bind(&content_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for chunk in &chunks {
        sqlx::query(
            "INSERT INTO chunks (id, chunk_index, chunk_text, token_count, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(chunk.chunk_index)
        .bind(&chunk.chunk_text)
        .bind(chunk.token_count)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO document_chunks (document_id, chunk_id) VALUES (?, ?)")
            .bind(&document_id)
            .bind(&chunk.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let folder_id = resolve_folder(pool, owner_id, upload.folder_id.as_deref()).await?;
    ledger::attach(pool, owner_id, &document_id, folder_id.as_deref(), Some(title.as_str())).await?;

    Ok(UploadOutcome {
        document_id,
        title: Some(title),
        file_ref: Some(file_ref),
        total_chunks: chunks.len() as i64,
        reused: false,
    })
}

/// Explicit folder if supplied and visible to the caller, else the caller's
/// root folder.
async fn resolve_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: Option<&str>,
) -> Result<Option<String>> {
    match folder_id {
        Some(fid) => {
            let owned: Option<String> = sqlx::query_scalar(
                "SELECT f.id FROM folders f \
                 JOIN user_folders uf ON uf.folder_id = f.id \
                 WHERE f.id = ? AND uf.user_id = ?",
            )
            .bind(fid)
            .bind(owner_id)
            .fetch_optional(pool)
            .await?;

            owned
                .map(Some)
                .ok_or_else(|| Error::bad_request("Folder not found or not owned by user"))
        }
        None => {
            let root: Option<String> = sqlx::query_scalar(
                "SELECT id FROM folders WHERE owner_id = ? AND parent_id IS NULL",
            )
            .bind(owner_id)
            .fetch_optional(pool)
            .await?;
            Ok(root)
        }
    }
}

/// Run the attribute-extraction prompt. Quota failures degrade to empty
/// metadata; other language-model failures propagate.
async fn extract_attributes(
    llm: &dyn LanguageModel,
    config: &Config,
    text: &str,
) -> Result<ExtractedAttributes> {
    let mut vars = HashMap::new();
    vars.insert("text", text.to_string());

    let response = match run_prompt(llm, &config.llm.chat_model, &ATTRIBUTE_EXTRACTION, &vars).await
    {
        Ok(r) => r,
        Err(e) if e.is_quota() => {
            warn!("attribute extraction degraded: {}", e);
            return Ok(ExtractedAttributes::default());
        }
        Err(e) => return Err(Error::internal(e)),
    };

    let json_text = prompts::strip_code_fence(&response.text);
    let parsed: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable attribute response, using defaults: {}", e);
            return Ok(ExtractedAttributes::default());
        }
    };

    let keywords = parsed
        .get("keywords")
        .and_then(|k| k.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(ExtractedAttributes {
        metadata: DocumentMetadata {
            topic: parsed.get("topic").and_then(|v| v.as_str()).map(String::from),
            field: parsed.get("field").and_then(|v| v.as_str()).map(String::from),
            keywords,
            methodology: parsed
                .get("methodology")
                .and_then(|v| v.as_str())
                .map(String::from),
            extra: serde_json::Map::new(),
        },
        doc_date: parsed.get("docDate").and_then(|v| v.as_str()).map(String::from),
        extra: parsed
            .get("extraAttributes")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

/// Embed the flattened metadata text. Quota failures degrade to a null
/// embedding; empty metadata is not embedded at all.
async fn embed_metadata(
    llm: &dyn LanguageModel,
    metadata: &DocumentMetadata,
) -> Result<Option<Vec<f32>>> {
    let text = metadata.to_embedding_text();
    if text.is_empty() {
        return Ok(None);
    }

    match llm.embed(&text).await {
        Ok(vector) => Ok(Some(vector)),
        Err(e) if e.is_quota() => {
            warn!("metadata embedding degraded: {}", e);
            Ok(None)
        }
        Err(e) => Err(Error::internal(e)),
    }
}

/// Remove a document from the caller's library, garbage-collecting the
/// shared rows only when the caller held the last ledger entry.
pub async fn delete_document(
    pool: &SqlitePool,
    owner_id: &str,
    document_id: &str,
) -> Result<DocumentRemoval> {
    let mut tx = pool.begin().await?;

    // Capture the summary pointer and file reference before mutating anything
    let row = sqlx::query(
        "SELECT ud.summary_id, d.file_ref \
         FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? AND ud.document_id = ?",
    )
    .bind(owner_id)
    .bind(document_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::not_found("Document not found or not owned by user"))?;

    let summary_id: Option<String> = row.get("summary_id");
    let file_ref: Option<String> = row.get("file_ref");

    ledger::detach(&mut *tx, owner_id, document_id).await?;

    // The caller's summary loses its owning entry either way; drop it unless
    // another ledger entry still references it
    if let Some(ref sid) = summary_id {
        let refs: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_documents WHERE summary_id = ?")
                .bind(sid)
                .fetch_one(&mut *tx)
                .await?;
        if refs == 0 {
            sqlx::query("DELETE FROM summaries WHERE id = ?")
                .bind(sid)
                .execute(&mut *tx)
                .await?;
        }
    }

    let remaining = ledger::remaining_count(&mut *tx, document_id).await?;
    if remaining > 0 {
        // Other users still hold the document; their chunks and summaries
        // are untouched
        tx.commit().await?;
        return Ok(DocumentRemoval::LibraryOnly);
    }

    // Last holder gone: collect chunks whose only referrer was this document
    let chunk_ids: Vec<String> =
        sqlx::query_scalar("SELECT chunk_id FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_all(&mut *tx)
            .await?;

    let mut orphaned_chunks: Vec<String> = Vec::new();
    for chunk_id in &chunk_ids {
        let other_refs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_chunks WHERE chunk_id = ? AND document_id != ?",
        )
        .bind(chunk_id)
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;
        if other_refs == 0 {
            orphaned_chunks.push(chunk_id.clone());
        }
    }

    sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    for chunk_id in &orphaned_chunks {
        sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if let Some(ref path) = file_ref {
        storage::delete_file(path)?;
    }

    Ok(DocumentRemoval::Purged)
}
