//! Ownership ledger: the per-(user, document) association table.
//!
//! Every read of a document goes through a ledger entry, which carries the
//! per-user customization (display name, favorite flag, folder placement,
//! personal summary) without mutating the shared document row. A document
//! with zero ledger entries is orphaned and gets garbage-collected by the
//! deletion path.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{format_file_size, DocumentListing, DocumentMetadata, LedgerEntry, Page};

/// Columns selected for per-user document listings. The embedding vector is
/// deliberately absent: it is large and write-only from the reader's side.
pub(crate) const LISTING_COLUMNS: &str = "d.id, d.title, d.metadata_json, d.doc_date, d.file_ref, \
     d.file_size, d.content_hash, d.status, d.created_at, d.updated_at, \
     ud.document_name, ud.is_favorite";

pub(crate) fn listing_from_row(row: &SqliteRow) -> DocumentListing {
    let metadata_json: String = row.get("metadata_json");
    let metadata: DocumentMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();
    let document_name: Option<String> = row.get("document_name");
    let shared_title: Option<String> = row.get("title");
    let file_size: Option<i64> = row.get("file_size");

    DocumentListing {
        id: row.get("id"),
        // The per-user display name wins over the shared document title
        title: document_name.or(shared_title),
        metadata,
        doc_date: row.get("doc_date"),
        file_ref: row.get("file_ref"),
        file_size,
        formatted_file_size: format_file_size(file_size.unwrap_or(0)),
        content_hash: row.get("content_hash"),
        status: row.get("status"),
        is_favorite: row.get("is_favorite"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn entry_from_row(row: &SqliteRow) -> LedgerEntry {
    LedgerEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        document_id: row.get("document_id"),
        folder_id: row.get("folder_id"),
        summary_id: row.get("summary_id"),
        document_name: row.get("document_name"),
        is_favorite: row.get("is_favorite"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Validate 1-based pagination inputs and return the row offset.
pub(crate) fn page_offset(page: i64, limit: i64) -> Result<i64> {
    if page < 1 || limit < 1 {
        return Err(Error::bad_request("page and limit must be positive"));
    }
    Ok((page - 1) * limit)
}

pub(crate) fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// Create a ledger entry for (user, document). Duplicate prevention is the
/// ingestion pipeline's responsibility; this is insert-only.
pub async fn attach<'e, E>(
    executor: E,
    user_id: &str,
    document_id: &str,
    folder_id: Option<&str>,
    display_name: Option<&str>,
) -> Result<LedgerEntry>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let now = Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO user_documents
            (id, user_id, document_id, folder_id, summary_id, document_name, is_favorite, created_at, updated_at)
        VALUES (?, ?, ?, ?, NULL, ?, 0, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(document_id)
    .bind(folder_id)
    .bind(display_name)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(LedgerEntry {
        id,
        user_id: user_id.to_string(),
        document_id: document_id.to_string(),
        folder_id: folder_id.map(|s| s.to_string()),
        summary_id: None,
        document_name: display_name.map(|s| s.to_string()),
        is_favorite: false,
        created_at: now,
        updated_at: now,
    })
}

/// Look up the caller's entry for a document, if any.
pub async fn find_entry<'e, E>(
    executor: E,
    user_id: &str,
    document_id: &str,
) -> Result<Option<LedgerEntry>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query("SELECT * FROM user_documents WHERE user_id = ? AND document_id = ?")
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(executor)
        .await?;

    Ok(row.as_ref().map(entry_from_row))
}

/// Remove exactly the caller's entry. Callers coordinate the follow-up
/// garbage collection via [`remaining_count`].
pub async fn detach<'e, E>(executor: E, user_id: &str, document_id: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("DELETE FROM user_documents WHERE user_id = ? AND document_id = ?")
        .bind(user_id)
        .bind(document_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Count ledger entries still referencing a document.
pub async fn remaining_count<'e, E>(executor: E, document_id: &str) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_documents WHERE document_id = ?")
        .bind(document_id)
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// Flip the caller's favorite flag for a document.
pub async fn toggle_favorite(
    pool: &SqlitePool,
    user_id: &str,
    document_id: &str,
) -> Result<LedgerEntry> {
    let entry = find_entry(pool, user_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found or not owned by user"))?;

    let now = Utc::now().timestamp();
    sqlx::query("UPDATE user_documents SET is_favorite = ?, updated_at = ? WHERE id = ?")
        .bind(!entry.is_favorite)
        .bind(now)
        .bind(&entry.id)
        .execute(pool)
        .await?;

    Ok(LedgerEntry {
        is_favorite: !entry.is_favorite,
        updated_at: now,
        ..entry
    })
}

/// Rename the caller's copy of a document. The shared document title is
/// untouched; other users keep their own display names.
pub async fn rename(
    pool: &SqlitePool,
    user_id: &str,
    document_id: &str,
    new_name: &str,
) -> Result<()> {
    let entry = find_entry(pool, user_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found or not owned by user"))?;

    sqlx::query("UPDATE user_documents SET document_name = ?, updated_at = ? WHERE id = ?")
        .bind(new_name)
        .bind(Utc::now().timestamp())
        .bind(&entry.id)
        .execute(pool)
        .await?;

    Ok(())
}

/// All of the caller's favorited documents, newest first.
pub async fn list_favorites(pool: &SqlitePool, user_id: &str) -> Result<Vec<DocumentListing>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? AND ud.is_favorite = 1 \
         ORDER BY d.created_at DESC",
        LISTING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(listing_from_row).collect())
}

/// Paginated listing of everything visible to the caller.
pub async fn list_all(
    pool: &SqlitePool,
    user_id: &str,
    page: i64,
    limit: i64,
) -> Result<Page<DocumentListing>> {
    let offset = page_offset(page, limit)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_documents WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? \
         ORDER BY d.created_at DESC \
         LIMIT ? OFFSET ?",
        LISTING_COLUMNS
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(Page {
        total,
        current_page: page,
        total_pages: total_pages(total, limit),
        items: rows.iter().map(listing_from_row).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 5).unwrap(), 0);
        assert_eq!(page_offset(3, 10).unwrap(), 20);
        assert!(page_offset(0, 5).is_err());
        assert!(page_offset(1, 0).is_err());
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 5), 0);
        assert_eq!(total_pages(5, 5), 1);
        assert_eq!(total_pages(6, 5), 2);
        assert_eq!(total_pages(11, 5), 3);
    }
}
