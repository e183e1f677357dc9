//! Document search over one user's library.
//!
//! Two channels: case-insensitive substring match on the per-user display
//! name, and nearest-neighbor ranking of the metadata embeddings by cosine
//! similarity, scored in-process over the caller's candidate rows. Vector
//! search degrades to title-only results when the embedding call hits the
//! quota condition.

use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::{Error, Result};
use crate::ledger::{self, listing_from_row, LISTING_COLUMNS};
use crate::llm::{blob_to_vec, cosine_similarity, LanguageModel};
use crate::models::DocumentListing;

/// Results of a library search, split by matching channel.
#[derive(Debug, serde::Serialize)]
pub struct SearchResults {
    pub related_title_documents: Vec<DocumentListing>,
    pub related_content_documents: Vec<DocumentListing>,
}

struct VectorCandidate {
    listing: DocumentListing,
    vector: Vec<f32>,
}

async fn vector_candidates(
    pool: &SqlitePool,
    user_id: &str,
    exclude_ids: &[String],
) -> Result<Vec<VectorCandidate>> {
    let rows = sqlx::query(&format!(
        "SELECT {}, d.metadata_vector FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? AND d.metadata_vector IS NOT NULL",
        LISTING_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let listing = listing_from_row(row);
            if exclude_ids.contains(&listing.id) {
                return None;
            }
            let blob: Vec<u8> = row.get("metadata_vector");
            Some(VectorCandidate {
                listing,
                vector: blob_to_vec(&blob),
            })
        })
        .collect())
}

fn rank_by_similarity(
    mut candidates: Vec<VectorCandidate>,
    query_vector: &[f32],
    limit: i64,
) -> Vec<DocumentListing> {
    candidates.sort_by(|a, b| {
        let sa = cosine_similarity(&a.vector, query_vector);
        let sb = cosine_similarity(&b.vector, query_vector);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
        .into_iter()
        .take(limit.max(0) as usize)
        .map(|c| c.listing)
        .collect()
}

/// Search the caller's library by display name and metadata similarity.
pub async fn search_documents(
    pool: &SqlitePool,
    llm: &dyn LanguageModel,
    user_id: &str,
    query: &str,
    limit: i64,
) -> Result<SearchResults> {
    let pattern = format!("%{}%", query.trim());
    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? AND lower(COALESCE(ud.document_name, d.title, '')) LIKE lower(?) \
         ORDER BY d.created_at DESC \
         LIMIT ?",
        LISTING_COLUMNS
    ))
    .bind(user_id)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let related_title_documents: Vec<DocumentListing> =
        rows.iter().map(listing_from_row).collect();

    // Whitespace-only queries skip the vector channel
    if query.trim().is_empty() {
        return Ok(SearchResults {
            related_title_documents,
            related_content_documents: Vec::new(),
        });
    }

    let query_vector = match llm.embed(query).await {
        Ok(v) => v,
        Err(e) if e.is_quota() => {
            warn!("search embedding degraded, title results only: {}", e);
            return Ok(SearchResults {
                related_title_documents,
                related_content_documents: Vec::new(),
            });
        }
        Err(e) => return Err(Error::internal(e)),
    };

    let title_ids: Vec<String> = related_title_documents
        .iter()
        .map(|d| d.id.clone())
        .collect();
    let candidates = vector_candidates(pool, user_id, &title_ids).await?;
    let related_content_documents = rank_by_similarity(candidates, &query_vector, limit);

    Ok(SearchResults {
        related_title_documents,
        related_content_documents,
    })
}

/// Nearest neighbors of one document's metadata embedding within the
/// caller's library. Documents without a vector produce no neighbors.
pub async fn related_documents(
    pool: &SqlitePool,
    user_id: &str,
    document_id: &str,
    limit: i64,
) -> Result<Vec<DocumentListing>> {
    ledger::find_entry(pool, user_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found or not owned by user"))?;

    let blob: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT metadata_vector FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(pool)
            .await?
            .flatten();

    let Some(blob) = blob else {
        warn!("document {} has no metadata vector", document_id);
        return Ok(Vec::new());
    };
    let query_vector = blob_to_vec(&blob);

    let exclude = vec![document_id.to_string()];
    let candidates = vector_candidates(pool, user_id, &exclude).await?;

    Ok(rank_by_similarity(candidates, &query_vector, limit))
}
