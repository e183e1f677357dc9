//! Per-user summaries and cached diagrams.
//!
//! A summary belongs to one ledger entry: users sharing a document each
//! generate and manage their own. The lifecycle is create → refresh* →
//! delete; the diagram is an immutable derivative of the current summary
//! text, cached on the summary row, and invalidated when the summary is
//! refreshed.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger;
use crate::llm::LanguageModel;
use crate::models::{LedgerEntry, Summary};
use crate::prompts::{run_prompt, SUMMARIZE_GENERAL, SUMMARY_TO_DIAGRAM};

fn summary_from_row(row: &SqliteRow) -> Summary {
    let diagram_json: Option<String> = row.get("diagram_json");
    let diagram = diagram_json.and_then(|j| serde_json::from_str(&j).ok());

    Summary {
        id: row.get("id"),
        summary_text: row.get("summary_text"),
        summary_model: row.get("summary_model"),
        diagram,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn require_entry(
    pool: &SqlitePool,
    user_id: &str,
    document_id: &str,
) -> Result<LedgerEntry> {
    ledger::find_entry(pool, user_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found or not owned by user"))
}

async fn fetch_summary(pool: &SqlitePool, summary_id: &str) -> Result<Summary> {
    let row = sqlx::query("SELECT * FROM summaries WHERE id = ?")
        .bind(summary_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::not_found("Summary not found"))?;

    Ok(summary_from_row(&row))
}

/// The document's chunks concatenated in reading order.
async fn full_text(pool: &SqlitePool, document_id: &str) -> Result<String> {
    let texts: Vec<String> = sqlx::query_scalar(
        "SELECT c.chunk_text FROM chunks c \
         JOIN document_chunks dc ON dc.chunk_id = c.id \
         WHERE dc.document_id = ? \
         ORDER BY c.chunk_index ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    if texts.is_empty() {
        return Err(Error::bad_request("No chunks found for document"));
    }

    Ok(texts.join(" "))
}

async fn generate_summary_text(
    llm: &dyn LanguageModel,
    config: &Config,
    text: &str,
) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("text", text.to_string());
    let response = run_prompt(llm, &config.llm.chat_model, &SUMMARIZE_GENERAL, &vars)
        .await
        .map_err(Error::internal)?;
    Ok(response.text)
}

/// The caller's summary for a document.
pub async fn get_summary(pool: &SqlitePool, user_id: &str, document_id: &str) -> Result<Summary> {
    let entry = require_entry(pool, user_id, document_id).await?;
    let summary_id = entry
        .summary_id
        .ok_or_else(|| Error::not_found("Summary for document not found"))?;
    fetch_summary(pool, &summary_id).await
}

/// Generate and attach a summary. Fails when one already exists.
pub async fn create_summary(
    pool: &SqlitePool,
    config: &Config,
    llm: &dyn LanguageModel,
    user_id: &str,
    document_id: &str,
) -> Result<Summary> {
    let entry = require_entry(pool, user_id, document_id).await?;
    if entry.summary_id.is_some() {
        return Err(Error::bad_request(
            "Summary already exists for this document. Use refresh instead.",
        ));
    }

    let text = full_text(pool, document_id).await?;
    let summary_text = generate_summary_text(llm, config, &text).await?;

    let now = Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO summaries (id, summary_text, summary_model, diagram_json, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, NULL, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&summary_text)
    .bind(&config.llm.chat_model)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE user_documents SET summary_id = ?, updated_at = ? WHERE id = ?")
        .bind(&id)
        .bind(now)
        .bind(&entry.id)
        .execute(pool)
        .await?;

    Ok(Summary {
        id,
        summary_text,
        summary_model: Some(config.llm.chat_model.clone()),
        diagram: None,
        created_by: user_id.to_string(),
        created_at: now,
        updated_at: now,
    })
}

/// Regenerate the summary text in place (same summary id). The cached
/// diagram is cleared: it derived from the text being replaced.
pub async fn refresh_summary(
    pool: &SqlitePool,
    config: &Config,
    llm: &dyn LanguageModel,
    user_id: &str,
    document_id: &str,
) -> Result<Summary> {
    let entry = require_entry(pool, user_id, document_id).await?;
    let Some(summary_id) = entry.summary_id else {
        return Err(Error::bad_request(
            "No existing summary found for this document. Use create instead.",
        ));
    };

    let text = full_text(pool, document_id).await?;
    let summary_text = generate_summary_text(llm, config, &text).await?;

    sqlx::query(
        "UPDATE summaries SET summary_text = ?, summary_model = ?, diagram_json = NULL, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&summary_text)
    .bind(&config.llm.chat_model)
    .bind(Utc::now().timestamp())
    .bind(&summary_id)
    .execute(pool)
    .await?;

    fetch_summary(pool, &summary_id).await
}

/// Unlink the caller's summary and delete the row if nothing else
/// references it.
pub async fn delete_summary(pool: &SqlitePool, user_id: &str, document_id: &str) -> Result<()> {
    let entry = require_entry(pool, user_id, document_id).await?;
    let Some(summary_id) = entry.summary_id else {
        return Err(Error::not_found("No summary found for this document"));
    };

    sqlx::query("UPDATE user_documents SET summary_id = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now().timestamp())
        .bind(&entry.id)
        .execute(pool)
        .await?;

    let refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_documents WHERE summary_id = ?")
        .bind(&summary_id)
        .fetch_one(pool)
        .await?;

    if refs == 0 {
        sqlx::query("DELETE FROM summaries WHERE id = ?")
            .bind(&summary_id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// The diagram for the caller's summary: cached on first generation,
/// returned as-is afterwards until the summary is refreshed.
pub async fn generate_diagram(
    pool: &SqlitePool,
    config: &Config,
    llm: &dyn LanguageModel,
    user_id: &str,
    document_id: &str,
) -> Result<Vec<String>> {
    let entry = require_entry(pool, user_id, document_id).await?;
    let Some(summary_id) = entry.summary_id else {
        return Err(Error::bad_request(
            "No summary found for this document. Create a summary first.",
        ));
    };

    let summary = fetch_summary(pool, &summary_id).await?;
    if let Some(diagram) = summary.diagram {
        return Ok(diagram);
    }

    let mut vars = HashMap::new();
    vars.insert("text", summary.summary_text.clone());
    let response = run_prompt(llm, &config.llm.chat_model, &SUMMARY_TO_DIAGRAM, &vars)
        .await
        .map_err(Error::internal)?;

    // Keep indentation, drop blank lines
    let lines: Vec<String> = response
        .text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect();

    sqlx::query("UPDATE summaries SET diagram_json = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&lines)?)
        .bind(Utc::now().timestamp())
        .bind(&summary_id)
        .execute(pool)
        .await?;

    Ok(lines)
}
