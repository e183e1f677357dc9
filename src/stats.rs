//! Database statistics and health overview.
//!
//! Quick summary of what the shelf holds: document, chunk, ledger, folder,
//! and summary counts plus embedding coverage. Used by `dsh stats` to give
//! confidence that ingestion is working as expected.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let total_embedded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE metadata_vector IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_documents")
        .fetch_one(&pool)
        .await?;
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM user_folders")
        .fetch_one(&pool)
        .await?;
    let total_folders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM folders")
        .fetch_one(&pool)
        .await?;
    let total_summaries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summaries")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Docshelf — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Users:          {}", total_users);
    println!("  Folders:        {}", total_folders);
    println!("  Documents:      {}", total_docs);
    println!(
        "  Embedded:       {} / {} ({}%)",
        total_embedded,
        total_docs,
        if total_docs > 0 {
            (total_embedded * 100) / total_docs
        } else {
            0
        }
    );
    println!("  Chunks:         {}", total_chunks);
    println!("  Ledger entries: {}", total_entries);
    println!("  Summaries:      {}", total_summaries);

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
