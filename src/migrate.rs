use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table. content_hash is the dedup key: one physical
    // document per hash, sharing happens through user_documents.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            metadata_vector BLOB,
            doc_date TEXT,
            extra_json TEXT NOT NULL DEFAULT '{}',
            file_ref TEXT,
            file_size INTEGER,
            content_hash TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create document_chunks join table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            document_id TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            PRIMARY KEY (document_id, chunk_id),
            FOREIGN KEY (document_id) REFERENCES documents(id),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create folders table. parent_id is NULL only for per-user roots.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            parent_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (parent_id) REFERENCES folders(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create user_folders visibility table. A folder is "owned" by whoever
    // holds a row here, not by the owner_id scalar alone.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_folders (
            user_id TEXT NOT NULL,
            folder_id TEXT NOT NULL,
            PRIMARY KEY (user_id, folder_id),
            FOREIGN KEY (folder_id) REFERENCES folders(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create summaries table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            id TEXT PRIMARY KEY,
            summary_text TEXT NOT NULL,
            summary_model TEXT,
            diagram_json TEXT,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create user_documents ledger table. The folder and summary pointers
    // are cleared explicitly by the deletion paths, never by cascades.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_documents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            folder_id TEXT,
            summary_id TEXT,
            document_name TEXT,
            is_favorite INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, document_id),
            FOREIGN KEY (document_id) REFERENCES documents(id),
            FOREIGN KEY (folder_id) REFERENCES folders(id),
            FOREIGN KEY (summary_id) REFERENCES summaries(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes. The partial unique index backs the one-root-per-user
    // invariant at the database level.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_root \
         ON folders(owner_id) WHERE parent_id IS NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_folders_owner ON folders(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_documents_user ON user_documents(user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_documents_document ON user_documents(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_documents_folder ON user_documents(folder_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_chunks_chunk ON document_chunks(chunk_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
