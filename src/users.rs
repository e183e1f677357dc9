//! User provisioning.
//!
//! Authentication lives in an external identity service; the core only sees
//! opaque user ids. The one piece of per-user state the core must set up is
//! the root folder, created when the identity service reports a registration.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::folders::{folder_from_row, root_folder};
use crate::models::Folder;

/// Idempotently create the user's root folder and its visibility attachment.
/// Returns the existing root when the user is already provisioned.
pub async fn provision_user(pool: &SqlitePool, user_id: &str) -> Result<Folder> {
    if let Some(root) = root_folder(pool, user_id).await? {
        return Ok(root);
    }

    let now = Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO folders (id, owner_id, name, parent_id, created_at, updated_at) \
         VALUES (?, ?, 'Root', NULL, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO user_folders (user_id, folder_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(&id)
        .execute(pool)
        .await?;

    let row = sqlx::query("SELECT * FROM folders WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    Ok(folder_from_row(&row))
}
