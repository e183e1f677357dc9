//! Folder tree management.
//!
//! Each user owns a forest rooted at a single auto-created root folder
//! (`parent_id = NULL`). All structural operations verify visibility through
//! the `user_folders` attachment, keep sibling names unique, and protect two
//! invariants: the root is immovable and undeletable, and the parent graph
//! restricted to one owner stays acyclic (a move into the folder's own
//! subtree is rejected after a full recursive descent, not a bounded-depth
//! check).
//!
//! Trees are reconstructed from the flat folder list with an id-indexed
//! arena and a parent-to-children index; edges are ids, never object
//! references.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingest;
use crate::ledger::{self, listing_from_row, page_offset, total_pages, LISTING_COLUMNS};
use crate::models::{DocumentListing, Folder, FolderNode, Page};

/// How `delete_folder` treats the folder's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Re-parent documents and child folders to the deleted folder's parent.
    FolderOnly,
    /// Delete every document in the subtree through the document deletion
    /// path, then remove the subtree itself.
    WithDocuments,
}

pub(crate) fn folder_from_row(row: &SqliteRow) -> Folder {
    Folder {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// The user's root folder (`parent_id IS NULL`), if provisioned.
pub(crate) async fn root_folder(pool: &SqlitePool, owner_id: &str) -> Result<Option<Folder>> {
    let row = sqlx::query("SELECT * FROM folders WHERE owner_id = ? AND parent_id IS NULL")
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(folder_from_row))
}

/// A folder the caller can see, established by the `user_folders` relation
/// rather than the `owner_id` scalar alone.
async fn visible_folder(pool: &SqlitePool, owner_id: &str, folder_id: &str) -> Result<Option<Folder>> {
    let row = sqlx::query(
        "SELECT f.* FROM folders f \
         JOIN user_folders uf ON uf.folder_id = f.id \
         WHERE f.id = ? AND uf.user_id = ?",
    )
    .bind(folder_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(folder_from_row))
}

async fn sibling_name_taken(
    pool: &SqlitePool,
    owner_id: &str,
    parent_id: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM folders \
         WHERE owner_id = ? AND parent_id = ? AND name = ? AND id != ?",
    )
    .bind(owner_id)
    .bind(parent_id)
    .bind(name)
    .bind(exclude_id.unwrap_or(""))
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

// ============ Arena-based tree reconstruction ============

/// Flat snapshot of one owner's folders, indexed for tree assembly and
/// subtree queries.
struct FolderArena {
    by_id: HashMap<String, Folder>,
    children: HashMap<String, Vec<String>>,
    roots: Vec<String>,
}

impl FolderArena {
    async fn load(pool: &SqlitePool, owner_id: &str) -> Result<Self> {
        let rows = sqlx::query("SELECT * FROM folders WHERE owner_id = ? ORDER BY created_at ASC")
            .bind(owner_id)
            .fetch_all(pool)
            .await?;

        let mut by_id = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots = Vec::new();

        for row in &rows {
            let folder = folder_from_row(row);
            match folder.parent_id {
                Some(ref parent) => children
                    .entry(parent.clone())
                    .or_default()
                    .push(folder.id.clone()),
                None => roots.push(folder.id.clone()),
            }
            by_id.insert(folder.id.clone(), folder);
        }

        Ok(Self {
            by_id,
            children,
            roots,
        })
    }

    fn build_node(&self, id: &str) -> Option<FolderNode> {
        let folder = self.by_id.get(id)?;
        let children = self
            .children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.build_node(c)).collect())
            .unwrap_or_default();

        Some(FolderNode {
            id: folder.id.clone(),
            owner_id: folder.owner_id.clone(),
            name: folder.name.clone(),
            parent_id: folder.parent_id.clone(),
            created_at: folder.created_at,
            updated_at: folder.updated_at,
            children,
        })
    }

    /// All folder ids in the subtree rooted at `id`, in depth-first order
    /// with parents before their children.
    fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(child_ids) = self.children.get(&current) {
                stack.extend(child_ids.iter().cloned());
            }
            out.push(current);
        }
        out
    }

    fn is_descendant(&self, ancestor_id: &str, candidate_id: &str) -> bool {
        self.subtree_ids(ancestor_id)
            .iter()
            .any(|id| id == candidate_id && id != ancestor_id)
    }
}

// ============ Operations ============

/// Create a folder under `parent_id`, or under the caller's root when no
/// parent is given.
pub async fn create_folder(
    pool: &SqlitePool,
    owner_id: &str,
    name: &str,
    parent_id: Option<&str>,
) -> Result<Folder> {
    let parent = match parent_id {
        Some(pid) => visible_folder(pool, owner_id, pid)
            .await?
            .ok_or_else(|| Error::bad_request("Invalid parent folder"))?,
        None => root_folder(pool, owner_id)
            .await?
            .ok_or_else(|| Error::not_found("No root folder found for user"))?,
    };

    if sibling_name_taken(pool, owner_id, &parent.id, name, None).await? {
        return Err(Error::conflict(
            "A folder with this name already exists in this location",
        ));
    }

    let now = Utc::now().timestamp();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO folders (id, owner_id, name, parent_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(owner_id)
    .bind(name)
    .bind(&parent.id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO user_folders (user_id, folder_id) VALUES (?, ?)")
        .bind(owner_id)
        .bind(&id)
        .execute(pool)
        .await?;

    Ok(Folder {
        id,
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        parent_id: Some(parent.id),
        created_at: now,
        updated_at: now,
    })
}

pub async fn rename_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    new_name: &str,
) -> Result<Folder> {
    let folder = visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    if let Some(ref parent_id) = folder.parent_id {
        if sibling_name_taken(pool, owner_id, parent_id, new_name, Some(folder_id)).await? {
            return Err(Error::conflict(
                "A folder with this name already exists in this location",
            ));
        }
    }

    let now = Utc::now().timestamp();
    sqlx::query("UPDATE folders SET name = ?, updated_at = ? WHERE id = ?")
        .bind(new_name)
        .bind(now)
        .bind(folder_id)
        .execute(pool)
        .await?;

    Ok(Folder {
        name: new_name.to_string(),
        updated_at: now,
        ..folder
    })
}

/// Move a folder under a new parent. Rejected when the folder is the root,
/// the target is the folder itself, or the target lies inside the folder's
/// own subtree.
pub async fn move_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    new_parent_id: &str,
) -> Result<Folder> {
    let folder = visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    if folder.is_root() {
        return Err(Error::bad_request("Cannot move root folder"));
    }

    if visible_folder(pool, owner_id, new_parent_id).await?.is_none() {
        return Err(Error::bad_request("Invalid parent folder"));
    }

    if new_parent_id == folder_id {
        return Err(Error::bad_request("Cannot move folder into itself"));
    }

    let arena = FolderArena::load(pool, owner_id).await?;
    if arena.is_descendant(folder_id, new_parent_id) {
        return Err(Error::bad_request(
            "Cannot move folder into one of its descendants",
        ));
    }

    if sibling_name_taken(pool, owner_id, new_parent_id, &folder.name, Some(folder_id)).await? {
        return Err(Error::conflict(
            "A folder with this name already exists in this location",
        ));
    }

    let now = Utc::now().timestamp();
    sqlx::query("UPDATE folders SET parent_id = ?, updated_at = ? WHERE id = ?")
        .bind(new_parent_id)
        .bind(now)
        .bind(folder_id)
        .execute(pool)
        .await?;

    Ok(Folder {
        parent_id: Some(new_parent_id.to_string()),
        updated_at: now,
        ..folder
    })
}

/// Delete a folder. `FolderOnly` re-parents contents; `WithDocuments`
/// removes every document in the subtree through the per-user document
/// deletion path, then removes the subtree bottom-up so children go before
/// their parents.
pub async fn delete_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    mode: DeleteMode,
) -> Result<()> {
    let folder = visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    let Some(parent_id) = folder.parent_id else {
        return Err(Error::bad_request("Cannot delete root folder"));
    };

    match mode {
        DeleteMode::FolderOnly => {
            let mut tx = pool.begin().await?;
            let now = Utc::now().timestamp();

            // Documents directly inside move to the parent folder
            sqlx::query(
                "UPDATE user_documents SET folder_id = ?, updated_at = ? \
                 WHERE folder_id = ? AND user_id = ?",
            )
            .bind(&parent_id)
            .bind(now)
            .bind(folder_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

            // Child folders re-parent to the deleted folder's parent
            sqlx::query("UPDATE folders SET parent_id = ?, updated_at = ? WHERE parent_id = ?")
                .bind(&parent_id)
                .bind(now)
                .bind(folder_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM user_folders WHERE folder_id = ?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM folders WHERE id = ?")
                .bind(folder_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }
        DeleteMode::WithDocuments => {
            let arena = FolderArena::load(pool, owner_id).await?;
            let subtree = arena.subtree_ids(folder_id);

            // Collect the caller's documents across the whole subtree
            let mut document_ids: Vec<String> = Vec::new();
            for fid in &subtree {
                let ids: Vec<String> = sqlx::query_scalar(
                    "SELECT document_id FROM user_documents WHERE user_id = ? AND folder_id = ?",
                )
                .bind(owner_id)
                .bind(fid)
                .fetch_all(pool)
                .await?;
                document_ids.extend(ids);
            }

            // Each goes through the two-phase delete: shared documents
            // survive for their other holders
            for document_id in &document_ids {
                ingest::delete_document(pool, owner_id, document_id).await?;
            }

            // Children before parents to respect the self-referencing key
            for fid in subtree.iter().rev() {
                sqlx::query("DELETE FROM user_folders WHERE folder_id = ?")
                    .bind(fid)
                    .execute(pool)
                    .await?;
                sqlx::query("DELETE FROM folders WHERE id = ?")
                    .bind(fid)
                    .execute(pool)
                    .await?;
            }
        }
    }

    Ok(())
}

/// The caller's whole folder forest.
pub async fn list_tree(pool: &SqlitePool, owner_id: &str) -> Result<Vec<FolderNode>> {
    let arena = FolderArena::load(pool, owner_id).await?;
    Ok(arena
        .roots
        .iter()
        .filter_map(|id| arena.build_node(id))
        .collect())
}

/// The subtree rooted at one visible folder.
pub async fn folder_tree(pool: &SqlitePool, owner_id: &str, folder_id: &str) -> Result<FolderNode> {
    visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    let arena = FolderArena::load(pool, owner_id).await?;
    arena
        .build_node(folder_id)
        .ok_or_else(|| Error::not_found("Folder not found"))
}

/// Paginated documents directly inside one folder, seen through the
/// caller's ledger entries.
pub async fn documents_in_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    page: i64,
    limit: i64,
) -> Result<Page<DocumentListing>> {
    visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    let offset = page_offset(page, limit)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_documents WHERE user_id = ? AND folder_id = ?",
    )
    .bind(owner_id)
    .bind(folder_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM user_documents ud \
         JOIN documents d ON d.id = ud.document_id \
         WHERE ud.user_id = ? AND ud.folder_id = ? \
         ORDER BY d.created_at DESC \
         LIMIT ? OFFSET ?",
        LISTING_COLUMNS
    ))
    .bind(owner_id)
    .bind(folder_id)
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

/// Point the caller's ledger entry at a folder.
pub async fn add_document_to_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    document_id: &str,
) -> Result<()> {
    visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    let entry = ledger::find_entry(pool, owner_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found"))?;

    if entry.folder_id.as_deref() == Some(folder_id) {
        return Err(Error::bad_request("Document is already in this folder"));
    }

    sqlx::query("UPDATE user_documents SET folder_id = ?, updated_at = ? WHERE id = ?")
        .bind(folder_id)
        .bind(Utc::now().timestamp())
        .bind(&entry.id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Clear the caller's folder placement for a document.
pub async fn remove_document_from_folder(
    pool: &SqlitePool,
    owner_id: &str,
    folder_id: &str,
    document_id: &str,
) -> Result<()> {
    visible_folder(pool, owner_id, folder_id)
        .await?
        .ok_or_else(|| Error::not_found("Folder not found"))?;

    let entry = ledger::find_entry(pool, owner_id, document_id)
        .await?
        .ok_or_else(|| Error::not_found("Document not found in this folder"))?;

    if entry.folder_id.as_deref() != Some(folder_id) {
        return Err(Error::not_found("Document not found in this folder"));
    }

    sqlx::query("UPDATE user_documents SET folder_id = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now().timestamp())
        .bind(&entry.id)
        .execute(pool)
        .await?;

    Ok(())
}
