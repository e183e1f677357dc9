//! HTTP API server.
//!
//! Exposes the document shelf over a JSON HTTP API. Authentication lives in
//! an external identity layer that forwards the authenticated user id in the
//! `x-user-id` header; every route except `/health` requires it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/users/provision` | Create the caller's root folder |
//! | `POST`   | `/documents` | Upload a document (multipart: file, title, folder_id) |
//! | `GET`    | `/documents` | Paginated library listing |
//! | `GET`    | `/documents/favorites` | Favorited documents |
//! | `GET`    | `/documents/search` | Title + vector search |
//! | `GET`    | `/documents/{id}/related` | Nearest neighbors by metadata vector |
//! | `GET`    | `/documents/{id}/file` | Serve the stored file |
//! | `PATCH`  | `/documents/{id}/name` | Rename the caller's copy |
//! | `POST`   | `/documents/{id}/favorite` | Toggle favorite |
//! | `DELETE` | `/documents/{id}` | Remove from library / garbage-collect |
//! | `GET`    | `/documents/{id}/summary` | Fetch the caller's summary |
//! | `POST`   | `/documents/{id}/summary` | Create summary |
//! | `PUT`    | `/documents/{id}/summary` | Refresh summary |
//! | `DELETE` | `/documents/{id}/summary` | Delete summary |
//! | `POST`   | `/documents/{id}/diagram` | Generate or fetch cached diagram |
//! | `GET`    | `/folders` | The caller's folder forest |
//! | `POST`   | `/folders` | Create folder |
//! | `GET`    | `/folders/{id}/tree` | Subtree rooted at a folder |
//! | `GET`    | `/folders/{id}/documents` | Paginated folder contents |
//! | `PATCH`  | `/folders/{id}` | Rename folder |
//! | `POST`   | `/folders/{id}/move` | Move folder |
//! | `DELETE` | `/folders/{id}` | Delete folder (`?mode=folder_only\|with_documents`) |
//! | `POST`   | `/folders/{id}/documents/{doc_id}` | Place document in folder |
//! | `DELETE` | `/folders/{id}/documents/{doc_id}` | Remove document from folder |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "page and limit must be positive" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `internal` (500). Internal errors are logged with their
//! source chain and never leak detail to the caller.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::extract::{mime_from_filename, BuiltinExtractor, TextExtractor};
use crate::folders::{self, DeleteMode};
use crate::ingest::{self, Upload};
use crate::ledger;
use crate::llm::{create_model, LanguageModel};
use crate::models::DocumentRemoval;
use crate::search;
use crate::storage;
use crate::summary;
use crate::users;
use crate::{db, migrate};

/// Maximum accepted upload size.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: sqlx::SqlitePool,
    pub llm: Arc<dyn LanguageModel>,
    pub extractor: Arc<dyn TextExtractor>,
}

/// Start the HTTP server with the configured language model and the built-in
/// extractor. Runs migrations first so a fresh database works immediately.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let llm: Arc<dyn LanguageModel> = Arc::from(create_model(&config.llm)?);
    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        llm,
        extractor: Arc::new(BuiltinExtractor),
    };

    let bind_addr = config.server.bind.clone();
    let app = router(state);

    info!("docshelf listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/users/provision", post(handle_provision))
        .route("/documents", post(handle_upload).get(handle_list_documents))
        .route("/documents/favorites", get(handle_favorites))
        .route("/documents/search", get(handle_search))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/documents/{id}/related", get(handle_related))
        .route("/documents/{id}/file", get(handle_file))
        .route("/documents/{id}/name", patch(handle_rename_document))
        .route("/documents/{id}/favorite", post(handle_toggle_favorite))
        .route(
            "/documents/{id}/summary",
            get(handle_get_summary)
                .post(handle_create_summary)
                .put(handle_refresh_summary)
                .delete(handle_delete_summary),
        )
        .route("/documents/{id}/diagram", post(handle_diagram))
        .route("/folders", get(handle_list_folders).post(handle_create_folder))
        .route(
            "/folders/{id}",
            patch(handle_rename_folder).delete(handle_delete_folder),
        )
        .route("/folders/{id}/tree", get(handle_folder_tree))
        .route("/folders/{id}/documents", get(handle_folder_documents))
        .route("/folders/{id}/move", post(handle_move_folder))
        .route(
            "/folders/{id}/documents/{doc_id}",
            post(handle_add_to_folder).delete(handle_remove_from_folder),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Internal(source) => {
                error!("internal error: {:#}", source);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Pull the authenticated user id out of the identity layer's header.
fn require_user(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized".to_string(),
            message: "missing x-user-id header".to_string(),
        })
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Users ============

async fn handle_provision(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let root = users::provision_user(&state.pool, &user).await?;
    Ok(Json(serde_json::json!({ "root_folder": root })))
}

// ============ Documents ============

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;

    let mut file_name: Option<String> = None;
    let mut bytes: Vec<u8> = Vec::new();
    let mut title: Option<String> = None;
    let mut folder_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().map(|n| n.to_string());
                bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file field: {}", e)))?
                    .to_vec();
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid title field: {}", e)))?,
                );
            }
            "folder_id" => {
                folder_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid folder_id field: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| bad_request("file field is required"))?;

    let outcome = ingest::upload_document(
        &state.pool,
        &state.config,
        state.llm.as_ref(),
        state.extractor.as_ref(),
        &user,
        Upload {
            file_name,
            title,
            folder_id: folder_id.filter(|f| !f.is_empty()),
            bytes,
        },
    )
    .await?;

    Ok(Json(serde_json::json!(outcome)))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    5
}

async fn handle_list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let page = ledger::list_all(&state.pool, &user, query.page, query.limit).await?;
    Ok(Json(serde_json::json!(page)))
}

async fn handle_favorites(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let documents = ledger::list_favorites(&state.pool, &user).await?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
}

fn default_search_limit() -> i64 {
    10
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let results =
        search::search_documents(&state.pool, state.llm.as_ref(), &user, &query.q, query.limit)
            .await?;
    Ok(Json(serde_json::json!(results)))
}

async fn handle_related(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let documents = search::related_documents(&state.pool, &user, &id, query.limit).await?;
    Ok(Json(serde_json::json!({
        "total": documents.len(),
        "documents": documents,
    })))
}

async fn handle_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let user = require_user(&headers)?;

    ledger::find_entry(&state.pool, &user, &id)
        .await?
        .ok_or_else(|| AppError::from(Error::not_found("Document not found or not owned by user")))?;

    let file_ref: Option<String> = sqlx::query_scalar("SELECT file_ref FROM documents WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| AppError::from(Error::from(e)))?
        .flatten();

    let file_ref = file_ref
        .filter(|path| std::path::Path::new(path).exists())
        .ok_or_else(|| bad_request("Document file not found on server"))?;

    let bytes = storage::read_file(&file_ref).map_err(|e| AppError::from(Error::internal(e)))?;
    let mime = mime_from_filename(&file_ref);

    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

#[derive(Deserialize)]
struct RenameBody {
    name: String,
}

async fn handle_rename_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    if body.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    ledger::rename(&state.pool, &user, &id, body.name.trim()).await?;
    Ok(Json(serde_json::json!({ "message": "Document name updated successfully" })))
}

async fn handle_toggle_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let entry = ledger::toggle_favorite(&state.pool, &user, &id).await?;
    Ok(Json(serde_json::json!(entry)))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let removal = ingest::delete_document(&state.pool, &user, &id).await?;
    let message = match removal {
        DocumentRemoval::LibraryOnly => "Document removed from your library",
        DocumentRemoval::Purged => "Document removed successfully",
    };
    Ok(Json(serde_json::json!({ "message": message })))
}

// ============ Summaries ============

async fn handle_get_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let summary = summary::get_summary(&state.pool, &user, &id).await?;
    Ok(Json(serde_json::json!(summary)))
}

async fn handle_create_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let summary =
        summary::create_summary(&state.pool, &state.config, state.llm.as_ref(), &user, &id).await?;
    Ok(Json(serde_json::json!(summary)))
}

async fn handle_refresh_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let summary =
        summary::refresh_summary(&state.pool, &state.config, state.llm.as_ref(), &user, &id)
            .await?;
    Ok(Json(serde_json::json!(summary)))
}

async fn handle_delete_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    summary::delete_summary(&state.pool, &user, &id).await?;
    Ok(Json(serde_json::json!({ "message": "Summary removed successfully" })))
}

async fn handle_diagram(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let diagram =
        summary::generate_diagram(&state.pool, &state.config, state.llm.as_ref(), &user, &id)
            .await?;
    Ok(Json(serde_json::json!({ "diagram": diagram })))
}

// ============ Folders ============

async fn handle_list_folders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let folders = folders::list_tree(&state.pool, &user).await?;
    Ok(Json(serde_json::json!({
        "total": folders.len(),
        "folders": folders,
    })))
}

#[derive(Deserialize)]
struct CreateFolderBody {
    name: String,
    #[serde(default)]
    parent_id: Option<String>,
}

async fn handle_create_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateFolderBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    if body.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let folder = folders::create_folder(
        &state.pool,
        &user,
        body.name.trim(),
        body.parent_id.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::json!(folder)))
}

async fn handle_folder_tree(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let tree = folders::folder_tree(&state.pool, &user, &id).await?;
    Ok(Json(serde_json::json!(tree)))
}

async fn handle_folder_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let page =
        folders::documents_in_folder(&state.pool, &user, &id, query.page, query.limit).await?;
    Ok(Json(serde_json::json!(page)))
}

async fn handle_rename_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    if body.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let folder = folders::rename_folder(&state.pool, &user, &id, body.name.trim()).await?;
    Ok(Json(serde_json::json!(folder)))
}

#[derive(Deserialize)]
struct MoveFolderBody {
    new_parent_id: String,
}

async fn handle_move_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MoveFolderBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let folder = folders::move_folder(&state.pool, &user, &id, &body.new_parent_id).await?;
    Ok(Json(serde_json::json!(folder)))
}

#[derive(Deserialize)]
struct DeleteFolderQuery {
    #[serde(default)]
    mode: Option<String>,
}

async fn handle_delete_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DeleteFolderQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    let mode = match query.mode.as_deref() {
        None | Some("folder_only") => DeleteMode::FolderOnly,
        Some("with_documents") => DeleteMode::WithDocuments,
        Some(other) => {
            return Err(bad_request(format!(
                "unknown delete mode: {}. Use folder_only or with_documents.",
                other
            )))
        }
    };
    folders::delete_folder(&state.pool, &user, &id, mode).await?;
    Ok(Json(serde_json::json!({ "message": "Folder deleted successfully" })))
}

async fn handle_add_to_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, doc_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    folders::add_document_to_folder(&state.pool, &user, &id, &doc_id).await?;
    Ok(Json(serde_json::json!({ "message": "Document added to folder successfully" })))
}

async fn handle_remove_from_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, doc_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = require_user(&headers)?;
    folders::remove_document_from_folder(&state.pool, &user, &id, &doc_id).await?;
    Ok(Json(serde_json::json!({ "message": "Document removed from folder successfully" })))
}
