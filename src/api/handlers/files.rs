use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::uploads::{FileEntry, StatsSummary};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// 302 Found pointing at `location`.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileEntry>>, ApiError> {
    let listing = state.uploads.list(params.page, params.limit).await?;

    Ok(JSendPaginated::success(
        listing.files,
        Pagination {
            page: listing.page,
            limit: listing.limit,
            total: listing.total,
        },
    ))
}

/// Redirect to a short-lived presigned GET.
/// Route: GET /api/files/:id/download
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let url = state.uploads.download(&id).await?;
    Ok(found(url))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.uploads.delete(&id).await?;
    Ok(JSend::success(()))
}

pub async fn storage_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<StatsSummary>>, ApiError> {
    Ok(JSend::success(state.uploads.stats()?))
}

/// Route: GET /s/:code
pub async fn short_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let path = state.uploads.resolve_short_code(&code)?;
    Ok(found(path))
}
