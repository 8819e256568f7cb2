use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::response::{ApiError, AppJson, JSend};
use crate::uploads::{
    CancelRequest, CompleteRequest, CompletedUpload, MultipartSession, NewUpload, PartRequest,
    PresignedPart, PresignedUpload,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub file_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub file_id: String,
}

pub async fn presign_upload(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<NewUpload>,
) -> Result<Json<JSend<PresignedUpload>>, ApiError> {
    Ok(JSend::success(state.uploads.create_presigned(req).await?))
}

pub async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ConfirmRequest>,
) -> Result<Json<JSend<CompletedUpload>>, ApiError> {
    Ok(JSend::success(state.uploads.confirm(&req.file_id).await?))
}

pub async fn initiate_multipart(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<NewUpload>,
) -> Result<Json<JSend<MultipartSession>>, ApiError> {
    Ok(JSend::success(state.uploads.initiate_multipart(req).await?))
}

pub async fn presign_part(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<PartRequest>,
) -> Result<Json<JSend<PresignedPart>>, ApiError> {
    Ok(JSend::success(state.uploads.presign_part(req).await?))
}

pub async fn complete_multipart(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CompleteRequest>,
) -> Result<Json<JSend<CompletedUpload>>, ApiError> {
    Ok(JSend::success(state.uploads.complete_multipart(req).await?))
}

pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CancelRequest>,
) -> Result<Json<JSend<CancelResponse>>, ApiError> {
    let file_id = req.file_id.clone();
    state.uploads.cancel_upload(req).await?;
    Ok(JSend::success(CancelResponse { file_id }))
}
