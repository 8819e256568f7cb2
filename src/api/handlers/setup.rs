use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::config::{ConfigError, StorageSettings};
use crate::object_store::{ObjectStore, S3Store};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub ok: bool,
}

fn config_error(e: ConfigError) -> ApiError {
    match e {
        ConfigError::ValidationError(msg) => ApiError::bad_request(msg),
        ConfigError::Database(e) => ApiError::internal(e.to_string()),
    }
}

/// Whether storage is configured. Credentials are never echoed back.
pub async fn setup_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<SetupStatusResponse>>, ApiError> {
    let settings = StorageSettings::load(&state.db).map_err(config_error)?;

    Ok(JSend::success(match settings {
        Some(s) => SetupStatusResponse {
            configured: true,
            endpoint: Some(s.endpoint),
            bucket_name: Some(s.bucket_name),
        },
        None => SetupStatusResponse {
            configured: false,
            endpoint: None,
            bucket_name: None,
        },
    }))
}

/// Persist storage settings and swap the live backend.
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    AppJson(settings): AppJson<StorageSettings>,
) -> Result<Json<JSend<SetupStatusResponse>>, ApiError> {
    settings.save(&state.db).map_err(config_error)?;

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&settings));
    let previous = state.storage.replace(store).await;

    tracing::info!(
        endpoint = %settings.endpoint,
        bucket = %settings.bucket_name,
        replaced = previous.is_some(),
        "Storage configured"
    );

    Ok(JSend::success(SetupStatusResponse {
        configured: true,
        endpoint: Some(settings.endpoint),
        bucket_name: Some(settings.bucket_name),
    }))
}

/// Try the given settings without saving them.
pub async fn test_config(
    AppJson(settings): AppJson<StorageSettings>,
) -> Result<Json<JSend<ConnectionTestResponse>>, ApiError> {
    settings.validate().map_err(config_error)?;

    S3Store::new(&settings)
        .test_connectivity()
        .await
        .map_err(|e| ApiError::unavailable(format!("Connection test failed: {e}")))?;

    Ok(JSend::success(ConnectionTestResponse { ok: true }))
}
