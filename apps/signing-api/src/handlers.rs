//! HTTP surface. Handlers stay thin; the pipeline lives in `workflow`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::error::ApiError;
use crate::models::{
    ApplyLayoutRequest, ApplyLayoutResponse, CreateDocumentRequest, CreateDocumentResponse,
    DocumentResponse, SignDocumentRequest, SignDocumentResponse, UpdateLayoutRequest,
    UpdateLayoutResponse,
};
use crate::state::AppState;
use crate::storage;
use crate::workflow;

pub async fn health() -> &'static str {
    "OK"
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<CreateDocumentResponse>, ApiError> {
    Ok(Json(workflow::create_document(&state, req).await?))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = workflow::fetch_document(&state.db, &id).await?;
    let status = doc.status();
    let fields = doc.parsed_fields().map_err(|e| ApiError::Internal(e.into()))?;
    let anchors = doc.parsed_anchors().map_err(|e| ApiError::Internal(e.into()))?;
    let roles = doc.parsed_roles();

    Ok(Json(DocumentResponse {
        id: doc.id,
        title: doc.title,
        file_url: doc.file_url,
        file_format: doc.file_format,
        declared_role: doc.declared_role,
        signature_status: status,
        signed_file_url: doc.signed_file_url,
        signer_roles: roles,
        fields,
        anchors,
        agreement_id: doc.agreement_id,
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    }))
}

pub async fn update_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLayoutRequest>,
) -> Result<Json<UpdateLayoutResponse>, ApiError> {
    Ok(Json(workflow::update_layout(&state, &id, req).await?))
}

pub async fn apply_layout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApplyLayoutRequest>,
) -> Result<Json<ApplyLayoutResponse>, ApiError> {
    Ok(Json(workflow::apply_layout(&state, &id, req).await?))
}

pub async fn sign_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SignDocumentRequest>,
) -> Result<Json<SignDocumentResponse>, ApiError> {
    let service_key = headers
        .get("x-service-key")
        .and_then(|value| value.to_str().ok());
    Ok(Json(
        workflow::sign_document(&state, &id, req, service_key).await?,
    ))
}

/// Serve stored artifact bytes with their recorded content type.
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<(StatusCode, [(String, String); 3], Vec<u8>), ApiError> {
    let artifact = storage::get(&state.db, &path)
        .await?
        .ok_or_else(|| ApiError::DocumentNotFound(path))?;

    let headers = [
        ("Content-Type".to_string(), artifact.content_type.clone()),
        (
            "Content-Disposition".to_string(),
            format!("inline; filename=\"{}\"", file_name_of(&artifact.path)),
        ),
        ("ETag".to_string(), format!("\"{}\"", artifact.sha256)),
    ];
    Ok((StatusCode::OK, headers, artifact.data))
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
