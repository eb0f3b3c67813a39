//! Signing pipeline: document registration, layout management, embedding,
//! and agreement completion.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use sigfield_core::{
    initials_from_name, normalize_role, resolve, role_matches, FieldType, SignatureStatus,
};
use sigfield_markup::MarkupContext;
use sigfield_pdf::{EmbedContext, PdfEmbedError, SignatureImage};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    ApplyLayoutRequest, ApplyLayoutResponse, CreateDocumentRequest, CreateDocumentResponse,
    DbDocument, SignDocumentRequest, SignDocumentResponse, UpdateLayoutRequest,
    UpdateLayoutResponse,
};
use crate::state::AppState;
use crate::storage;

const DEFAULT_TOKEN_HOURS: i64 = 72;

/// Stored document encoding. Detection prefers the URL suffix and falls
/// back to sniffing the bytes: `%PDF-` magic wins, then anything that is
/// UTF-8 and opens with an angle bracket counts as markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Markup,
}

impl FileFormat {
    pub fn detect(file_name: &str, data: &[u8]) -> Self {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".pdf") {
            return FileFormat::Pdf;
        }
        if lower.ends_with(".html") || lower.ends_with(".htm") {
            return FileFormat::Markup;
        }
        if data.starts_with(b"%PDF-") {
            return FileFormat::Pdf;
        }
        match std::str::from_utf8(data) {
            Ok(text) if text.trim_start().starts_with('<') => FileFormat::Markup,
            _ => FileFormat::Pdf,
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Markup => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Markup => "text/html",
        }
    }
}

/// Register a document: store the uploaded bytes, create the row, and mint
/// the single-use signing token. The token is returned here and nowhere
/// else.
pub async fn create_document(
    state: &AppState,
    req: CreateDocumentRequest,
) -> Result<CreateDocumentResponse, ApiError> {
    let data = BASE64
        .decode(req.file_base64.as_bytes())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid base64 file: {}", e)))?;
    if data.is_empty() {
        return Err(ApiError::InvalidRequest("Document file is empty".to_string()));
    }

    let format = FileFormat::detect(req.file_name.as_deref().unwrap_or(""), &data);
    let id = Uuid::new_v4().to_string();
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires = now + Duration::hours(req.expires_in_hours.unwrap_or(DEFAULT_TOKEN_HOURS));
    let file_url = storage::original_path(&id, format.ext());

    let fields_json =
        serde_json::to_string(&req.fields).map_err(|e| ApiError::Internal(e.into()))?;
    let anchors_json =
        serde_json::to_string(&req.anchors).map_err(|e| ApiError::Internal(e.into()))?;

    let mut tx = state.db.begin().await?;
    storage::put(&mut *tx, &file_url, format.content_type(), &data).await?;
    sqlx::query(
        r#"
        INSERT INTO documents (
            id, title, file_url, file_format, declared_role,
            signature_status, signer_roles_json, fields_json, anchors_json,
            signature_token, signature_token_expires_at, agreement_id,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 'unsigned', '{}', ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.title)
    .bind(&file_url)
    .bind(format.ext())
    .bind(&req.declared_role)
    .bind(&fields_json)
    .bind(&anchors_json)
    .bind(&token)
    .bind(expires.to_rfc3339())
    .bind(&req.agreement_id)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!("Registered document {} ({})", id, format.ext());

    Ok(CreateDocumentResponse {
        id,
        file_url,
        file_format: format.ext().to_string(),
        signing_token: token,
        token_expires_at: Some(expires),
    })
}

pub async fn fetch_document(db: &SqlitePool, id: &str) -> Result<DbDocument, ApiError> {
    sqlx::query_as::<_, DbDocument>(
        r#"
        SELECT id, title, file_url, file_format, declared_role, signature_status,
               signed_file_url, signer_roles_json, fields_json, anchors_json,
               signature_token, signature_token_expires_at, agreement_id,
               created_at, updated_at
        FROM documents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::DocumentNotFound(id.to_string()))
}

/// Token guard for signing. A matching service key skips the token; a
/// wrong token reports invalid even when the stored one has also expired.
fn verify_access(
    doc: &DbDocument,
    presented_token: Option<&str>,
    presented_key: Option<&str>,
    expected_key: Option<&str>,
) -> Result<(), ApiError> {
    if let (Some(expected), Some(presented)) = (expected_key, presented_key) {
        if expected == presented {
            return Ok(());
        }
    }

    let presented = presented_token.ok_or(ApiError::TokenRequired)?;
    let stored = doc.signature_token.as_deref().ok_or(ApiError::TokenInvalid)?;
    if presented != stored {
        return Err(ApiError::TokenInvalid);
    }
    if let Some(expires) = doc.signature_token_expires_at {
        if expires < Utc::now() {
            return Err(ApiError::TokenExpired);
        }
    }
    Ok(())
}

/// A signed paginated document is terminal. A markup row whose
/// `signed_file_url` never moved off the original marks a transition that
/// never produced its artifact; signing may run again.
fn check_eligibility(doc: &DbDocument, format: FileFormat) -> Result<(), ApiError> {
    if doc.status() == SignatureStatus::Unsigned {
        return Ok(());
    }
    let stalled = format == FileFormat::Markup
        && doc.signed_file_url.as_deref() == Some(doc.file_url.as_str());
    if stalled {
        Ok(())
    } else {
        Err(ApiError::AlreadySigned)
    }
}

/// Role the signature is recorded under: the request's `signer_role`, else
/// the document's `declared_role`, else "signer".
fn signing_role(req: &SignDocumentRequest, doc: &DbDocument) -> String {
    let requested = req
        .signer_role
        .as_deref()
        .or(doc.declared_role.as_deref())
        .unwrap_or("signer");
    let normalized = normalize_role(requested);
    if normalized.is_empty() {
        "signer".to_string()
    } else {
        normalized
    }
}

fn decode_image(data_url: &str) -> Result<SignatureImage, ApiError> {
    SignatureImage::from_data_url(data_url).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

/// What a markup-filled field records as its rendered value, mirroring
/// what the paginated renderer reports per placement.
fn rendered_value_for(field_type: FieldType, signer_name: &str, signed_at: DateTime<Utc>) -> String {
    match field_type {
        FieldType::Signature => "Signature".to_string(),
        FieldType::Initials => initials_from_name(signer_name),
        FieldType::Date => signed_at.format("%B %-d, %Y").to_string(),
        FieldType::Text => signer_name.to_string(),
    }
}

fn doc_format(doc: &DbDocument, data: &[u8]) -> FileFormat {
    match doc.file_format.as_deref() {
        Some("pdf") => FileFormat::Pdf,
        Some("html") | Some("htm") => FileFormat::Markup,
        _ => FileFormat::detect(&doc.file_url, data),
    }
}

/// Embed the signer's mark and persist the signed copy.
///
/// Everything up to the persistence transaction is read-only: a failure
/// before that point leaves the document exactly as it was.
pub async fn sign_document(
    state: &AppState,
    document_id: &str,
    req: SignDocumentRequest,
    service_key: Option<&str>,
) -> Result<SignDocumentResponse, ApiError> {
    let signer_name = req.typed_name.trim();
    if signer_name.is_empty() {
        return Err(ApiError::InvalidRequest("typed_name is required".to_string()));
    }

    let doc = fetch_document(&state.db, document_id).await?;
    verify_access(
        &doc,
        req.signature_token.as_deref(),
        service_key,
        state.service_key.as_deref(),
    )?;

    let artifact = storage::get(&state.db, &doc.file_url)
        .await?
        .ok_or_else(|| ApiError::SourceMissing(doc.file_url.clone()))?;
    let format = doc_format(&doc, &artifact.data);
    check_eligibility(&doc, format)?;

    let mut fields = doc.parsed_fields().map_err(|e| ApiError::Internal(e.into()))?;
    let anchors = doc.parsed_anchors().map_err(|e| ApiError::Internal(e.into()))?;
    let role = signing_role(&req, &doc);
    let now = Utc::now();

    let (signed_bytes, strategy) = match format {
        FileFormat::Pdf => {
            let mut ctx = EmbedContext::new(signer_name, now)
                .with_request_meta(req.signer_ip.clone(), req.signer_user_agent.clone());
            if let Some(url) = req.signature_data_url.as_deref() {
                ctx = ctx.with_image(decode_image(url)?);
            }

            let plan = resolve(&role, &anchors, &fields, doc.declared_role.as_deref());
            match sigfield_pdf::embed_signature(&artifact.data, &plan, &ctx) {
                Ok(outcome) => {
                    for placement in &outcome.rendered {
                        if let Some(field_id) = &placement.field_id {
                            if let Some(field) = fields.iter_mut().find(|f| &f.id == field_id) {
                                field.mark_rendered(placement.value.clone(), now);
                            }
                        }
                    }
                    (outcome.bytes, None)
                }
                Err(PdfEmbedError::Parse(e)) => {
                    return Err(ApiError::EmbedFailed(format!("Cannot decode source PDF: {}", e)));
                }
                Err(e) => {
                    // Drawing-stage failure: the signed copy is the original
                    // bytes, the signature lives in the audit trail.
                    tracing::warn!(
                        "Embedding failed for {}, keeping original bytes: {}",
                        document_id,
                        e
                    );
                    (artifact.data.clone(), None)
                }
            }
        }
        FileFormat::Markup => {
            let markup = std::str::from_utf8(&artifact.data).map_err(|_| {
                ApiError::EmbedFailed("Markup source is not valid UTF-8".to_string())
            })?;
            let role_fields: Vec<_> = fields
                .iter()
                .filter(|f| role_matches(&role, &f.signer_role, doc.declared_role.as_deref()))
                .cloned()
                .collect();

            let mut ctx = MarkupContext::new(signer_name, now);
            if let Some(url) = req.signature_data_url.as_deref() {
                ctx = ctx.with_image(url);
            }
            if let Some(ip) = req.signer_ip.as_deref() {
                ctx = ctx.with_ip(ip);
            }

            let outcome = sigfield_markup::embed_signature(
                markup,
                &role,
                &role_fields,
                doc.declared_role.as_deref(),
                &ctx,
            );
            for field_id in &outcome.filled_field_ids {
                if let Some(field) = fields.iter_mut().find(|f| &f.id == field_id) {
                    let value = rendered_value_for(field.field_type, signer_name, now);
                    field.mark_rendered(value, now);
                }
            }
            (outcome.markup.into_bytes(), Some(outcome.strategy.to_string()))
        }
    };

    let record_id = insert_signature_record(state, document_id, signer_name, &role, &req, now).await;

    let signed_url = storage::signed_path(document_id, format.ext(), now.timestamp_millis());
    let mut roles = doc.parsed_roles();
    roles.mark_complete(&role);

    let roles_json = serde_json::to_string(&roles).map_err(|e| ApiError::Internal(e.into()))?;
    let fields_json = serde_json::to_string(&fields).map_err(|e| ApiError::Internal(e.into()))?;

    // The signed artifact and the row flip land together or not at all.
    let mut tx = state.db.begin().await?;
    storage::put(&mut *tx, &signed_url, format.content_type(), &signed_bytes).await?;
    sqlx::query(
        r#"
        UPDATE documents
        SET signature_status = 'signed', signed_file_url = ?, signer_roles_json = ?,
            fields_json = ?, signature_token = NULL, signature_token_expires_at = NULL,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&signed_url)
    .bind(&roles_json)
    .bind(&fields_json)
    .bind(now.to_rfc3339())
    .bind(document_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    match &strategy {
        Some(name) => {
            tracing::info!("Signed document {} as {} via {}", document_id, role, name)
        }
        None => tracing::info!("Signed document {} as {}", document_id, role),
    }

    notify_completion(state, &doc).await;

    Ok(SignDocumentResponse {
        success: true,
        document_id: document_id.to_string(),
        signed_file_url: signed_url,
        record_id,
        signer_roles: roles,
        strategy,
    })
}

/// Best-effort audit row; a failure is logged, never fatal to signing.
async fn insert_signature_record(
    state: &AppState,
    document_id: &str,
    signer_name: &str,
    role: &str,
    req: &SignDocumentRequest,
    now: DateTime<Utc>,
) -> Option<String> {
    let id = Uuid::new_v4().to_string();
    let result = sqlx::query(
        r#"
        INSERT INTO signature_records (
            id, document_id, signer_name, signer_role, signer_ip, signer_user_agent, signed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(document_id)
    .bind(signer_name)
    .bind(role)
    .bind(&req.signer_ip)
    .bind(&req.signer_user_agent)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => Some(id),
        Err(e) => {
            tracing::warn!("Failed to write signature record for {}: {}", document_id, e);
            None
        }
    }
}

/// Fire the completion hook once no document under the agreement remains
/// unsigned. Runs after the signing commit; delivery failures are logged
/// and never unwind the signature.
async fn notify_completion(state: &AppState, doc: &DbDocument) {
    let (agreement_id, hook_url) = match (
        doc.agreement_id.as_deref(),
        state.completion_hook_url.as_deref(),
    ) {
        (Some(agreement), Some(url)) => (agreement.to_string(), url.to_string()),
        _ => return,
    };

    match unsigned_siblings(&state.db, &agreement_id).await {
        Ok(0) => {
            let client = state.http.clone();
            let document_id = doc.id.clone();
            tokio::spawn(async move {
                let payload = serde_json::json!({
                    "agreement_id": agreement_id,
                    "document_id": document_id,
                });
                match client.post(&hook_url).json(&payload).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        tracing::warn!(
                            "Completion hook for {} returned {}",
                            agreement_id,
                            resp.status()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Completion hook for {} failed: {}", agreement_id, e);
                    }
                }
            });
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Could not count documents for agreement {}: {}", agreement_id, e);
        }
    }
}

async fn unsigned_siblings(db: &SqlitePool, agreement_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE agreement_id = ? AND signature_status != 'signed'",
    )
    .bind(agreement_id)
    .fetch_one(db)
    .await
}

/// Burn field boxes and captured values into the PDF and make the result
/// the document's working copy.
pub async fn apply_layout(
    state: &AppState,
    document_id: &str,
    req: ApplyLayoutRequest,
) -> Result<ApplyLayoutResponse, ApiError> {
    let doc = fetch_document(&state.db, document_id).await?;
    let artifact = storage::get(&state.db, &doc.file_url)
        .await?
        .ok_or_else(|| ApiError::SourceMissing(doc.file_url.clone()))?;
    let format = doc_format(&doc, &artifact.data);
    if format != FileFormat::Pdf {
        return Err(ApiError::InvalidRequest(
            "Layout apply is only supported for PDF documents".to_string(),
        ));
    }

    let mut fields = doc.parsed_fields().map_err(|e| ApiError::Internal(e.into()))?;
    if fields.is_empty() {
        return Err(ApiError::InvalidRequest("Document has no field layout".to_string()));
    }

    let applied_by = req.applied_by.as_deref().unwrap_or("layout-apply");
    let now = Utc::now();
    let outcome = sigfield_pdf::apply_field_layout(&artifact.data, &mut fields, applied_by, now)
        .map_err(|e| ApiError::EmbedFailed(e.to_string()))?;

    let new_url = storage::layout_path(document_id, now.timestamp_millis());
    let mut roles = doc.parsed_roles();
    for role in &outcome.auto_filled_roles {
        roles.mark_complete(role);
    }

    let fields_json = serde_json::to_string(&fields).map_err(|e| ApiError::Internal(e.into()))?;
    let roles_json = serde_json::to_string(&roles).map_err(|e| ApiError::Internal(e.into()))?;

    let mut tx = state.db.begin().await?;
    storage::put(&mut *tx, &new_url, format.content_type(), &outcome.bytes).await?;
    sqlx::query(
        "UPDATE documents SET file_url = ?, fields_json = ?, signer_roles_json = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&new_url)
    .bind(&fields_json)
    .bind(&roles_json)
    .bind(now.to_rfc3339())
    .bind(document_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Applied {} layout placements to document {}",
        outcome.applied,
        document_id
    );

    Ok(ApplyLayoutResponse {
        success: true,
        file_url: new_url,
        applied: outcome.applied,
        auto_filled_roles: outcome.auto_filled_roles,
    })
}

/// Replace the stored field layout; anchors only change when the request
/// carries them.
pub async fn update_layout(
    state: &AppState,
    document_id: &str,
    req: UpdateLayoutRequest,
) -> Result<UpdateLayoutResponse, ApiError> {
    fetch_document(&state.db, document_id).await?;

    let fields_json =
        serde_json::to_string(&req.fields).map_err(|e| ApiError::Internal(e.into()))?;
    let now = Utc::now().to_rfc3339();

    let anchors = match &req.anchors {
        Some(anchors) => {
            let anchors_json =
                serde_json::to_string(anchors).map_err(|e| ApiError::Internal(e.into()))?;
            sqlx::query(
                "UPDATE documents SET fields_json = ?, anchors_json = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&fields_json)
            .bind(&anchors_json)
            .bind(&now)
            .bind(document_id)
            .execute(&state.db)
            .await?;
            anchors.len()
        }
        None => {
            sqlx::query("UPDATE documents SET fields_json = ?, updated_at = ? WHERE id = ?")
                .bind(&fields_json)
                .bind(&now)
                .bind(document_id)
                .execute(&state.db)
                .await?;
            0
        }
    };

    tracing::info!(
        "Updated layout for document {} ({} fields)",
        document_id,
        req.fields.len()
    );

    Ok(UpdateLayoutResponse {
        success: true,
        fields: req.fields.len(),
        anchors,
    })
}
