//! Data models for the signing API

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigfield_core::{
    parse_anchors, parse_field_layout, Anchor, LayoutError, SignatureField, SignatureStatus,
    SignerRoles,
};
use sqlx::FromRow;

/// Document row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub title: String,
    pub file_url: String,
    pub file_format: Option<String>,
    pub declared_role: Option<String>,
    pub signature_status: String,
    pub signed_file_url: Option<String>,
    pub signer_roles_json: String,
    pub fields_json: String,
    pub anchors_json: String,
    pub signature_token: Option<String>,
    pub signature_token_expires_at: Option<DateTime<Utc>>,
    pub agreement_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbDocument {
    pub fn status(&self) -> SignatureStatus {
        SignatureStatus::parse(&self.signature_status)
    }

    pub fn parsed_fields(&self) -> Result<Vec<SignatureField>, LayoutError> {
        parse_field_layout(&self.fields_json)
    }

    pub fn parsed_anchors(&self) -> Result<BTreeMap<String, Anchor>, LayoutError> {
        parse_anchors(&self.anchors_json)
    }

    pub fn parsed_roles(&self) -> SignerRoles {
        serde_json::from_str(&self.signer_roles_json).unwrap_or_default()
    }
}

/// Request to register a document
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub file_base64: String,
    /// Original file name, used for format detection by suffix.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub declared_role: Option<String>,
    #[serde(default)]
    pub fields: Vec<SignatureField>,
    #[serde(default)]
    pub anchors: BTreeMap<String, Anchor>,
    #[serde(default)]
    pub agreement_id: Option<String>,
    #[serde(default)]
    pub expires_in_hours: Option<i64>,
}

/// Response from document registration. The signing token is returned
/// exactly once, here.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDocumentResponse {
    pub id: String,
    pub file_url: String,
    pub file_format: String,
    pub signing_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Document metadata for API clients. No blob, no token.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub title: String,
    pub file_url: String,
    pub file_format: Option<String>,
    pub declared_role: Option<String>,
    pub signature_status: SignatureStatus,
    pub signed_file_url: Option<String>,
    pub signer_roles: SignerRoles,
    pub fields: Vec<SignatureField>,
    pub anchors: BTreeMap<String, Anchor>,
    pub agreement_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to replace a document's field layout
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLayoutRequest {
    pub fields: Vec<SignatureField>,
    #[serde(default)]
    pub anchors: Option<BTreeMap<String, Anchor>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateLayoutResponse {
    pub success: bool,
    pub fields: usize,
    pub anchors: usize,
}

/// Request for the layout burn-in pass
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyLayoutRequest {
    #[serde(default)]
    pub applied_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyLayoutResponse {
    pub success: bool,
    pub file_url: String,
    pub applied: usize,
    pub auto_filled_roles: Vec<String>,
}

/// Request to sign a document
#[derive(Debug, Clone, Deserialize)]
pub struct SignDocumentRequest {
    pub typed_name: String,
    #[serde(default)]
    pub signer_role: Option<String>,
    /// Captured signature as a `data:image/png;base64,` URL.
    #[serde(default)]
    pub signature_data_url: Option<String>,
    #[serde(default)]
    pub signature_token: Option<String>,
    #[serde(default)]
    pub signer_ip: Option<String>,
    #[serde(default)]
    pub signer_user_agent: Option<String>,
}

/// Response from a completed signing
#[derive(Debug, Clone, Serialize)]
pub struct SignDocumentResponse {
    pub success: bool,
    pub document_id: String,
    pub signed_file_url: String,
    /// Audit row id; null when the best-effort insert failed.
    pub record_id: Option<String>,
    pub signer_roles: SignerRoles,
    /// Markup placement strategy that fired; null for PDF documents.
    pub strategy: Option<String>,
}
