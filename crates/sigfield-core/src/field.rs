//! Layout model: fields, anchors, and completion state

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a field renders when its signer completes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Signature,
    #[serde(alias = "initial")]
    Initials,
    Date,
    #[serde(alias = "name")]
    Text,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Signature => write!(f, "signature"),
            FieldType::Initials => write!(f, "initials"),
            FieldType::Date => write!(f, "date"),
            FieldType::Text => write!(f, "text"),
        }
    }
}

/// One placeable element of a document's field layout.
///
/// Positions are percentages of the page (0-100), measured from the page's
/// top-left corner in UI convention. `page_number` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureField {
    pub id: String,
    pub field_type: FieldType,
    pub signer_role: String,
    pub page_number: u32,
    pub x_percent: f64,
    pub y_percent: f64,
    pub width_percent: f64,
    pub height_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub auto_filled: bool,
    /// Human-readable content actually placed at embedding time, kept for
    /// the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    /// Pre-captured image for this field as a data URL, consumed by the
    /// layout-apply pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_filled_by: Option<String>,
}

impl SignatureField {
    /// Record what was placed into this field during signing.
    pub fn mark_rendered(&mut self, value: impl Into<String>, at: DateTime<Utc>) {
        self.rendered_value = Some(value.into());
        self.signed_at = Some(at);
    }

    /// Record a value placed by the layout-apply pass rather than a signer.
    pub fn mark_auto_filled(&mut self, value: impl Into<String>, by: &str, at: DateTime<Utc>) {
        self.rendered_value = Some(value.into());
        self.signed_at = Some(at);
        self.auto_filled = true;
        self.auto_filled_by = Some(by.to_string());
    }
}

/// A precomputed, authoritative placement for one signer role.
///
/// Coordinates are native (PDF points). `y` marks the *top* of the
/// placement area; drawing code subtracts the content height to find the
/// native origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Document completion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    Unsigned,
    Signed,
}

impl SignatureStatus {
    /// Parse a stored status string, defaulting to `Unsigned` for anything
    /// unrecognized.
    pub fn parse(s: &str) -> Self {
        match s {
            "signed" => SignatureStatus::Signed,
            _ => SignatureStatus::Unsigned,
        }
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureStatus::Unsigned => write!(f, "unsigned"),
            SignatureStatus::Signed => write!(f, "signed"),
        }
    }
}

/// Map of signer role to completion flag. Roles are normalized on insert;
/// marking one role complete never clears the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerRoles(pub BTreeMap<String, bool>);

impl SignerRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_complete(&mut self, role: &str) {
        self.0.insert(normalize_role(role), true);
    }

    pub fn is_complete(&self, role: &str) -> bool {
        self.0.get(&normalize_role(role)).copied().unwrap_or(false)
    }

    pub fn all_complete<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        required.into_iter().all(|role| self.is_complete(role))
    }

    pub fn completed_roles(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, done)| **done)
            .map(|(role, _)| role.as_str())
    }
}

/// Page dimensions in native units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBounds {
    pub width: f64,
    pub height: f64,
}

impl PageBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }

    pub fn a4() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
        }
    }
}

/// Lowercase, whitespace-trimmed form used for all role comparisons.
pub fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}

/// Initials for an Initials field: first letter of each whitespace-separated
/// token of the display name, at most three, uppercased.
pub fn initials_from_name(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|token| token.chars().next())
        .take(3)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Malformed stored layout JSON
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Invalid field layout: {0}")]
    Fields(serde_json::Error),
    #[error("Invalid anchors: {0}")]
    Anchors(serde_json::Error),
}

/// Parse a stored field-layout JSON array. An empty or absent value is an
/// empty layout, not an error.
pub fn parse_field_layout(json: &str) -> Result<Vec<SignatureField>, LayoutError> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(LayoutError::Fields)
}

/// Parse a stored anchors map (role -> anchor).
pub fn parse_anchors(json: &str) -> Result<BTreeMap<String, Anchor>, LayoutError> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(trimmed).map_err(LayoutError::Anchors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initials_basic() {
        assert_eq!(initials_from_name("Avery Chen"), "AC");
        assert_eq!(initials_from_name("mary jane watson"), "MJW");
    }

    #[test]
    fn test_initials_caps_at_three_tokens() {
        assert_eq!(initials_from_name("a b c d e"), "ABC");
    }

    #[test]
    fn test_initials_empty_and_whitespace() {
        assert_eq!(initials_from_name(""), "");
        assert_eq!(initials_from_name("   "), "");
        assert_eq!(initials_from_name("  solo  "), "S");
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("  CEO "), "ceo");
        assert_eq!(normalize_role("Board of Directors"), "board of directors");
    }

    #[test]
    fn test_signer_roles_merge_preserves_existing() {
        let mut roles = SignerRoles::new();
        roles.mark_complete("officer");
        roles.mark_complete("Board");

        assert!(roles.is_complete("officer"));
        assert!(roles.is_complete("board"));
        assert_eq!(roles.completed_roles().count(), 2);
    }

    #[test]
    fn test_signer_roles_all_complete() {
        let mut roles = SignerRoles::new();
        roles.mark_complete("ceo");
        assert!(roles.all_complete(["ceo"]));
        assert!(!roles.all_complete(["ceo", "board"]));
        roles.mark_complete("board");
        assert!(roles.all_complete(["ceo", "board"]));
    }

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!(SignatureStatus::parse("signed"), SignatureStatus::Signed);
        assert_eq!(SignatureStatus::parse("unsigned"), SignatureStatus::Unsigned);
        assert_eq!(SignatureStatus::parse("garbage"), SignatureStatus::Unsigned);
        assert_eq!(SignatureStatus::Signed.to_string(), "signed");
    }

    #[test]
    fn test_field_layout_accepts_editor_shape() {
        // Shape produced by the layout editor, including alias field types
        // and optional audit fields.
        let json = r#"[
            {
                "id": "f-1",
                "field_type": "signature",
                "signer_role": "CEO",
                "page_number": 1,
                "x_percent": 40.0,
                "y_percent": 70.0,
                "width_percent": 30.0,
                "height_percent": 14.0,
                "label": "CEO signature",
                "required": true
            },
            {
                "id": "f-2",
                "field_type": "initial",
                "signer_role": "board",
                "page_number": 2,
                "x_percent": 10,
                "y_percent": 20,
                "width_percent": 8,
                "height_percent": 4
            }
        ]"#;

        let fields = parse_field_layout(json).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_type, FieldType::Signature);
        assert!(fields[0].required);
        assert_eq!(fields[1].field_type, FieldType::Initials);
        assert!(!fields[1].required);
        assert!(fields[1].rendered_value.is_none());
    }

    #[test]
    fn test_field_layout_empty_inputs() {
        assert!(parse_field_layout("").unwrap().is_empty());
        assert!(parse_field_layout("null").unwrap().is_empty());
        assert!(parse_field_layout("[]").unwrap().is_empty());
        assert!(parse_field_layout("{bad").is_err());
    }

    #[test]
    fn test_anchors_parse() {
        let json = r#"{"ceo": {"page": 1, "x": 100.0, "y": 700.0, "width": 220.0}}"#;
        let anchors = parse_anchors(json).unwrap();
        let anchor = anchors.get("ceo").unwrap();
        assert_eq!(anchor.page, 1);
        assert_eq!(anchor.width, Some(220.0));
        assert_eq!(anchor.height, None);
        assert!(parse_anchors("").unwrap().is_empty());
    }

    #[test]
    fn test_field_serialization_skips_empty_audit_fields() {
        let field = SignatureField {
            id: "f-1".to_string(),
            field_type: FieldType::Date,
            signer_role: "ceo".to_string(),
            page_number: 1,
            x_percent: 10.0,
            y_percent: 10.0,
            width_percent: 20.0,
            height_percent: 5.0,
            label: None,
            required: false,
            auto_filled: false,
            rendered_value: None,
            signed_at: None,
            signature_data_url: None,
            auto_filled_by: None,
        };
        let json = serde_json::to_string(&field).unwrap();
        assert!(!json.contains("rendered_value"));
        assert!(!json.contains("signature_data_url"));
        assert!(json.contains("\"field_type\":\"date\""));
    }

    #[test]
    fn test_mark_rendered() {
        let mut field = SignatureField {
            id: "f-1".to_string(),
            field_type: FieldType::Text,
            signer_role: "officer".to_string(),
            page_number: 1,
            x_percent: 10.0,
            y_percent: 10.0,
            width_percent: 20.0,
            height_percent: 5.0,
            label: None,
            required: false,
            auto_filled: false,
            rendered_value: None,
            signed_at: None,
            signature_data_url: None,
            auto_filled_by: None,
        };
        let now = Utc::now();
        field.mark_rendered("Avery Chen", now);
        assert_eq!(field.rendered_value.as_deref(), Some("Avery Chen"));
        assert_eq!(field.signed_at, Some(now));
        assert!(!field.auto_filled);

        field.mark_auto_filled("Avery Chen", "layout-apply", now);
        assert!(field.auto_filled);
        assert_eq!(field.auto_filled_by.as_deref(), Some("layout-apply"));
    }
}
