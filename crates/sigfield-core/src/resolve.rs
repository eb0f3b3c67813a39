//! Role matching and placement planning
//!
//! `resolve` picks the authoritative placements for a signer role: a
//! precomputed anchor wins outright (one placement, no matter how many
//! layout entries carry the role), otherwise every matching field becomes
//! a placement target. An empty plan tells the paginated embedder to fall
//! back to its legacy summary.

use std::collections::BTreeMap;

use crate::field::{normalize_role, Anchor, FieldType, SignatureField};

/// Roles that are always placed by their own explicitly tagged fields.
/// They never participate in the containment heuristic: a generic
/// "officer" field must not capture them, and they must not capture
/// generic fields.
const EXPLICIT_ROLES: &[&str] = &["ceo", "board", "incorporator"];

/// Interchangeable spellings of the same signer role.
const ROLE_SYNONYMS: &[&[&str]] = &[
    &["ceo", "chief executive officer"],
    &["cfo", "chief financial officer"],
    &["coo", "chief operating officer"],
    &["cto", "chief technology officer"],
    &["board", "board of directors", "director"],
    &["incorporator", "founder"],
    &["secretary", "corporate secretary"],
];

fn same_synonym_set(a: &str, b: &str) -> bool {
    ROLE_SYNONYMS
        .iter()
        .any(|set| set.contains(&a) && set.contains(&b))
}

/// Decide whether a field authored for `candidate` should be completed by
/// a signer acting as `requested` on a document declared for
/// `declared_role`.
///
/// Ordered rules: exact match after normalization, then known synonym
/// sets, then substring containment against the document's declared role
/// (the requested role stands in when none is declared). Explicit roles
/// never match by containment.
pub fn role_matches(requested: &str, candidate: &str, declared_role: Option<&str>) -> bool {
    let requested = normalize_role(requested);
    let candidate = normalize_role(candidate);
    if requested.is_empty() || candidate.is_empty() {
        return false;
    }
    if requested == candidate {
        return true;
    }
    if same_synonym_set(&requested, &candidate) {
        return true;
    }
    if EXPLICIT_ROLES.contains(&requested.as_str()) || EXPLICIT_ROLES.contains(&candidate.as_str())
    {
        return false;
    }

    let declared = declared_role
        .map(normalize_role)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| requested.clone());
    declared.contains(candidate.as_str()) || candidate.contains(declared.as_str())
}

/// Where one placement draws from.
#[derive(Debug, Clone)]
pub enum PlacementTarget {
    Anchor(Anchor),
    Field(SignatureField),
}

/// One spot where the signer's mark lands.
#[derive(Debug, Clone)]
pub struct Placement {
    pub page_number: u32,
    pub field_type: FieldType,
    /// Present for field-backed placements; anchors have no layout entry.
    pub field_id: Option<String>,
    pub target: PlacementTarget,
}

/// Every placement resolved for one signing request.
#[derive(Debug, Clone)]
pub struct PlacementPlan {
    pub role: String,
    pub placements: Vec<Placement>,
}

impl PlacementPlan {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }
}

/// Resolve the placements for `role`, preferring an anchor over layout
/// entries.
pub fn resolve(
    role: &str,
    anchors: &BTreeMap<String, Anchor>,
    fields: &[SignatureField],
    declared_role: Option<&str>,
) -> PlacementPlan {
    let normalized = normalize_role(role);

    let anchor = anchors
        .iter()
        .find(|(key, _)| normalize_role(key) == normalized)
        .map(|(_, anchor)| anchor.clone());
    if let Some(anchor) = anchor {
        return PlacementPlan {
            role: normalized,
            placements: vec![Placement {
                page_number: anchor.page,
                field_type: FieldType::Signature,
                field_id: None,
                target: PlacementTarget::Anchor(anchor),
            }],
        };
    }

    let placements = fields
        .iter()
        .filter(|field| role_matches(&normalized, &field.signer_role, declared_role))
        .map(|field| Placement {
            page_number: field.page_number,
            field_type: field.field_type,
            field_id: Some(field.id.clone()),
            target: PlacementTarget::Field(field.clone()),
        })
        .collect();

    PlacementPlan {
        role: normalized,
        placements,
    }
}
