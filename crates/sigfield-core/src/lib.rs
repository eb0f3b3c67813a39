//! Signature field layout core
//!
//! This crate provides the layout model (fields, anchors, completion
//! state), the percentage-to-native coordinate transforms, and the
//! role-based placement resolver shared by the PDF and markup embedders.

pub mod coords;
pub mod field;
pub mod resolve;

pub use coords::{
    anchor_box, native_to_percent, percent_to_native, NativeBox, DEFAULT_ANCHOR_HEIGHT,
    DEFAULT_ANCHOR_WIDTH, MIN_BOX_SIZE,
};
pub use field::{
    initials_from_name, normalize_role, parse_anchors, parse_field_layout, Anchor, FieldType,
    LayoutError, PageBounds, SignatureField, SignatureStatus, SignerRoles,
};
pub use resolve::{resolve, role_matches, Placement, PlacementPlan, PlacementTarget};
