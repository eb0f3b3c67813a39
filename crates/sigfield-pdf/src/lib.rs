//! Signature embedding for paginated (PDF) documents
//!
//! Takes a resolved placement plan plus a per-request [`EmbedContext`]
//! and draws into the file with lopdf: white Square annotations mask
//! template placeholder text, FreeText annotations render dates,
//! initials, and names, and captured signature images embed as
//! Flate-compressed RGB XObjects with an SMask alpha channel. Drawing
//! never rewrites existing page content, so the rest of the document
//! survives byte-for-byte semantics.

pub mod context;
mod draw;
pub mod embed;
pub mod error;
pub mod image;

pub use context::EmbedContext;
pub use embed::{
    apply_field_layout, embed_signature, EmbedOutcome, LayoutOutcome, RenderedPlacement,
};
pub use error::PdfEmbedError;
pub use image::SignatureImage;
