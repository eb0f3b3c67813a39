//! Percentage-space to native coordinate transforms
//!
//! Fields are authored as percentages of the page measured from the
//! top-left (UI convention). The paginated format puts its origin at the
//! bottom-left, so the vertical axis is flipped and offset by the box
//! height: the box's visual top edge lands where the UI intended it.
//! Every output is clamped so nothing draws off-page even for malformed
//! percentages.

use crate::field::{Anchor, PageBounds, SignatureField};

/// Smallest native box dimension a field may shrink to.
pub const MIN_BOX_SIZE: f64 = 10.0;

/// Box size used for anchors that carry no explicit dimensions.
pub const DEFAULT_ANCHOR_WIDTH: f64 = 200.0;
pub const DEFAULT_ANCHOR_HEIGHT: f64 = 48.0;

/// An axis-aligned box in native coordinates (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NativeBox {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi.max(lo))
}

/// Convert a field's percentage box to a native box on the given page.
pub fn percent_to_native(field: &SignatureField, page: PageBounds) -> NativeBox {
    let width = (page.width * (field.width_percent / 100.0))
        .max(MIN_BOX_SIZE)
        .min(page.width);
    let height = (page.height * (field.height_percent / 100.0))
        .max(MIN_BOX_SIZE)
        .min(page.height);

    let raw_x = page.width * (field.x_percent / 100.0);
    let raw_y_top = page.height * (field.y_percent / 100.0);

    let x = clamp(raw_x, 0.0, page.width - width);
    let y = clamp(page.height - raw_y_top - height, 0.0, page.height - height);

    NativeBox {
        x,
        y,
        width,
        height,
    }
}

/// Inverse of [`percent_to_native`] for boxes that did not clamp.
pub fn native_to_percent(bx: &NativeBox, page: PageBounds) -> (f64, f64, f64, f64) {
    let x_percent = bx.x / page.width * 100.0;
    let y_percent = (page.height - bx.y - bx.height) / page.height * 100.0;
    let width_percent = bx.width / page.width * 100.0;
    let height_percent = bx.height / page.height * 100.0;
    (x_percent, y_percent, width_percent, height_percent)
}

/// Derive the drawable box for an anchor. The anchor's `y` is the top of
/// the placement area, so the native origin sits one box height below it.
pub fn anchor_box(anchor: &Anchor, page: PageBounds) -> NativeBox {
    let width = clamp(
        anchor.width.unwrap_or(DEFAULT_ANCHOR_WIDTH),
        MIN_BOX_SIZE,
        page.width,
    );
    let height = clamp(
        anchor.height.unwrap_or(DEFAULT_ANCHOR_HEIGHT),
        MIN_BOX_SIZE,
        page.height,
    );

    let x = clamp(anchor.x, 0.0, page.width - width);
    let y = clamp(anchor.y - height, 0.0, page.height - height);

    NativeBox {
        x,
        y,
        width,
        height,
    }
}
