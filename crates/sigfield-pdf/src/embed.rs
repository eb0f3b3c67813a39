//! Apply resolved placements to PDF documents

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId};
use sigfield_core::{
    anchor_box, initials_from_name, normalize_role, percent_to_native, FieldType, NativeBox,
    Placement, PlacementPlan, PlacementTarget, SignatureField,
};

use crate::context::EmbedContext;
use crate::draw;
use crate::error::PdfEmbedError;
use crate::image::SignatureImage;

/// Generated templates print a one-line marker where an anchor points;
/// only that line gets masked, not the whole reserved area.
const TAG_LINE_HEIGHT: f64 = 18.0;
const BOX_PADDING: f64 = 4.0;
/// Share of a signature box reserved for the drawn mark.
const IMAGE_AREA_RATIO: f64 = 0.66;
const IMAGE_MAX_HEIGHT_RATIO: f64 = 0.82;
/// Share of the box taken by the certification stamp on the right.
const STAMP_WIDTH_RATIO: f64 = 0.26;
const STAMP_CORNER_RADIUS: f64 = 3.0;
const STAMP_LABEL: &str = "Electronically Signed";
const BORDER_GRAY: f32 = 0.62;
const TEXT_COLOR: (f32, f32, f32) = (0.1, 0.1, 0.1);
const MUTED_COLOR: (f32, f32, f32) = (0.35, 0.35, 0.35);
const XOBJECT_NAME: &str = "SigFieldImg";

// Burn-in sizing for the field layout pass.
const LAYOUT_IMAGE_WIDTH_RATIO: f64 = 0.88;
const LAYOUT_IMAGE_MAX_HEIGHT_RATIO: f64 = 0.65;
const LAYOUT_IMAGE_LIFT_RATIO: f64 = 0.08;

/// A value drawn into one placement, reported back so the caller can
/// update field state next to the signed file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPlacement {
    pub field_id: Option<String>,
    pub value: String,
}

#[derive(Debug)]
pub struct EmbedOutcome {
    pub bytes: Vec<u8>,
    pub rendered: Vec<RenderedPlacement>,
}

#[derive(Debug)]
pub struct LayoutOutcome {
    pub bytes: Vec<u8>,
    /// Normalized roles whose fields were filled during the pass.
    pub auto_filled_roles: Vec<String>,
    pub applied: usize,
}

/// Draw every placement in the plan into the document. An empty plan
/// falls back to an audit summary on the last page so the signed copy
/// always shows who signed it.
pub fn embed_signature(
    pdf_bytes: &[u8],
    plan: &PlacementPlan,
    ctx: &EmbedContext,
) -> Result<EmbedOutcome, PdfEmbedError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| PdfEmbedError::Parse(e.to_string()))?;
    let page_ids = collect_pages(&mut doc)?;

    let image_id = match &ctx.signature_image {
        Some(image) if wants_image(plan) => Some(image.add_to_document(&mut doc)?),
        _ => None,
    };

    let mut rendered = Vec::new();
    if plan.is_empty() {
        let last_page = page_ids[page_ids.len() - 1];
        rendered.push(draw_legacy_summary(&mut doc, last_page, ctx, image_id)?);
    } else {
        for placement in &plan.placements {
            if let Some(entry) = draw_placement(&mut doc, &page_ids, placement, ctx, image_id)? {
                rendered.push(entry);
            }
        }
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| PdfEmbedError::Save(e.to_string()))?;
    Ok(EmbedOutcome { bytes, rendered })
}

/// Burn field outlines, labels, and any captured values into the
/// document. Fields that draw successfully are marked auto-filled.
pub fn apply_field_layout(
    pdf_bytes: &[u8],
    fields: &mut [SignatureField],
    applied_by: &str,
    now: DateTime<Utc>,
) -> Result<LayoutOutcome, PdfEmbedError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| PdfEmbedError::Parse(e.to_string()))?;
    let page_ids = collect_pages(&mut doc)?;

    let mut auto_filled = BTreeSet::new();
    let mut applied = 0usize;

    for (index, field) in fields.iter_mut().enumerate() {
        let page_id = page_for(&page_ids, field.page_number);
        let page = draw::page_bounds(&doc, page_id);
        let bx = percent_to_native(field, page);

        draw::add_border_annotation(&mut doc, page_id, &bx, BORDER_GRAY)?;
        if let Some(label) = field.label.clone() {
            let label_box = NativeBox {
                x: bx.x,
                y: (bx.top() + 2.0).min(page.height - 10.0),
                width: bx.width,
                height: 10.0,
            };
            draw::add_text_annotation(
                &mut doc,
                page_id,
                &label_box,
                &label,
                7.0,
                MUTED_COLOR,
                false,
            )?;
        }

        match field.field_type {
            FieldType::Signature => {
                let data_url = match field.signature_data_url.clone() {
                    Some(url) => url,
                    None => continue,
                };
                // A bad capture skips its field rather than failing
                // the whole pass.
                let image = match SignatureImage::from_data_url(&data_url) {
                    Ok(image) => image,
                    Err(_) => continue,
                };
                let image_id = image.add_to_document(&mut doc)?;

                let mut draw_w = bx.width * LAYOUT_IMAGE_WIDTH_RATIO;
                let mut draw_h = draw_w / image.aspect_ratio();
                let max_h = bx.height * LAYOUT_IMAGE_MAX_HEIGHT_RATIO;
                if draw_h > max_h {
                    draw_h = max_h;
                    draw_w = draw_h * image.aspect_ratio();
                }
                let image_x = bx.x + (bx.width - draw_w) / 2.0;
                let image_y =
                    bx.y + (bx.height - draw_h) / 2.0 + bx.height * LAYOUT_IMAGE_LIFT_RATIO;

                let name = format!("SigImg{}", index);
                draw::register_image(&mut doc, page_id, &name, image_id)?;
                draw::append_content(
                    &mut doc,
                    page_id,
                    draw::image_ops(&name, image_x, image_y, draw_w, draw_h),
                )?;

                field.mark_auto_filled("Signature", applied_by, now);
                auto_filled.insert(normalize_role(&field.signer_role));
                applied += 1;
            }
            _ => {
                let value = match field.rendered_value.clone() {
                    Some(value) => value,
                    None => continue,
                };
                draw_centered_value(&mut doc, page_id, &bx, &value, 11.0)?;
                if !field.auto_filled {
                    field.mark_auto_filled(value, applied_by, now);
                }
                auto_filled.insert(normalize_role(&field.signer_role));
                applied += 1;
            }
        }
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| PdfEmbedError::Save(e.to_string()))?;
    Ok(LayoutOutcome {
        bytes,
        auto_filled_roles: auto_filled.into_iter().collect(),
        applied,
    })
}

fn wants_image(plan: &PlacementPlan) -> bool {
    plan.is_empty()
        || plan
            .placements
            .iter()
            .any(|p| p.field_type == FieldType::Signature)
}

/// Page numbers are 1-based; out-of-range placements land on the last
/// page instead of being dropped.
fn page_for(page_ids: &[ObjectId], page_number: u32) -> ObjectId {
    let index = (page_number.max(1) as usize - 1).min(page_ids.len() - 1);
    page_ids[index]
}

fn collect_pages(doc: &mut Document) -> Result<Vec<ObjectId>, PdfEmbedError> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if !pages.is_empty() {
        return Ok(pages);
    }

    // A file with no pages still needs a surface to sign on.
    let pages_id = {
        let catalog = doc
            .catalog()
            .map_err(|e| PdfEmbedError::Parse(e.to_string()))?;
        catalog
            .get(b"Pages")
            .and_then(|obj| obj.as_reference())
            .map_err(|e| PdfEmbedError::Parse(e.to_string()))?
    };

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]),
    );
    let page_id = doc.add_object(Object::Dictionary(page));

    let pages_dict = doc
        .get_object_mut(pages_id)
        .and_then(|obj| obj.as_dict_mut())
        .map_err(|e| PdfEmbedError::Parse(e.to_string()))?;
    if let Ok(Object::Array(ref mut kids)) = pages_dict.get_mut(b"Kids") {
        kids.push(Object::Reference(page_id));
    } else {
        pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    }
    let count = pages_dict
        .get(b"Count")
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    pages_dict.set("Count", Object::Integer(count + 1));

    Ok(vec![page_id])
}

fn draw_placement(
    doc: &mut Document,
    page_ids: &[ObjectId],
    placement: &Placement,
    ctx: &EmbedContext,
    image_id: Option<ObjectId>,
) -> Result<Option<RenderedPlacement>, PdfEmbedError> {
    let page_id = page_for(page_ids, placement.page_number);
    let page = draw::page_bounds(doc, page_id);

    let (bx, is_anchor) = match &placement.target {
        PlacementTarget::Anchor(anchor) => (anchor_box(anchor, page), true),
        PlacementTarget::Field(field) => (percent_to_native(field, page), false),
    };

    // Anchors cover only the marker line at the top of the reserved
    // area; fields mask their whole box and get a visible border.
    if is_anchor {
        let line = TAG_LINE_HEIGHT.min(bx.height);
        let mask = NativeBox {
            x: bx.x,
            y: bx.top() - line,
            width: bx.width,
            height: line,
        };
        draw::add_cover_annotation(doc, page_id, &mask)?;
    } else {
        draw::add_cover_annotation(doc, page_id, &bx)?;
        draw::add_border_annotation(doc, page_id, &bx, BORDER_GRAY)?;
    }

    let value = match placement.field_type {
        FieldType::Signature => draw_signature_mark(doc, page_id, &bx, ctx, image_id)?,
        FieldType::Initials => {
            let text = initials_from_name(&ctx.signer_name);
            draw_centered_value(doc, page_id, &bx, &text, 16.0)?;
            Some(text)
        }
        FieldType::Date => {
            let text = ctx.date_line();
            draw_centered_value(doc, page_id, &bx, &text, 11.0)?;
            Some(text)
        }
        FieldType::Text => {
            let text = ctx.signer_name.clone();
            draw_centered_value(doc, page_id, &bx, &text, 11.0)?;
            Some(text)
        }
    };

    Ok(value.map(|value| RenderedPlacement {
        field_id: placement.field_id.clone(),
        value,
    }))
}

fn draw_signature_mark(
    doc: &mut Document,
    page_id: ObjectId,
    bx: &NativeBox,
    ctx: &EmbedContext,
    image_id: Option<ObjectId>,
) -> Result<Option<String>, PdfEmbedError> {
    let (image, image_id) = match (&ctx.signature_image, image_id) {
        (Some(image), Some(id)) => (image, id),
        // No captured mark: the masked box stays blank.
        _ => return Ok(None),
    };

    let avail_w = (bx.width * IMAGE_AREA_RATIO - BOX_PADDING).max(1.0);
    let avail_h = (bx.height * IMAGE_MAX_HEIGHT_RATIO).max(1.0);
    let mut draw_w = avail_w;
    let mut draw_h = draw_w / image.aspect_ratio();
    if draw_h > avail_h {
        draw_h = avail_h;
        draw_w = draw_h * image.aspect_ratio();
    }
    let image_x = bx.x + BOX_PADDING;
    let image_y = bx.y + (bx.height - draw_h) / 2.0;

    draw::register_image(doc, page_id, XOBJECT_NAME, image_id)?;
    draw::append_content(
        doc,
        page_id,
        draw::image_ops(XOBJECT_NAME, image_x, image_y, draw_w, draw_h),
    )?;

    // Certification stamp along the right edge of the box, rounded corners
    let stamp_w = bx.width * STAMP_WIDTH_RATIO;
    let stamp_h = (bx.height * 0.5).clamp(12.0, 22.0).min(bx.height);
    let stamp_x = bx.right() - stamp_w - BOX_PADDING;
    let stamp_y = bx.y + (bx.height - stamp_h) / 2.0;
    draw::append_content(
        doc,
        page_id,
        draw::rounded_rect_ops(stamp_x, stamp_y, stamp_w, stamp_h, STAMP_CORNER_RADIUS, 0.92),
    )?;
    let stamp_box = NativeBox {
        x: stamp_x,
        y: stamp_y,
        width: stamp_w,
        height: stamp_h,
    };
    draw::add_text_annotation(doc, page_id, &stamp_box, STAMP_LABEL, 6.5, MUTED_COLOR, true)?;

    Ok(Some("Signature".to_string()))
}

fn draw_centered_value(
    doc: &mut Document,
    page_id: ObjectId,
    bx: &NativeBox,
    text: &str,
    max_font: f64,
) -> Result<(), PdfEmbedError> {
    let font_size = max_font.min(bx.height * 0.6).max(6.0);
    draw::add_text_annotation(doc, page_id, bx, text, font_size, TEXT_COLOR, true)
}

/// Audit block at the bottom of the last page, used when no field or
/// anchor matched the signer's role.
fn draw_legacy_summary(
    doc: &mut Document,
    page_id: ObjectId,
    ctx: &EmbedContext,
    image_id: Option<ObjectId>,
) -> Result<RenderedPlacement, PdfEmbedError> {
    let page = draw::page_bounds(doc, page_id);
    let left = 36.0;
    let width = page.width - 72.0;

    let mut lines = vec![
        format!("Signed by {}", ctx.signer_name),
        format!("Signed at {}", ctx.timestamp_line()),
    ];
    if let Some(ip) = &ctx.signer_ip {
        lines.push(format!("IP: {}", ip));
    }
    if let Some(agent) = &ctx.signer_user_agent {
        lines.push(format!("Agent: {}", agent));
    }

    // Stack upward from the bottom margin, name on top.
    let mut y = 36.0;
    for line in lines.iter().rev() {
        let line_box = NativeBox {
            x: left,
            y,
            width,
            height: 12.0,
        };
        draw::add_text_annotation(doc, page_id, &line_box, line, 9.0, MUTED_COLOR, false)?;
        y += 14.0;
    }

    if let (Some(image), Some(image_id)) = (&ctx.signature_image, image_id) {
        let mut draw_w = 180.0_f64.min(width);
        let mut draw_h = draw_w / image.aspect_ratio();
        if draw_h > 60.0 {
            draw_h = 60.0;
            draw_w = draw_h * image.aspect_ratio();
        }
        draw::register_image(doc, page_id, XOBJECT_NAME, image_id)?;
        draw::append_content(
            doc,
            page_id,
            draw::image_ops(XOBJECT_NAME, left, y + 6.0, draw_w, draw_h),
        )?;
    }

    Ok(RenderedPlacement {
        field_id: None,
        value: format!("Signed by {}", ctx.signer_name),
    })
}
