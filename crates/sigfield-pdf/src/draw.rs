//! Low-level page drawing: annotation dictionaries, content-stream
//! operators, and resource registration.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use sigfield_core::{NativeBox, PageBounds};

use crate::error::PdfEmbedError;

pub(crate) const FONT_NAME: &str = "Helvetica";

fn rect_array(bx: &NativeBox) -> Object {
    Object::Array(vec![
        Object::Real(bx.x as f32),
        Object::Real(bx.y as f32),
        Object::Real(bx.right() as f32),
        Object::Real(bx.top() as f32),
    ])
}

/// Add an opaque white square that masks whatever the template printed
/// underneath the signing area.
pub(crate) fn add_cover_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    bx: &NativeBox,
) -> Result<(), PdfEmbedError> {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Square".to_vec()));
    annot.set("Rect", rect_array(bx));
    // White fill (IC = Interior Color)
    annot.set(
        "IC",
        Object::Array(vec![
            Object::Real(1.0),
            Object::Real(1.0),
            Object::Real(1.0),
        ]),
    );
    // White border (C = Color)
    annot.set(
        "C",
        Object::Array(vec![
            Object::Real(1.0),
            Object::Real(1.0),
            Object::Real(1.0),
        ]),
    );
    // No border width
    let mut bs = Dictionary::new();
    bs.set("W", Object::Integer(0));
    annot.set("BS", Object::Dictionary(bs));
    // Print flag
    annot.set("F", Object::Integer(4));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, annot_id)
}

/// Add a thin gray outline around a field box. Interior stays
/// transparent so underlying content shows through.
pub(crate) fn add_border_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    bx: &NativeBox,
    gray: f32,
) -> Result<(), PdfEmbedError> {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Square".to_vec()));
    annot.set("Rect", rect_array(bx));
    annot.set(
        "C",
        Object::Array(vec![
            Object::Real(gray),
            Object::Real(gray),
            Object::Real(gray),
        ]),
    );
    let mut bs = Dictionary::new();
    bs.set("W", Object::Integer(1));
    annot.set("BS", Object::Dictionary(bs));
    annot.set("F", Object::Integer(4));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, annot_id)
}

pub(crate) fn add_text_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    bx: &NativeBox,
    text: &str,
    font_size: f64,
    color: (f32, f32, f32),
    centered: bool,
) -> Result<(), PdfEmbedError> {
    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"FreeText".to_vec()));
    annot.set("Rect", rect_array(bx));
    annot.set(
        "Contents",
        Object::String(text.as_bytes().to_vec(), lopdf::StringFormat::Literal),
    );

    // Default appearance carrying font and fill color
    let da = format!(
        "/{} {} Tf {} {} {} rg",
        FONT_NAME, font_size, color.0, color.1, color.2
    );
    annot.set(
        "DA",
        Object::String(da.into_bytes(), lopdf::StringFormat::Literal),
    );

    if centered {
        // Quadding: 1 = centered
        annot.set("Q", Object::Integer(1));
    }
    annot.set(
        "Border",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );
    annot.set("F", Object::Integer(4));

    let annot_id = doc.add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, annot_id)
}

fn add_annotation_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), PdfEmbedError> {
    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;

    if let Object::Dictionary(ref mut page_dict) = page {
        if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
            arr.push(Object::Reference(annot_id));
        } else {
            page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
        }
    }
    Ok(())
}

/// Append painting operators as a fresh stream after the existing page
/// content, preserving whatever /Contents shape the file already uses.
pub(crate) fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    ops: String,
) -> Result<(), PdfEmbedError> {
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

    let existing = {
        let page = doc
            .get_object(page_id)
            .and_then(|obj| obj.as_dict())
            .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;
        page.get(b"Contents").ok().cloned()
    };

    let mut contents = match existing {
        Some(Object::Array(items)) => items,
        Some(Object::Reference(id)) => vec![Object::Reference(id)],
        Some(stream @ Object::Stream(_)) => {
            // Inline stream gets promoted to an indirect object
            let id = doc.add_object(stream);
            vec![Object::Reference(id)]
        }
        _ => Vec::new(),
    };
    contents.push(Object::Reference(stream_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(|obj| obj.as_dict_mut())
        .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

fn set_xobject_entry(resources: &mut Dictionary, name: &str, image_id: ObjectId) {
    if resources
        .get(b"XObject")
        .map_or(true, |obj| obj.as_dict().is_err())
    {
        resources.set("XObject", Object::Dictionary(Dictionary::new()));
    }
    if let Ok(xobjects) = resources
        .get_mut(b"XObject")
        .and_then(|obj| obj.as_dict_mut())
    {
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
    }
}

/// Make an image XObject addressable from the page's content stream.
/// Handles both inline and indirect /Resources dictionaries.
pub(crate) fn register_image(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    image_id: ObjectId,
) -> Result<(), PdfEmbedError> {
    let indirect_resources = {
        let page = doc
            .get_object(page_id)
            .and_then(|obj| obj.as_dict())
            .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        }
    };

    if let Some(resources_id) = indirect_resources {
        let resources = doc
            .get_object_mut(resources_id)
            .and_then(|obj| obj.as_dict_mut())
            .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;
        set_xobject_entry(resources, name, image_id);
        return Ok(());
    }

    let page = doc
        .get_object_mut(page_id)
        .and_then(|obj| obj.as_dict_mut())
        .map_err(|e| PdfEmbedError::Draw(e.to_string()))?;
    if page
        .get(b"Resources")
        .map_or(true, |obj| obj.as_dict().is_err())
    {
        page.set("Resources", Object::Dictionary(Dictionary::new()));
    }
    if let Ok(resources) = page
        .get_mut(b"Resources")
        .and_then(|obj| obj.as_dict_mut())
    {
        set_xobject_entry(resources, name, image_id);
    }
    Ok(())
}

/// Operators that paint a registered image XObject into the given box.
pub(crate) fn image_ops(name: &str, x: f64, y: f64, width: f64, height: f64) -> String {
    format!(
        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/{} Do\nQ\n",
        width, height, x, y, name
    )
}

/// Bezier control-point offset that approximates a quarter circle.
const CORNER_K: f64 = 0.5523;

/// Operators that fill a rounded rectangle with a flat gray. The corner
/// radius clamps to half the box so thin stamps stay well formed.
pub(crate) fn rounded_rect_ops(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    radius: f64,
    gray: f64,
) -> String {
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    let k = r * CORNER_K;
    let right = x + width;
    let top = y + height;

    let mut ops = format!("q\n{:.2} {:.2} {:.2} rg\n", gray, gray, gray);
    // Bottom edge first, then one curve per corner.
    ops.push_str(&format!("{:.2} {:.2} m\n", x + r, y));
    ops.push_str(&format!("{:.2} {:.2} l\n", right - r, y));
    ops.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        right - r + k,
        y,
        right,
        y + r - k,
        right,
        y + r
    ));
    ops.push_str(&format!("{:.2} {:.2} l\n", right, top - r));
    ops.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        right,
        top - r + k,
        right - r + k,
        top,
        right - r,
        top
    ));
    ops.push_str(&format!("{:.2} {:.2} l\n", x + r, top));
    ops.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x + r - k,
        top,
        x,
        top - r + k,
        x,
        top - r
    ));
    ops.push_str(&format!("{:.2} {:.2} l\n", x, y + r));
    ops.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x,
        y + r - k,
        x + r - k,
        y,
        x + r,
        y
    ));
    ops.push_str("f\nQ\n");
    ops
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn media_box_bounds(doc: &Document, obj: &Object) -> Option<PageBounds> {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let array = resolved.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let nums: Vec<f64> = array.iter().filter_map(number).collect();
    if nums.len() != 4 {
        return None;
    }
    let width = nums[2] - nums[0];
    let height = nums[3] - nums[1];
    if width.is_finite() && height.is_finite() && width > 1.0 && height > 1.0 {
        Some(PageBounds::new(width, height))
    } else {
        None
    }
}

/// Read the page's MediaBox, walking the Parent chain for inherited
/// boxes. Falls back to US Letter when the file declares none.
pub(crate) fn page_bounds(doc: &Document, page_id: ObjectId) -> PageBounds {
    let mut current = Some(page_id);
    for _ in 0..8 {
        let id = match current {
            Some(id) => id,
            None => break,
        };
        let dict = match doc.get_object(id).and_then(|obj| obj.as_dict()) {
            Ok(dict) => dict,
            Err(_) => break,
        };
        if let Ok(media_box) = dict.get(b"MediaBox") {
            if let Some(bounds) = media_box_bounds(doc, media_box) {
                return bounds;
            }
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok());
    }
    PageBounds::letter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn test_doc() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        });
        if let Ok(page) = doc.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, page_id)
    }

    fn sample_box() -> NativeBox {
        NativeBox {
            x: 50.0,
            y: 100.0,
            width: 200.0,
            height: 48.0,
        }
    }

    fn page_annotations(doc: &Document, page_id: ObjectId) -> Vec<Dictionary> {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let annots = match page.get(b"Annots") {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => return Vec::new(),
        };
        annots
            .iter()
            .filter_map(|obj| obj.as_reference().ok())
            .filter_map(|id| doc.get_object(id).ok())
            .filter_map(|obj| obj.as_dict().ok().cloned())
            .collect()
    }

    #[test]
    fn cover_annotation_is_white_square() {
        let (mut doc, page_id) = test_doc();
        add_cover_annotation(&mut doc, page_id, &sample_box()).unwrap();

        let annots = page_annotations(&doc, page_id);
        assert_eq!(annots.len(), 1);
        let annot = &annots[0];
        assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap(), b"Square");
        assert!(annot.get(b"IC").is_ok());
    }

    #[test]
    fn border_annotation_has_no_interior_color() {
        let (mut doc, page_id) = test_doc();
        add_border_annotation(&mut doc, page_id, &sample_box(), 0.6).unwrap();

        let annots = page_annotations(&doc, page_id);
        assert_eq!(annots.len(), 1);
        assert!(annots[0].get(b"IC").is_err());
        assert!(annots[0].get(b"C").is_ok());
    }

    #[test]
    fn text_annotation_centers_on_request() {
        let (mut doc, page_id) = test_doc();
        add_text_annotation(
            &mut doc,
            page_id,
            &sample_box(),
            "hello",
            11.0,
            (0.0, 0.0, 0.0),
            true,
        )
        .unwrap();
        add_text_annotation(
            &mut doc,
            page_id,
            &sample_box(),
            "hello",
            11.0,
            (0.0, 0.0, 0.0),
            false,
        )
        .unwrap();

        let annots = page_annotations(&doc, page_id);
        assert_eq!(annots.len(), 2);
        assert_eq!(annots[0].get(b"Q").unwrap().as_i64().unwrap(), 1);
        assert!(annots[1].get(b"Q").is_err());
    }

    #[test]
    fn text_annotation_encodes_font_and_color() {
        let (mut doc, page_id) = test_doc();
        add_text_annotation(
            &mut doc,
            page_id,
            &sample_box(),
            "x",
            6.5,
            (0.35, 0.35, 0.35),
            true,
        )
        .unwrap();

        let annots = page_annotations(&doc, page_id);
        let da = annots[0].get(b"DA").unwrap().as_str().unwrap();
        assert_eq!(
            String::from_utf8_lossy(da),
            "/Helvetica 6.5 Tf 0.35 0.35 0.35 rg"
        );
    }

    #[test]
    fn append_content_builds_array_from_nothing() {
        let (mut doc, page_id) = test_doc();
        append_content(&mut doc, page_id, "q\nQ\n".to_string()).unwrap();
        append_content(&mut doc, page_id, "q\nQ\n".to_string()).unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        match page.get(b"Contents") {
            Ok(Object::Array(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected Contents array, got {:?}", other),
        }
    }

    #[test]
    fn register_image_creates_resource_chain() {
        let (mut doc, page_id) = test_doc();
        let fake_image = doc.add_object(dictionary! { "Type" => "XObject" });
        register_image(&mut doc, page_id, "Sig0", fake_image).unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Sig0").is_ok());
    }

    #[test]
    fn image_ops_places_and_scales() {
        let ops = image_ops("Sig0", 12.0, 34.5, 100.0, 40.25);
        assert_eq!(ops, "q\n100.00 0 0 40.25 12.00 34.50 cm\n/Sig0 Do\nQ\n");
    }

    #[test]
    fn rounded_rect_ops_curves_every_corner() {
        let ops = rounded_rect_ops(1.0, 2.0, 30.0, 14.0, 3.0, 0.9);
        assert!(ops.starts_with("q\n0.90 0.90 0.90 rg\n"));
        // Path opens at (x + r, y) and rounds all four corners.
        assert!(ops.contains("4.00 2.00 m\n"));
        assert_eq!(ops.matches(" c\n").count(), 4);
        assert!(!ops.contains(" re\n"));
        assert!(ops.ends_with("f\nQ\n"));
    }

    #[test]
    fn rounded_rect_radius_clamps_to_half_extent() {
        // Requested radius 9 exceeds half the 4pt width; r becomes 2.
        let ops = rounded_rect_ops(0.0, 0.0, 4.0, 10.0, 9.0, 0.5);
        assert!(ops.contains("2.00 0.00 m\n"));
        assert_eq!(ops.matches(" c\n").count(), 4);
    }

    #[test]
    fn page_bounds_reads_media_box() {
        let (doc, page_id) = test_doc();
        let bounds = page_bounds(&doc, page_id);
        assert_eq!(bounds.width, 612.0);
        assert_eq!(bounds.height, 792.0);
    }

    #[test]
    fn page_bounds_inherits_from_parent() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        if let Ok(page) = doc.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let bounds = page_bounds(&doc, page_id);
        assert_eq!(bounds.width, 595.0);
        assert_eq!(bounds.height, 842.0);
    }

    #[test]
    fn page_bounds_falls_back_to_letter() {
        let doc = Document::with_version("1.7");
        let bounds = page_bounds(&doc, (999, 0));
        assert_eq!(bounds.width, 612.0);
        assert_eq!(bounds.height, 792.0);
    }
}
