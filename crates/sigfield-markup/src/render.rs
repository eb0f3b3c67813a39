//! HTML fragments for signed markup output.
//!
//! Styling mirrors the signature section our document templates already
//! carry: a 300px rule line, the printed name in bold, and muted 12px
//! audit text.

use lazy_static::lazy_static;
use regex::Regex;
use sigfield_core::{initials_from_name, FieldType, SignatureField};

use crate::MarkupContext;

lazy_static! {
    /// Closing body tag, any casing.
    static ref BODY_CLOSE: Regex = Regex::new(r"(?i)</body\s*>").unwrap();
}

/// Escape text for interpolation into HTML bodies and attribute values.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Full signature block: the drawn signature over a rule line, the printed
/// name, and the signing date.
pub(crate) fn signature_block(ctx: &MarkupContext<'_>) -> String {
    let name = escape_html(ctx.signer_name);
    let mark = match ctx.signature_data_url {
        Some(url) => format!(
            "<img src=\"{}\" alt=\"Signature of {}\" style=\"max-width: 300px; border-bottom: 2px solid black; display: block; margin-top: 40px;\" />",
            escape_html(url),
            name,
        ),
        None => String::from(
            "<div style=\"border-bottom: 2px solid black; width: 300px; margin-top: 40px;\">&nbsp;</div>",
        ),
    };
    format!(
        "<div class=\"signature-block\">\n{}\n<p style=\"margin-top: 10px;\"><strong>{}</strong></p>\n<p style=\"font-size: 12px; color: #666;\">Signed: {}</p>\n</div>",
        mark,
        name,
        ctx.date_line(),
    )
}

/// In-place replacement for a role+type token with no geometry of its own.
pub(crate) fn inline_value(field_type: FieldType, ctx: &MarkupContext<'_>) -> String {
    match field_type {
        FieldType::Signature => signature_block(ctx),
        FieldType::Initials => escape_html(&initials_from_name(ctx.signer_name)),
        FieldType::Date => escape_html(&ctx.date_line()),
        FieldType::Text => escape_html(ctx.signer_name),
    }
}

/// Absolutely positioned overlay reusing the field's own percentage
/// geometry. Width is honored; height is left to the content so the
/// rendered block never clips.
pub(crate) fn overlay(field: &SignatureField, ctx: &MarkupContext<'_>) -> String {
    let inner = match field.field_type {
        FieldType::Signature => overlay_signature(ctx),
        other => inline_value(other, ctx),
    };
    format!(
        "<div class=\"signature-overlay\" data-field-id=\"{}\" style=\"position: absolute; left: {:.2}%; top: {:.2}%; width: {:.2}%;\">{}</div>",
        escape_html(&field.id),
        field.x_percent,
        field.y_percent,
        field.width_percent,
        inner,
    )
}

/// Signature mark sized to its overlay box rather than the document flow.
fn overlay_signature(ctx: &MarkupContext<'_>) -> String {
    let name = escape_html(ctx.signer_name);
    let mark = match ctx.signature_data_url {
        Some(url) => format!(
            "<img src=\"{}\" alt=\"Signature of {}\" style=\"max-width: 100%; border-bottom: 2px solid black; display: block;\" />",
            escape_html(url),
            name,
        ),
        None => String::from("<div style=\"border-bottom: 2px solid black;\">&nbsp;</div>"),
    };
    format!(
        "{}\n<p style=\"margin: 4px 0 0; font-size: 12px;\"><strong>{}</strong></p>",
        mark, name,
    )
}

/// Audit text appended near the end of every signed document.
pub(crate) fn audit_trailer(ctx: &MarkupContext<'_>) -> String {
    let mut line = format!(
        "Electronically signed by {} on {}",
        escape_html(ctx.signer_name),
        ctx.timestamp_line(),
    );
    if let Some(ip) = ctx.signer_ip {
        line.push_str(" from ");
        line.push_str(&escape_html(ip));
    }
    format!(
        "<div class=\"signature-audit\" style=\"margin-top: 60px; padding-top: 30px; border-top: 2px solid #000;\">\n<p style=\"font-size: 12px; color: #666;\">{}</p>\n</div>",
        line,
    )
}

/// Splice `fragment` immediately before `</body>`, or append it when the
/// markup has no closing body tag.
pub(crate) fn insert_before_body_close(markup: &str, fragment: &str) -> String {
    let mut out = String::with_capacity(markup.len() + fragment.len() + 1);
    match BODY_CLOSE.find(markup) {
        Some(found) => {
            out.push_str(&markup[..found.start()]);
            out.push_str(fragment);
            out.push('\n');
            out.push_str(&markup[found.start()..]);
        }
        None => {
            out.push_str(markup);
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(fragment);
        }
    }
    out
}
