//! Ordered placement strategies for markup documents.
//!
//! Each strategy is a pure function from source markup to an optionally
//! rewritten document. The chain runs in declared order and stops at the
//! first strategy that fills at least one target, so a tagged template is
//! never also patched by the looser fallbacks.

use lazy_static::lazy_static;
use regex::Regex;
use sigfield_core::{role_matches, FieldType, SignatureField};

use crate::{render, AppliedStrategy, MarkupContext};

lazy_static! {
    /// Tagged field markers: `{{SIGNATURE_FIELD:role:type}}`.
    static ref FIELD_TAG: Regex =
        Regex::new(r"(?i)\{\{SIGNATURE_FIELD:([^:{}]+):([A-Za-z]+)\}\}").unwrap();

    /// Role spans the document generator wraps around signature tags,
    /// e.g. `<span data-sig="CEO">...</span>`.
    static ref ROLE_SPAN: Regex =
        Regex::new(r#"(?is)<span[^>]*\bdata-sig="([^"]+)"[^>]*>.*?</span>"#).unwrap();

    /// Bare role tokens such as `{{SIGNATURE_CEO}}`. The colon in tagged
    /// field markers keeps those out of this pattern.
    static ref ROLE_TOKEN: Regex = Regex::new(r"(?i)\{\{SIGNATURE_([A-Za-z0-9_]+)\}\}").unwrap();

    /// Placeholder spellings older templates used before tagged fields.
    static ref LEGACY_PLACEHOLDER: Regex = Regex::new(
        r"(?i)\{\{\s*signature(?:_line)?\s*\}\}|\$\{signature\}|\[signature\]|\[sign\s+here\]"
    )
    .unwrap();
}

/// Inputs shared by every strategy in the chain.
pub(crate) struct StrategyContext<'a> {
    pub role: &'a str,
    pub declared_role: Option<&'a str>,
    pub fields: &'a [SignatureField],
    pub render: &'a MarkupContext<'a>,
}

/// A strategy's rewritten document plus the layout entries it completed.
pub(crate) struct StrategyHit {
    pub markup: String,
    pub filled_field_ids: Vec<String>,
}

type Strategy = fn(&str, &StrategyContext<'_>) -> Option<StrategyHit>;

const CHAIN: [(AppliedStrategy, Strategy); 5] = [
    (AppliedStrategy::ExactFieldTags, exact_field_tags),
    (AppliedStrategy::GenericFieldTags, generic_field_tags),
    (AppliedStrategy::RoleMarker, role_marker),
    (AppliedStrategy::LegacyPlaceholder, legacy_placeholder),
    (AppliedStrategy::AnyMarker, any_marker),
];

/// Try each strategy in order and return the first hit.
pub(crate) fn run_chain(
    markup: &str,
    ctx: &StrategyContext<'_>,
) -> Option<(AppliedStrategy, StrategyHit)> {
    CHAIN
        .into_iter()
        .find_map(|(applied, strategy)| strategy(markup, ctx).map(|hit| (applied, hit)))
}

fn splice(markup: &str, range: std::ops::Range<usize>, fragment: &str) -> StrategyHit {
    let mut out = String::with_capacity(markup.len() + fragment.len());
    out.push_str(&markup[..range.start]);
    out.push_str(fragment);
    out.push_str(&markup[range.end..]);
    StrategyHit {
        markup: out,
        filled_field_ids: Vec::new(),
    }
}

/// Tag type spellings accepted in field markers.
fn parse_tag_type(s: &str) -> Option<FieldType> {
    match s.to_ascii_lowercase().as_str() {
        "signature" => Some(FieldType::Signature),
        "initials" | "initial" => Some(FieldType::Initials),
        "date" => Some(FieldType::Date),
        "text" | "name" => Some(FieldType::Text),
        _ => None,
    }
}

/// Strategy 1: a token naming the field's own role and type, present
/// verbatim. Each hit becomes an overlay positioned with the field's
/// percentage geometry. Duplicate tokens are consumed one per field.
fn exact_field_tags(markup: &str, ctx: &StrategyContext<'_>) -> Option<StrategyHit> {
    let mut out = markup.to_string();
    let mut filled = Vec::new();
    for field in ctx.fields {
        let token = format!(
            "{{{{SIGNATURE_FIELD:{}:{}}}}}",
            field.signer_role, field.field_type
        );
        if let Some(at) = out.find(&token) {
            let overlay = render::overlay(field, ctx.render);
            out.replace_range(at..at + token.len(), &overlay);
            filled.push(field.id.clone());
        }
    }
    if filled.is_empty() {
        None
    } else {
        Some(StrategyHit {
            markup: out,
            filled_field_ids: filled,
        })
    }
}

/// Strategy 2: the same tag syntax matched loosely. Every tag whose role
/// part matches the signer is replaced in place, geometry ignored.
fn generic_field_tags(markup: &str, ctx: &StrategyContext<'_>) -> Option<StrategyHit> {
    let mut replaced_types: Vec<FieldType> = Vec::new();
    let out = FIELD_TAG.replace_all(markup, |caps: &regex::Captures<'_>| {
        let tag_role = caps.get(1).map_or("", |m| m.as_str());
        let field_type = match parse_tag_type(caps.get(2).map_or("", |m| m.as_str())) {
            Some(field_type) => field_type,
            None => return caps.get(0).unwrap().as_str().to_string(),
        };
        if !role_matches(ctx.role, tag_role, ctx.declared_role) {
            return caps.get(0).unwrap().as_str().to_string();
        }
        if !replaced_types.contains(&field_type) {
            replaced_types.push(field_type);
        }
        render::inline_value(field_type, ctx.render)
    });
    if replaced_types.is_empty() {
        return None;
    }
    let filled = ctx
        .fields
        .iter()
        .filter(|field| replaced_types.contains(&field.field_type))
        .map(|field| field.id.clone())
        .collect();
    Some(StrategyHit {
        markup: out.into_owned(),
        filled_field_ids: filled,
    })
}

/// Strategy 3: a role-specific structural marker, first occurrence only.
fn role_marker(markup: &str, ctx: &StrategyContext<'_>) -> Option<StrategyHit> {
    let span = ROLE_SPAN
        .captures_iter(markup)
        .find(|caps| role_matches(ctx.role, &caps[1], ctx.declared_role))
        .map(|caps| caps.get(0).unwrap().range());
    let token = ROLE_TOKEN
        .captures_iter(markup)
        .find(|caps| role_matches(ctx.role, &caps[1], ctx.declared_role))
        .map(|caps| caps.get(0).unwrap().range());
    let range = match (span, token) {
        (Some(span), Some(token)) => {
            if span.start <= token.start {
                span
            } else {
                token
            }
        }
        (Some(span), None) => span,
        (None, Some(token)) => token,
        (None, None) => return None,
    };
    Some(splice(markup, range, &render::signature_block(ctx.render)))
}

/// Strategy 4: placeholder spellings from templates that predate tags.
fn legacy_placeholder(markup: &str, ctx: &StrategyContext<'_>) -> Option<StrategyHit> {
    let found = LEGACY_PLACEHOLDER.find(markup)?;
    Some(splice(
        markup,
        found.range(),
        &render::signature_block(ctx.render),
    ))
}

/// Strategy 5: the first marker of any kind, role ignored, so a signing
/// attempt against a mislabeled template still lands somewhere.
fn any_marker(markup: &str, ctx: &StrategyContext<'_>) -> Option<StrategyHit> {
    let earliest = [&*ROLE_SPAN, &*ROLE_TOKEN, &*FIELD_TAG]
        .into_iter()
        .filter_map(|re| re.find(markup))
        .min_by_key(|found| found.start())?;
    Some(splice(
        markup,
        earliest.range(),
        &render::signature_block(ctx.render),
    ))
}
