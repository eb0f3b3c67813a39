//! Signature embedding for markup documents.
//!
//! HTML templates carry their signing spots in several generations of
//! syntax: tagged field markers (`{{SIGNATURE_FIELD:role:type}}`), role
//! spans (`<span data-sig="CEO">`), bare role tokens (`{{SIGNATURE_CEO}}`),
//! and a handful of legacy placeholder spellings. [`embed_signature`] tries
//! them in that order and stops at the first syntax that fills a target;
//! when nothing matches at all, the signature block is appended before
//! `</body>` so a signing attempt never vanishes. An audit trailer with
//! the signer's name and UTC timestamp lands near the end of the document
//! regardless of which strategy fired.

mod render;
mod strategy;

use chrono::{DateTime, Utc};
use sigfield_core::SignatureField;

/// Signer identity and capture data shared by every render helper.
#[derive(Debug, Clone)]
pub struct MarkupContext<'a> {
    pub signer_name: &'a str,
    pub signed_at: DateTime<Utc>,
    pub signature_data_url: Option<&'a str>,
    pub signer_ip: Option<&'a str>,
}

impl<'a> MarkupContext<'a> {
    pub fn new(signer_name: &'a str, signed_at: DateTime<Utc>) -> Self {
        MarkupContext {
            signer_name,
            signed_at,
            signature_data_url: None,
            signer_ip: None,
        }
    }

    pub fn with_image(mut self, data_url: &'a str) -> Self {
        self.signature_data_url = Some(data_url);
        self
    }

    pub fn with_ip(mut self, ip: &'a str) -> Self {
        self.signer_ip = Some(ip);
        self
    }

    /// Long-form date for rendered values, e.g. "August 25, 2026".
    pub(crate) fn date_line(&self) -> String {
        self.signed_at.format("%B %-d, %Y").to_string()
    }

    /// Audit timestamp, e.g. "2026-08-25 16:00:00 UTC".
    pub(crate) fn timestamp_line(&self) -> String {
        self.signed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

/// Which placement strategy rewrote the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedStrategy {
    /// Verbatim per-field token replaced by a positioned overlay.
    ExactFieldTags,
    /// Role+type tag replaced in place, geometry ignored.
    GenericFieldTags,
    /// Role-specific structural marker, first occurrence.
    RoleMarker,
    /// One of the legacy placeholder spellings.
    LegacyPlaceholder,
    /// First marker of any kind, role ignored.
    AnyMarker,
    /// No marker found; block appended before `</body>`.
    Appended,
}

impl std::fmt::Display for AppliedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AppliedStrategy::ExactFieldTags => "exact-field-tags",
            AppliedStrategy::GenericFieldTags => "generic-field-tags",
            AppliedStrategy::RoleMarker => "role-marker",
            AppliedStrategy::LegacyPlaceholder => "legacy-placeholder",
            AppliedStrategy::AnyMarker => "any-marker",
            AppliedStrategy::Appended => "appended",
        };
        write!(f, "{name}")
    }
}

/// A signed document plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct MarkupOutcome {
    pub markup: String,
    pub strategy: AppliedStrategy,
    /// Layout entries whose own tokens were consumed. Callers use these to
    /// mark fields rendered.
    pub filled_field_ids: Vec<String>,
}

/// Embed `ctx`'s signature into `markup` on behalf of `role`.
///
/// `fields` are the layout entries already resolved for this signer;
/// `declared_role` is the document's own role string, which widens the
/// containment heuristic when tag spellings drift from the layout's.
/// Infallible: the worst case appends the signature block at the end of
/// the document rather than dropping the attempt.
pub fn embed_signature(
    markup: &str,
    role: &str,
    fields: &[SignatureField],
    declared_role: Option<&str>,
    ctx: &MarkupContext<'_>,
) -> MarkupOutcome {
    let strategy_ctx = strategy::StrategyContext {
        role,
        declared_role,
        fields,
        render: ctx,
    };
    let (applied, hit) = match strategy::run_chain(markup, &strategy_ctx) {
        Some((applied, hit)) => (applied, hit),
        None => {
            let block = render::signature_block(ctx);
            (
                AppliedStrategy::Appended,
                strategy::StrategyHit {
                    markup: render::insert_before_body_close(markup, &block),
                    filled_field_ids: Vec::new(),
                },
            )
        }
    };
    let trailer = render::audit_trailer(ctx);
    MarkupOutcome {
        markup: render::insert_before_body_close(&hit.markup, &trailer),
        strategy: applied,
        filled_field_ids: hit.filled_field_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sigfield_core::FieldType;

    fn test_context() -> MarkupContext<'static> {
        MarkupContext::new(
            "Avery Chen",
            Utc.with_ymd_and_hms(2026, 8, 25, 16, 0, 0).unwrap(),
        )
        .with_image("data:image/png;base64,AAAA")
    }

    fn signature_field(role: &str) -> SignatureField {
        SignatureField {
            id: "fld-1".into(),
            field_type: FieldType::Signature,
            signer_role: role.into(),
            page_number: 1,
            x_percent: 40.0,
            y_percent: 70.0,
            width_percent: 30.0,
            height_percent: 8.0,
            label: None,
            required: true,
            auto_filled: false,
            rendered_value: None,
            signed_at: None,
            signature_data_url: None,
            auto_filled_by: None,
        }
    }

    #[test]
    fn lone_generic_placeholder_resolves_via_legacy_strategy() {
        let markup = "<html><body><p>Agreed and accepted:</p><p>{{signature}}</p></body></html>";
        let out = embed_signature(markup, "ceo", &[], None, &test_context());

        assert_eq!(out.strategy, AppliedStrategy::LegacyPlaceholder);
        // Exactly one substitution: the earlier strategies stayed quiet.
        assert_eq!(out.markup.matches("signature-block").count(), 1);
        assert!(!out.markup.contains("{{signature}}"));
    }

    #[test]
    fn exact_tag_outranks_every_later_syntax() {
        let fields = vec![signature_field("ceo")];
        let markup = concat!(
            "<html><body>",
            "<p>{{SIGNATURE_FIELD:ceo:signature}}</p>",
            "<p>{{SIGNATURE_CEO}}</p>",
            "<p>[signature]</p>",
            "</body></html>",
        );
        let out = embed_signature(markup, "ceo", &fields, None, &test_context());

        assert_eq!(out.strategy, AppliedStrategy::ExactFieldTags);
        assert_eq!(out.filled_field_ids, vec!["fld-1".to_string()]);
        // Later syntaxes are untouched once the chain stops.
        assert!(out.markup.contains("{{SIGNATURE_CEO}}"));
        assert!(out.markup.contains("[signature]"));
    }

    #[test]
    fn role_span_consumed_with_its_inner_token() {
        let markup = concat!(
            "<html><body>",
            "<span data-sig=\"CEO\">{{SIGNATURE_CEO}}</span>",
            "</body></html>",
        );
        let out = embed_signature(markup, "ceo", &[], None, &test_context());

        assert_eq!(out.strategy, AppliedStrategy::RoleMarker);
        assert!(!out.markup.contains("data-sig"));
        assert!(!out.markup.contains("SIGNATURE_CEO"));
    }

    #[test]
    fn other_roles_marker_claimed_as_last_resort() {
        let markup = "<html><body><p>{{SIGNATURE_CFO}}</p></body></html>";
        let out = embed_signature(markup, "ceo", &[], None, &test_context());

        assert_eq!(out.strategy, AppliedStrategy::AnyMarker);
        assert!(!out.markup.contains("SIGNATURE_CFO"));
    }

    #[test]
    fn markerless_document_gets_block_appended() {
        let markup = "<html><body><p>No placeholders here.</p></body></html>";
        let out = embed_signature(markup, "ceo", &[], None, &test_context());

        assert_eq!(out.strategy, AppliedStrategy::Appended);
        let block_at = out.markup.find("signature-block").unwrap();
        let body_at = out.markup.find("</body>").unwrap();
        assert!(block_at < body_at);
    }

    #[test]
    fn audit_trailer_present_for_every_strategy() {
        let tagged = "<html><body>{{SIGNATURE_CEO}}</body></html>";
        let bare = "<html><body>nothing</body></html>";
        for markup in [tagged, bare] {
            let out = embed_signature(markup, "ceo", &[], None, &test_context());
            assert_eq!(
                out.markup.matches("Electronically signed by Avery Chen").count(),
                1,
                "{markup:?}"
            );
        }
    }

    #[test]
    fn audit_trailer_carries_ip() {
        let ctx = test_context().with_ip("203.0.113.7");
        let out = embed_signature("<html><body></body></html>", "ceo", &[], None, &ctx);
        assert!(out
            .markup
            .contains("on 2026-08-25 16:00:00 UTC from 203.0.113.7"));
    }

    #[test]
    fn signer_name_is_html_escaped() {
        let ctx = MarkupContext::new(
            "O'Brien & Co <CEO>",
            Utc.with_ymd_and_hms(2026, 8, 25, 16, 0, 0).unwrap(),
        );
        let out = embed_signature("<html><body>[signature]</body></html>", "ceo", &[], None, &ctx);

        assert!(out.markup.contains("O&#39;Brien &amp; Co &lt;CEO&gt;"));
        assert!(!out.markup.contains("<CEO>"));
    }

    #[test]
    fn missing_image_renders_rule_line_not_img() {
        let ctx = MarkupContext::new(
            "Avery Chen",
            Utc.with_ymd_and_hms(2026, 8, 25, 16, 0, 0).unwrap(),
        );
        let out = embed_signature("<html><body>[signature]</body></html>", "ceo", &[], None, &ctx);

        assert!(!out.markup.contains("<img"));
        assert!(out.markup.contains("border-bottom: 2px solid black; width: 300px"));
    }

    #[test]
    fn strategy_names_for_logging() {
        assert_eq!(AppliedStrategy::ExactFieldTags.to_string(), "exact-field-tags");
        assert_eq!(AppliedStrategy::Appended.to_string(), "appended");
    }

    #[test]
    fn document_without_body_tag_still_signs() {
        let out = embed_signature("<p>fragment only</p>", "ceo", &[], None, &test_context());
        assert_eq!(out.strategy, AppliedStrategy::Appended);
        assert!(out.markup.contains("signature-block"));
        assert!(out.markup.contains("Electronically signed by"));
    }
}
