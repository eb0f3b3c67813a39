use chrono::{DateTime, Utc};

use crate::image::SignatureImage;

/// Everything a single embedding run needs to know about the signer.
///
/// Callers build one of these per request; the embedder itself never
/// consults clocks, environment, or storage.
#[derive(Debug)]
pub struct EmbedContext {
    pub signer_name: String,
    pub signed_at: DateTime<Utc>,
    pub signature_image: Option<SignatureImage>,
    pub signer_ip: Option<String>,
    pub signer_user_agent: Option<String>,
}

impl EmbedContext {
    pub fn new(signer_name: impl Into<String>, signed_at: DateTime<Utc>) -> Self {
        Self {
            signer_name: signer_name.into(),
            signed_at,
            signature_image: None,
            signer_ip: None,
            signer_user_agent: None,
        }
    }

    pub fn with_image(mut self, image: SignatureImage) -> Self {
        self.signature_image = Some(image);
        self
    }

    pub fn with_request_meta(
        mut self,
        signer_ip: Option<String>,
        signer_user_agent: Option<String>,
    ) -> Self {
        self.signer_ip = signer_ip;
        self.signer_user_agent = signer_user_agent;
        self
    }

    /// Long-form date used for date fields, e.g. "August 25, 2026".
    pub fn date_line(&self) -> String {
        self.signed_at.format("%B %-d, %Y").to_string()
    }

    /// Timestamp line used in audit text, e.g. "2026-08-25 14:03:07 UTC".
    pub fn timestamp_line(&self) -> String {
        self.signed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn date_line_uses_long_month_without_padding() {
        let at = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let ctx = EmbedContext::new("Avery Chen", at);
        assert_eq!(ctx.date_line(), "August 5, 2026");
    }

    #[test]
    fn timestamp_line_is_second_precision_utc() {
        let at = Utc.with_ymd_and_hms(2026, 8, 25, 14, 3, 7).unwrap();
        let ctx = EmbedContext::new("Avery Chen", at);
        assert_eq!(ctx.timestamp_line(), "2026-08-25 14:03:07 UTC");
    }
}
