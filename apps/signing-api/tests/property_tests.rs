//! Property-based tests for signing-api
//!
//! Tests the wire shapes and invariants the API relies on using proptest.

use proptest::prelude::*;

// ============================================================
// Identifier Strategies
// ============================================================

/// Document ids and signing tokens are UUIDs (36 characters with hyphens)
fn valid_uuid() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// Strings that must never pass for a signing token
fn invalid_token() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{0,10}",        // Too short
        "[a-z]{50,100}",      // Too long
        "[!@#$%^&*]{10,20}",  // Invalid characters
        Just("".to_string()), // Empty
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Token Shape Tests
    // ============================================================

    #[test]
    fn signing_tokens_are_36_chars(token in valid_uuid()) {
        prop_assert_eq!(token.len(), 36);
        prop_assert!(token.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn invalid_tokens_dont_match_uuid_pattern(token in invalid_token()) {
        let uuid_pattern = regex::Regex::new(
            r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
        ).unwrap();
        prop_assert!(!uuid_pattern.is_match(&token));
    }

    // ============================================================
    // Artifact Path Tests
    // ============================================================

    #[test]
    fn signed_artifact_paths_keep_their_suffix(
        id in valid_uuid(),
        millis in 0i64..4_102_444_800_000,
        ext in prop_oneof![Just("pdf"), Just("html")],
    ) {
        let path = format!("documents/{}/signed_{}.{}", id, millis, ext);
        let pattern = regex::Regex::new(
            r"^documents/[0-9a-f-]{36}/signed_\d+\.(pdf|html)$"
        ).unwrap();
        prop_assert!(pattern.is_match(&path));
        // Hoisted out of the assertion: prop_assert! stringifies its condition
        // into a format string, so a literal "{}" inside it fails to compile.
        let suffix = format!(".{}", ext);
        prop_assert!(path.ends_with(&suffix));
    }

    #[test]
    fn original_paths_have_no_timestamp(id in valid_uuid()) {
        let path = format!("documents/{}/original.pdf", id);
        prop_assert!(!path.contains("signed_"));
        prop_assert!(path.starts_with("documents/"));
    }

    // ============================================================
    // Field Geometry Tests
    // ============================================================

    #[test]
    fn clamped_percentages_stay_on_page(
        raw in -500.0f64..500.0,
    ) {
        // Mirror of the coordinate clamp: percentages land in [0, 100].
        let clamped = raw.clamp(0.0, 100.0);
        prop_assert!((0.0..=100.0).contains(&clamped));
    }

    #[test]
    fn percent_of_page_is_within_bounds(
        percent in 0.0f64..100.0,
        page_w in 200.0f64..2000.0,
    ) {
        let native = percent / 100.0 * page_w;
        prop_assert!(native >= 0.0);
        prop_assert!(native <= page_w);
    }

    // ============================================================
    // Role Normalization Tests
    // ============================================================

    #[test]
    fn role_normalization_is_idempotent(role in "\\s{0,3}[A-Za-z ]{1,30}\\s{0,3}") {
        let once = role.trim().to_lowercase();
        let twice = once.trim().to_lowercase();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalized_roles_have_no_uppercase(role in "[A-Za-z]{1,20}") {
        let normalized = role.trim().to_lowercase();
        prop_assert!(!normalized.chars().any(|c| c.is_ascii_uppercase()));
    }

    // ============================================================
    // Status and Strategy Name Tests
    // ============================================================

    #[test]
    fn status_values_are_valid(
        status in prop_oneof![
            Just("unsigned"),
            Just("signed"),
        ]
    ) {
        let valid_statuses = ["unsigned", "signed"];
        prop_assert!(valid_statuses.contains(&status));
        prop_assert!(status.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn strategy_names_are_kebab_case(
        strategy in prop_oneof![
            Just("exact-field-tags"),
            Just("generic-field-tags"),
            Just("role-marker"),
            Just("legacy-placeholder"),
            Just("any-marker"),
            Just("appended"),
        ]
    ) {
        prop_assert!(!strategy.is_empty());
        prop_assert!(strategy.chars().all(|c| c.is_ascii_lowercase() || c == '-'));
        prop_assert!(!strategy.starts_with('-'));
        prop_assert!(!strategy.ends_with('-'));
    }

    // ============================================================
    // Timestamp Tests
    // ============================================================

    #[test]
    fn timestamp_format_is_iso8601(
        year in 2020i32..2030,
        month in 1u32..13,
        day in 1u32..29,
        hour in 0u32..24,
        minute in 0u32..60,
        second in 0u32..60
    ) {
        let timestamp = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            year, month, day, hour, minute, second
        );
        prop_assert!(timestamp.len() == 20);
        prop_assert!(timestamp.ends_with('Z'));
        prop_assert!(timestamp.contains('T'));
    }

    #[test]
    fn expiry_hours_are_reasonable(hours in 1i64..8760) {
        // 8760 hours = 1 year
        prop_assert!(hours >= 1);
        prop_assert!(hours <= 8760);
    }

    // ============================================================
    // Artifact Digest Tests
    // ============================================================

    #[test]
    fn sha256_hash_is_64_hex_chars(hash in "[0-9a-f]{64}") {
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ============================================================
    // Document Encoding Tests
    // ============================================================

    #[test]
    fn pdf_magic_bytes_check(
        rest in proptest::collection::vec(any::<u8>(), 0..100)
    ) {
        // PDF files start with %PDF-
        let mut pdf_data = vec![0x25, 0x50, 0x44, 0x46, 0x2D]; // %PDF-
        pdf_data.extend(rest);

        prop_assert!(pdf_data.len() >= 5);
        prop_assert_eq!(&pdf_data[0..5], b"%PDF-");
    }

    #[test]
    fn base64_upload_roundtrip(data in proptest::collection::vec(any::<u8>(), 10..500)) {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let encoded = STANDARD.encode(&data);
        let decoded = STANDARD.decode(&encoded).unwrap();

        prop_assert_eq!(data, decoded);
    }

    #[test]
    fn data_url_format(
        data in "[A-Za-z0-9+/]{100,500}"
    ) {
        let data_url = format!("data:image/png;base64,{}", data);
        prop_assert!(data_url.starts_with("data:image/"));
        prop_assert!(data_url.contains(";base64,"));
    }

    // ============================================================
    // Error Response Tests
    // ============================================================

    #[test]
    fn http_status_codes_are_valid(
        status in prop_oneof![
            Just(200u16), // OK
            Just(400u16), // Bad Request
            Just(401u16), // Unauthorized
            Just(404u16), // Not Found
            Just(409u16), // Conflict
            Just(410u16), // Gone (expired)
            Just(422u16), // Unprocessable (bad source)
            Just(500u16), // Internal Server Error
        ]
    ) {
        prop_assert!(status >= 100 && status < 600);
    }
}

// ============================================================
// Unit Tests (non-property)
// ============================================================

#[cfg(test)]
mod unit_tests {
    #[test]
    fn test_field_type_wire_names() {
        let field_types = ["signature", "initials", "date", "text"];
        assert_eq!(field_types.len(), 4);
        for name in field_types {
            assert!(name.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_status_transitions() {
        // unsigned -> signed is the only forward edge.
        let from = "unsigned";
        let to = "signed";
        assert_ne!(from, to);
        assert_eq!(to, "signed");
    }

    #[test]
    fn test_default_token_lifetime() {
        const DEFAULT_TOKEN_HOURS: i64 = 72;
        assert_eq!(DEFAULT_TOKEN_HOURS * 3600, 259_200);
    }
}
