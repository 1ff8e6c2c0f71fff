//! Property-based tests for payload merging and link formatting.
//!
//! Covers tag concatenation order, utm_content folding, last-wins merges
//! with stable key positions, and query-string fidelity of the formatter.

use proptest::prelude::*;

use xpromo_core::link::LinkFormatter;
use xpromo_core::payload::{
    FieldSource, FieldValue, Payload, TAGS, UTM_CONTENT, finalize_payload, merge_sources,
    merge_tags,
};

// =============================================================================
// Strategies
// =============================================================================

/// Field names that never collide with the reserved `tags`/`utm_content`.
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z$][a-z_]{0,10}".prop_filter("reserved key", |k| k != TAGS && k != UTM_CONTENT)
}

fn arb_tag() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _/&=?%-]{0,12}"
}

fn arb_tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_tag(), 0..6)
}

fn arb_scalar() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        1 => Just(FieldValue::Empty),
        1 => any::<bool>().prop_map(FieldValue::Bool),
        2 => any::<i64>().prop_map(FieldValue::Int),
        4 => "[ -~]{0,16}".prop_map(FieldValue::Text),
    ]
}

fn arb_fields() -> impl Strategy<Value = Vec<(String, FieldValue)>> {
    prop::collection::vec((arb_key(), arb_scalar()), 0..10)
}

fn payload_from(fields: &[(String, FieldValue)]) -> Payload {
    fields.iter().cloned().collect()
}

// =============================================================================
// Tag concatenation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_tags_is_plain_concatenation(
        extracted in arb_tags(),
        caller in arb_tags(),
        base in arb_tags(),
    ) {
        let merged = merge_tags(&extracted, &caller, &base);
        prop_assert_eq!(merged.len(), extracted.len() + caller.len() + base.len());
        prop_assert_eq!(&merged[..extracted.len()], &extracted[..]);
        prop_assert_eq!(
            &merged[extracted.len()..extracted.len() + caller.len()],
            &caller[..]
        );
        prop_assert_eq!(&merged[extracted.len() + caller.len()..], &base[..]);
    }
}

// =============================================================================
// Finalization
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn finalize_never_emits_utm_content(
        base_fields in arb_fields(),
        caller_fields in arb_fields(),
        content in arb_scalar(),
        extracted in arb_tags(),
    ) {
        let base = payload_from(&base_fields);
        let mut attribution = payload_from(&caller_fields);
        attribution.set(UTM_CONTENT, content.clone());

        let query = finalize_payload(&base, &attribution, &extracted);
        prop_assert!(!query.contains_key(UTM_CONTENT));

        let tags = query.tags();
        if content.is_truthy() {
            let expected = content.as_scalar().unwrap_or_default();
            prop_assert_eq!(tags.last(), Some(&expected));
            prop_assert_eq!(tags.len(), extracted.len() + 1);
        } else {
            prop_assert_eq!(tags, extracted);
        }
    }

    #[test]
    fn finalize_prefers_attribution_fields(
        base_fields in arb_fields(),
        caller_fields in arb_fields(),
    ) {
        let base = payload_from(&base_fields);
        let attribution = payload_from(&caller_fields);
        let query = finalize_payload(&base, &attribution, &[]);

        for (key, value) in attribution.iter() {
            prop_assert_eq!(query.get(key), Some(value));
        }
        for (key, value) in base.iter() {
            if !attribution.contains_key(key) {
                prop_assert_eq!(query.get(key), Some(value));
            }
        }
    }
}

// =============================================================================
// Ordered merge
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn keys_keep_first_insertion_position(
        first in arb_fields(),
        second in arb_fields(),
    ) {
        let merged = merge_sources(&[
            FieldSource::new("first", payload_from(&first)),
            FieldSource::new("second", payload_from(&second)),
        ]);

        let mut expected: Vec<&str> = Vec::new();
        for (key, _) in first.iter().chain(second.iter()) {
            if !expected.contains(&key.as_str()) {
                expected.push(key.as_str());
            }
        }
        prop_assert_eq!(merged.keys(), expected);
    }

    #[test]
    fn payload_json_preserves_order(fields in arb_fields()) {
        let payload = payload_from(&fields);
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: Payload = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed.keys(), payload.keys());
    }
}

// =============================================================================
// Formatting
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn formatted_query_decodes_to_payload(
        fields in arb_fields(),
        tags in arb_tags(),
    ) {
        let mut payload = payload_from(&fields);
        payload.set(TAGS, FieldValue::List(tags.clone()));

        let formatter = LinkFormatter::new("https", "reddit.app.link").unwrap();
        let link = formatter.format(&payload);
        prop_assert!(link.starts_with("https://reddit.app.link/"));

        let parsed = url::Url::parse(&link).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let decoded_tags: Vec<String> = pairs
            .iter()
            .filter(|(k, _)| k == TAGS)
            .map(|(_, v)| v.clone())
            .collect();
        prop_assert_eq!(decoded_tags, tags);

        for (key, value) in payload.iter() {
            if let Some(scalar) = value.as_scalar() {
                let found = pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
                prop_assert_eq!(found, Some(scalar));
            }
        }
    }

    #[test]
    fn formatting_is_deterministic(fields in arb_fields()) {
        let payload = payload_from(&fields);
        let formatter = LinkFormatter::new("https", "reddit.app.link").unwrap();
        prop_assert_eq!(formatter.format(&payload), formatter.format(&payload.clone()));
    }
}
