#![no_main]

use libfuzzer_sys::fuzz_target;
use xpromo_core::link::LinkFormatter;
use xpromo_core::payload::{FieldValue, Payload, TAGS, UTM_CONTENT, finalize_payload};

/// Split fuzz input into printable-ish fields on NUL bytes.
fn fields(data: &[u8]) -> Vec<String> {
    data.split(|b| *b == 0)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

fn payload_from(parts: &[String]) -> Payload {
    let mut payload = Payload::new();
    for pair in parts.chunks(2) {
        let key = pair[0].clone();
        let value = pair.get(1).cloned().map_or(FieldValue::Empty, FieldValue::Text);
        payload.set(key, value);
    }
    payload
}

fuzz_target!(|data: &[u8]| {
    let parts = fields(data);
    let mid = parts.len() / 2;
    let base = payload_from(&parts[..mid]);
    let attribution = payload_from(&parts[mid..]);
    let extracted: Vec<String> = parts.iter().take(3).cloned().collect();

    let query = finalize_payload(&base, &attribution, &extracted);
    assert!(!query.contains_key(UTM_CONTENT));
    assert!(query.contains_key(TAGS));

    let formatter = LinkFormatter::new("https", "reddit.app.link").unwrap();
    let link = formatter.format(&query);
    let parsed = url::Url::parse(&link).unwrap();
    assert_eq!(parsed.host_str(), Some("reddit.app.link"));

    let tags: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| k == TAGS)
        .map(|(_, v)| v.into_owned())
        .collect();
    assert_eq!(tags, query.tags());
});
