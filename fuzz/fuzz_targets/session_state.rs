#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use xpromo_core::XPromo;
use xpromo_core::collaborators::StaticContext;
use xpromo_core::config::XPromoConfig;
use xpromo_core::listing_click::ListingClickType;
use xpromo_core::session::SessionState;
use xpromo_core::storage::{MemoryStore, StorageGate};

fuzz_target!(|data: &[u8]| {
    let Ok(state) = serde_json::from_slice::<SessionState>(data) else {
        return;
    };
    let xpromo = XPromo::new(
        XPromoConfig::default(),
        StaticContext,
        StorageGate::new(Arc::new(MemoryStore::new())),
    )
    .unwrap();

    let link = xpromo.link_for_current_page(&state, None);
    assert!(link.starts_with("https://reddit.app.link/"));
    let _ = xpromo.should_not_show_banner(&state);

    for post_id in state.posts.keys() {
        for click in ["author", "subreddit", "post"] {
            let link = xpromo
                .listing_click_link(&state, post_id, &ListingClickType::from(click))
                .unwrap();
            let parsed = url::Url::parse(&link).unwrap();
            assert!(parsed.query_pairs().all(|(key, _)| key != "utm_content"));
        }
    }
});
