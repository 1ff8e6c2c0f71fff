//! The xpromo facade: links, eligibility verdicts, and dismissal writes.

use crate::attribution::{build_attribution_payload, build_base_payload};
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{PagePredicates, StaticContext, XPromoContext};
use crate::config::XPromoConfig;
use crate::dismissal::{DEFAULT_ONLY_FREQUENCY, DismissalClock};
use crate::eligibility::{
    CheckInputs, Eligibility, INTERSTITIAL_TYPE_FIELD, IneligibilityReason, InterstitialType,
    LISTING_CLICK_TYPE_FIELD, ListingClickSnapshot, WindowPolicy, evaluate_banner_eligibility,
    interstitial_data, interstitial_type, listing_click_initial_state,
};
use crate::error::{Error, Result};
use crate::link::LinkFormatter;
use crate::listing_click::{LISTING_CLICK_LINK_TYPE, ListingClickType, resolve_listing_click_path};
use crate::payload::{FieldValue, Payload, finalize_payload};
use crate::session::{CookieJar, MapCookieJar, SessionIdentity, SessionState};
use crate::storage::{CheckedStorage, StorageGate, StorageKey};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Entry point for every xpromo operation.
///
/// Holds the collaborators (`C`), the storage gate, and the injected clock
/// and cookie jar. All methods are synchronous.
pub struct XPromo<C: XPromoContext = StaticContext> {
    config: XPromoConfig,
    context: C,
    gate: StorageGate,
    clock: Arc<dyn Clock>,
    cookies: Arc<dyn CookieJar>,
    formatter: LinkFormatter,
}

impl<C: XPromoContext> std::fmt::Debug for XPromo<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XPromo")
            .field("formatter", &self.formatter)
            .field("gate", &self.gate)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<C: XPromoContext> XPromo<C> {
    /// Fails only if `config` does not validate.
    pub fn new(config: XPromoConfig, context: C, gate: StorageGate) -> Result<Self> {
        config.validate()?;
        let formatter = LinkFormatter::from_config(&config.links)?;
        Ok(Self {
            config,
            context,
            gate,
            clock: Arc::new(SystemClock),
            cookies: Arc::new(MapCookieJar::new()),
            formatter,
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Arc<dyn CookieJar>) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn config(&self) -> &XPromoConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    fn dismissal<'a>(&'a self, storage: CheckedStorage<'a>) -> DismissalClock<'a> {
        DismissalClock::new(
            storage,
            self.clock.as_ref(),
            self.config.dismissal.default_frequency,
        )
    }

    // -------------------------------------------------------------------------
    // Links
    // -------------------------------------------------------------------------

    /// Link to the current page, attributed to `interstitial_type`.
    ///
    /// `None` leaves `utm_content`/`interstitial_type` to the computed type
    /// (empty when the page is not eligible).
    #[must_use]
    pub fn link_for_current_page(
        &self,
        state: &SessionState,
        interstitial_type: Option<InterstitialType>,
    ) -> String {
        let kind = interstitial_type.or_else(|| self.interstitial_type(state));
        let link_type = kind.map(|k| k.as_str()).unwrap_or_default();
        let extra = Payload::new().with(
            INTERSTITIAL_TYPE_FIELD,
            FieldValue::optional(kind.map(|k| k.as_str())),
        );
        self.xpromo_link(state, &state.current_page.url, link_type, &extra)
    }

    /// Link for a click on a listing item.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidReference`] when `post_id` is not a known post.
    pub fn listing_click_link(
        &self,
        state: &SessionState,
        post_id: &str,
        click_type: &ListingClickType,
    ) -> Result<String> {
        let Some(post) = state.post(post_id) else {
            tracing::warn!(post_id, "Listing click link requested for unknown post");
            return Err(Error::InvalidReference(post_id.to_string()));
        };
        let path = resolve_listing_click_path(state, post, click_type);
        let extra = Payload::new().with(LISTING_CLICK_TYPE_FIELD, click_type.as_str());
        Ok(self.xpromo_link(state, &path, LISTING_CLICK_LINK_TYPE, &extra))
    }

    fn xpromo_link(&self, state: &SessionState, path: &str, link_type: &str, extra: &Payload) -> String {
        let payload = build_attribution_payload(state, &self.context, link_type, extra);
        tracing::debug!(link_type, path, "Building xpromo link");
        self.attribution_link(state, path, &payload)
    }

    /// Attribution link for `path` carrying `payload` on top of the base
    /// payload for the session.
    #[must_use]
    pub fn attribution_link(&self, state: &SessionState, path: &str, payload: &Payload) -> String {
        let query = self.finalized_payload(state, path, payload);
        self.formatter.format(&query)
    }

    /// The query payload [`XPromo::attribution_link`] would serialize.
    #[must_use]
    pub fn finalized_payload(&self, state: &SessionState, path: &str, payload: &Payload) -> Payload {
        let extracted = self.context.extract_tags(state);
        let identity = SessionIdentity::resolve(state, self.cookies.as_ref(), &self.config.cookies);
        let base = build_base_payload(state, &self.context, &identity, &self.config.links, path);
        finalize_payload(&base, payload, &extracted)
    }

    // -------------------------------------------------------------------------
    // Eligibility
    // -------------------------------------------------------------------------

    fn eligibility_with(&self, state: &SessionState, policy: WindowPolicy) -> Eligibility {
        let storage = self.gate.checked();
        let inputs = CheckInputs {
            state,
            context: &self.context,
            storage,
            dismissal: self.dismissal(storage),
            policy,
        };
        evaluate_banner_eligibility(&inputs)
    }

    /// Banner verdict using the experiment-assigned closing window.
    #[must_use]
    pub fn banner_eligibility(&self, state: &SessionState) -> Eligibility {
        self.eligibility_with(state, WindowPolicy::ExperimentAssigned)
    }

    /// Banner verdict using the fixed two-week closing window.
    #[must_use]
    pub fn banner_eligibility_default_window(&self, state: &SessionState) -> Eligibility {
        self.eligibility_with(state, WindowPolicy::DefaultOnly)
    }

    /// `None` when the banner may be shown, else why not.
    #[must_use]
    pub fn should_not_show_banner(&self, state: &SessionState) -> Option<IneligibilityReason> {
        self.banner_eligibility(state).reason()
    }

    /// Whether the banner was dismissed within the last two weeks,
    /// regardless of experiment frequency or configured default.
    #[must_use]
    pub fn is_interstitial_dismissed(&self, _state: &SessionState) -> bool {
        self.dismissal(self.gate.checked()).is_within_cooldown(
            StorageKey::BannerLastClosed,
            Some(DEFAULT_ONLY_FREQUENCY),
            None,
        )
    }

    #[must_use]
    pub fn listing_click_initial_state(&self) -> ListingClickSnapshot {
        listing_click_initial_state(self.gate.checked())
    }

    #[must_use]
    pub fn interstitial_type(&self, state: &SessionState) -> Option<InterstitialType> {
        interstitial_type(state, &self.context)
    }

    #[must_use]
    pub fn interstitial_data(&self, state: &SessionState, extra: &Payload) -> Payload {
        interstitial_data(state, &self.context, extra)
    }

    #[must_use]
    pub fn is_xpromo_persistent_enabled(&self, state: &SessionState) -> bool {
        self.context.is_xpromo_persistent(state)
    }

    #[must_use]
    pub fn storage_available(&self) -> bool {
        self.gate.is_available()
    }

    // -------------------------------------------------------------------------
    // Dismissal writes
    // -------------------------------------------------------------------------

    /// Record a banner dismissal now. Returns whether it was persisted.
    pub fn mark_banner_closed(&self) -> bool {
        let now = self.clock.now();
        self.gate
            .write(StorageKey::BannerLastClosed, &format_timestamp(now))
    }

    /// Record a listing-click at `at`; a no-op without storage.
    pub fn mark_listing_click_timestamp(&self, at: DateTime<Utc>) -> bool {
        self.gate
            .write(StorageKey::LastModalClick, &format_timestamp(at))
    }

    /// Persist the modal dismiss counter; a no-op without storage.
    pub fn set_modal_dismiss_count(&self, count: u32) -> bool {
        self.gate
            .write(StorageKey::ModalDismissCount, &count.to_string())
    }
}

/// RFC 3339 with millisecond precision, as persisted.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::StorageError;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW_MS: i64 = 1_700_000_000_000;

    /// Memory store that counts backend writes (probe writes included).
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        sets: AtomicUsize,
    }

    impl CountingStore {
        fn sets(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    fn xpromo(store: Arc<MemoryStore>) -> (XPromo, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::from_millis(NOW_MS));
        let xpromo = XPromo::new(
            XPromoConfig::default(),
            StaticContext,
            StorageGate::new(store),
        )
        .unwrap()
        .with_clock(clock.clone());
        (xpromo, clock)
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = XPromoConfig::default();
        config.links.origin = "https://www.reddit.com/".to_string();
        let err = XPromo::new(config, StaticContext, StorageGate::unavailable()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn timestamps_persist_with_millis() {
        let at = DateTime::from_timestamp_millis(1_709_632_800_123).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-05T10:00:00.123Z");
    }

    #[test]
    fn mark_closed_then_dismissed() {
        let store = Arc::new(MemoryStore::new());
        let (xpromo, clock) = xpromo(store.clone());
        let state = SessionState::default();

        assert_eq!(xpromo.should_not_show_banner(&state), None);
        assert!(xpromo.mark_banner_closed());
        assert_eq!(
            store.snapshot().get("bannerLastClosed").map(String::as_str),
            Some("2023-11-14T22:13:20.000Z")
        );
        assert_eq!(
            xpromo.should_not_show_banner(&state),
            Some(IneligibilityReason::DismissedPreviously)
        );
        assert!(xpromo.is_interstitial_dismissed(&state));

        clock.advance(chrono::TimeDelta::days(14));
        assert_eq!(xpromo.should_not_show_banner(&state), None);
        assert!(!xpromo.is_interstitial_dismissed(&state));
    }

    #[test]
    fn writes_are_noops_without_storage() {
        let store = Arc::new(MemoryStore::new());
        store.set_disabled(true);
        let (xpromo, _) = xpromo(store.clone());

        assert!(!xpromo.mark_banner_closed());
        assert!(!xpromo.set_modal_dismiss_count(2));
        assert!(!xpromo.mark_listing_click_timestamp(Utc::now()));
        store.set_disabled(false);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn unknown_post_is_invalid_reference() {
        let (xpromo, _) = xpromo(Arc::new(MemoryStore::new()));
        let err = xpromo
            .listing_click_link(&SessionState::default(), "t3_missing", &ListingClickType::Author)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference(id) if id == "t3_missing"));
    }

    #[test]
    fn each_operation_checks_storage_once() {
        let store = Arc::new(CountingStore::default());
        let xpromo = XPromo::new(
            XPromoConfig::default(),
            StaticContext,
            StorageGate::new(store.clone()),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock::from_millis(NOW_MS)));
        let state = SessionState::default();

        assert_eq!(xpromo.should_not_show_banner(&state), None);
        assert_eq!(store.sets(), 1);

        let _ = xpromo.listing_click_initial_state();
        assert_eq!(store.sets(), 2);

        // Probe plus the write itself.
        assert!(xpromo.mark_banner_closed());
        assert_eq!(store.sets(), 4);

        assert_eq!(
            xpromo.should_not_show_banner(&state),
            Some(IneligibilityReason::DismissedPreviously)
        );
        assert_eq!(store.sets(), 5);
    }
}
