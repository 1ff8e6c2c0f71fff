//! Show/no-show decisions for the xpromo interstitial.
//!
//! Banner eligibility is an ordered list of named checks. Evaluation stops at
//! the first failing check and reports its reason:
//!
//! 1. `incognito`: the user opted out of cross-promotion
//! 2. `storage`: durable storage must be usable to remember dismissals
//! 3. `cooldown`: the banner was not dismissed within the closing window

use crate::collaborators::XPromoContext;
use crate::dismissal::{DEFAULT_ONLY_FREQUENCY, DismissalClock, parse_stored_timestamp};
use crate::payload::{FieldValue, Payload};
use crate::session::SessionState;
use crate::storage::{CheckedStorage, StorageKey, StoredValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied key that overrides the computed interstitial type.
pub const INTERSTITIAL_TYPE_OVERRIDE: &str = "interstitialType";
pub const INTERSTITIAL_TYPE_FIELD: &str = "interstitial_type";
pub const LISTING_CLICK_TYPE_FIELD: &str = "listing_click_type";

/// Why the banner must not be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    Incognito,
    LocalStorageUnavailable,
    DismissedPreviously,
}

impl IneligibilityReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incognito => "incognito",
            Self::LocalStorageUnavailable => "local_storage_unavailable",
            Self::DismissedPreviously => "dismissed_previously",
        }
    }
}

impl fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(IneligibilityReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibilityReason),
}

impl Eligibility {
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    #[must_use]
    pub fn reason(&self) -> Option<IneligibilityReason> {
        match self {
            Self::Eligible => None,
            Self::Ineligible(reason) => Some(*reason),
        }
    }
}

/// Which closing window the cooldown check uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPolicy {
    /// Experiment-assigned frequency when present, else the configured default.
    #[default]
    ExperimentAssigned,
    /// Always two weeks, ignoring experiments and configuration.
    DefaultOnly,
}

/// Inputs shared by every banner check.
pub struct CheckInputs<'a, C: XPromoContext + ?Sized> {
    pub state: &'a SessionState,
    pub context: &'a C,
    /// Probed once per evaluation; `dismissal` reads through the same view.
    pub storage: CheckedStorage<'a>,
    pub dismissal: DismissalClock<'a>,
    pub policy: WindowPolicy,
}

/// One named step of the banner decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerCheck {
    Incognito,
    Storage,
    Cooldown,
}

impl BannerCheck {
    /// Evaluation order.
    pub const ORDER: [Self; 3] = [Self::Incognito, Self::Storage, Self::Cooldown];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Incognito => "incognito",
            Self::Storage => "storage",
            Self::Cooldown => "cooldown",
        }
    }

    pub fn run<C: XPromoContext + ?Sized>(&self, inputs: &CheckInputs<'_, C>) -> CheckOutcome {
        match self {
            Self::Incognito => {
                if inputs.context.is_incognito(inputs.state) {
                    CheckOutcome::Fail(IneligibilityReason::Incognito)
                } else {
                    CheckOutcome::Pass
                }
            }
            Self::Storage => {
                if inputs.storage.is_available() {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(IneligibilityReason::LocalStorageUnavailable)
                }
            }
            Self::Cooldown => {
                let explicit = match inputs.policy {
                    WindowPolicy::ExperimentAssigned => None,
                    WindowPolicy::DefaultOnly => Some(DEFAULT_ONLY_FREQUENCY),
                };
                let experiment = inputs.context.frequency_override(inputs.state);
                if inputs
                    .dismissal
                    .is_within_cooldown(StorageKey::BannerLastClosed, explicit, experiment)
                {
                    CheckOutcome::Fail(IneligibilityReason::DismissedPreviously)
                } else {
                    CheckOutcome::Pass
                }
            }
        }
    }
}

/// Run [`BannerCheck::ORDER`], stopping at the first failure.
pub fn evaluate_banner_eligibility<C: XPromoContext + ?Sized>(
    inputs: &CheckInputs<'_, C>,
) -> Eligibility {
    for check in BannerCheck::ORDER {
        if let CheckOutcome::Fail(reason) = check.run(inputs) {
            tracing::debug!(check = check.name(), reason = %reason, "xpromo banner ineligible");
            return Eligibility::Ineligible(reason);
        }
    }
    tracing::debug!("xpromo banner eligible");
    Eligibility::Eligible
}

// =============================================================================
// Listing-click snapshot
// =============================================================================

/// Initial listing-click modal state restored from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingClickSnapshot {
    pub ineligibility_reason: Option<IneligibilityReason>,
    /// Last modal click, epoch milliseconds; 0 when unknown.
    pub last_modal_click: i64,
    pub modal_dismiss_count: u32,
}

#[must_use]
pub fn listing_click_initial_state(storage: CheckedStorage<'_>) -> ListingClickSnapshot {
    let modal_dismiss_count = match storage.read(StorageKey::ModalDismissCount) {
        StoredValue::Present(raw) => parse_count(&raw),
        StoredValue::Missing | StoredValue::Unavailable => 0,
    };
    let last_modal_click = match storage.read(StorageKey::LastModalClick) {
        StoredValue::Present(raw) => match parse_stored_timestamp(&raw) {
            Some(at) => at.timestamp_millis(),
            None => {
                tracing::warn!(value = %raw, "Unparseable listing-click timestamp; using 0");
                0
            }
        },
        StoredValue::Missing | StoredValue::Unavailable => 0,
    };
    let ineligibility_reason =
        (!storage.is_available()).then_some(IneligibilityReason::LocalStorageUnavailable);

    ListingClickSnapshot {
        ineligibility_reason,
        last_modal_click,
        modal_dismiss_count,
    }
}

fn parse_count(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if let Ok(count) = trimmed.parse::<u32>() {
        return count;
    }
    // Older clients may have written "2.0".
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => {
            value.min(f64::from(u32::MAX)) as u32
        }
        _ => {
            tracing::warn!(value = %raw, "Unparseable modal dismiss count; using 0");
            0
        }
    }
}

// =============================================================================
// Interstitial type
// =============================================================================

/// Display variant of the interstitial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterstitialType {
    ListingClick,
    Persist,
    Login,
    Usual,
    Minimal,
}

impl InterstitialType {
    pub const ALL: [Self; 5] = [
        Self::ListingClick,
        Self::Persist,
        Self::Login,
        Self::Usual,
        Self::Minimal,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ListingClick => "listing_click",
            Self::Persist => "persist",
            Self::Login => "login",
            Self::Usual => "usual",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for InterstitialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InterstitialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown interstitial type: {s}. Expected one of: listing_click, persist, login, usual, minimal"
                )
            })
    }
}

/// Variant to show on the current page, if the page is eligible at all.
pub fn interstitial_type<C: XPromoContext + ?Sized>(
    state: &SessionState,
    context: &C,
) -> Option<InterstitialType> {
    if context.is_eligible_listing_page(state) {
        if state.listing_click.active {
            Some(InterstitialType::ListingClick)
        } else if context.is_xpromo_persistent(state) {
            Some(InterstitialType::Persist)
        } else if context.login_required(state) {
            Some(InterstitialType::Login)
        } else {
            Some(InterstitialType::Usual)
        }
    } else if context.is_eligible_comments_page(state) {
        Some(InterstitialType::Minimal)
    } else {
        None
    }
}

/// `interstitial_type` (and `listing_click_type` for an active listing
/// click) fields for the attribution payload.
///
/// A truthy `interstitialType` in `extra` wins over the computed type.
pub fn interstitial_data<C: XPromoContext + ?Sized>(
    state: &SessionState,
    context: &C,
    extra: &Payload,
) -> Payload {
    let kind = match extra.get(INTERSTITIAL_TYPE_OVERRIDE) {
        Some(value) if value.is_truthy() => value.clone(),
        _ => FieldValue::optional(interstitial_type(state, context).map(|t| t.as_str())),
    };
    let mut data = Payload::new().with(INTERSTITIAL_TYPE_FIELD, kind);

    if state.listing_click.active {
        if let Some(info) = &state.listing_click.click_info {
            data.set(LISTING_CLICK_TYPE_FIELD, info.listing_click_type.as_str());
        }
    }
    data
}
