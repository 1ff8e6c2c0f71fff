//! Dismissal clock: cooldown windows derived from persisted timestamps.
//!
//! A dismissal (banner close or listing-click) persists a timestamp. The
//! interstitial stays suppressed while `closing time + closing window > now`.
//! When storage cannot be trusted the closing time is unbounded, which keeps
//! the cooldown permanently active.

use crate::clock::Clock;
use crate::storage::{CheckedStorage, StorageKey, StoredValue};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Window of the experiment-independent dismissal checks. Not configurable.
pub const DEFAULT_ONLY_FREQUENCY: Frequency = Frequency::EveryTwoWeeks;

/// Named recurrence frequencies an experiment (or config) can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    EveryHour,
    EveryDay,
    EveryThreeDays,
    EveryWeek,
    EveryTwoWeeks,
}

impl Frequency {
    pub const ALL: [Self; 5] = [
        Self::EveryHour,
        Self::EveryDay,
        Self::EveryThreeDays,
        Self::EveryWeek,
        Self::EveryTwoWeeks,
    ];

    /// Length of the closing window for this frequency.
    #[must_use]
    pub fn window(&self) -> TimeDelta {
        match self {
            Self::EveryHour => TimeDelta::hours(1),
            Self::EveryDay => TimeDelta::days(1),
            Self::EveryThreeDays => TimeDelta::days(3),
            Self::EveryWeek => TimeDelta::weeks(1),
            Self::EveryTwoWeeks => TimeDelta::weeks(2),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EveryHour => "every_hour",
            Self::EveryDay => "every_day",
            Self::EveryThreeDays => "every_three_days",
            Self::EveryWeek => "every_week",
            Self::EveryTwoWeeks => "every_two_weeks",
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::EveryTwoWeeks
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|freq| freq.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown frequency: {s}. Expected one of: every_hour, every_day, every_three_days, every_week, every_two_weeks"
                )
            })
    }
}

/// When a dismissal last happened, as far as storage can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosingTime {
    /// Storage works but nothing was recorded; equivalent to the epoch.
    Never,
    At(DateTime<Utc>),
    /// Storage is unavailable; treat the dismissal as infinitely recent.
    Unbounded,
}

impl ClosingTime {
    /// Milliseconds since the epoch; `+inf` when unbounded.
    #[must_use]
    pub fn epoch_millis(&self) -> f64 {
        match self {
            Self::Never => 0.0,
            Self::At(at) => at.timestamp_millis() as f64,
            Self::Unbounded => f64::INFINITY,
        }
    }

    /// Whether `self + window` lies strictly after `now`.
    #[must_use]
    pub fn cooldown_active(&self, window: TimeDelta, now: DateTime<Utc>) -> bool {
        let closed_at = match self {
            Self::Unbounded => return true,
            Self::Never => DateTime::UNIX_EPOCH,
            Self::At(at) => *at,
        };
        match closed_at.checked_add_signed(window) {
            Some(limit) => limit > now,
            // Overflowing the representable range is still "in the future".
            None => true,
        }
    }
}

/// Parse a persisted timestamp.
///
/// Accepts RFC 3339 (what this crate writes), bare epoch milliseconds, and the
/// JavaScript `Date.toString()` shape older clients persisted.
#[must_use]
pub fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    // "Tue Mar 05 2024 10:00:00 GMT+0000 (Coordinated Universal Time)"
    let without_zone_name = raw.split(" (").next().unwrap_or(raw);
    DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z")
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Reads dismissal timestamps through the storage gate and evaluates
/// cooldowns against an injected clock.
#[derive(Debug, Clone, Copy)]
pub struct DismissalClock<'a> {
    storage: CheckedStorage<'a>,
    clock: &'a dyn Clock,
    default_frequency: Frequency,
}

impl<'a> DismissalClock<'a> {
    #[must_use]
    pub fn new(
        storage: CheckedStorage<'a>,
        clock: &'a dyn Clock,
        default_frequency: Frequency,
    ) -> Self {
        Self {
            storage,
            clock,
            default_frequency,
        }
    }

    /// Stored closing time for `key`.
    pub fn closing_timestamp(&self, key: StorageKey) -> ClosingTime {
        match self.storage.read(key) {
            StoredValue::Unavailable => ClosingTime::Unbounded,
            StoredValue::Missing => ClosingTime::Never,
            StoredValue::Present(raw) => match parse_stored_timestamp(&raw) {
                Some(at) => ClosingTime::At(at),
                None => {
                    tracing::warn!(key = %key, value = %raw, "Unparseable dismissal timestamp; ignoring it");
                    ClosingTime::Never
                }
            },
        }
    }

    /// Closing window: explicit range, else the experiment's, else the default.
    #[must_use]
    pub fn closing_window(
        &self,
        explicit: Option<Frequency>,
        experiment: Option<Frequency>,
    ) -> TimeDelta {
        explicit
            .or(experiment)
            .unwrap_or(self.default_frequency)
            .window()
    }

    /// Whether the cooldown recorded under `key` is still running.
    pub fn is_within_cooldown(
        &self,
        key: StorageKey,
        explicit: Option<Frequency>,
        experiment: Option<Frequency>,
    ) -> bool {
        let closed = self.closing_timestamp(key);
        let window = self.closing_window(explicit, experiment);
        let active = closed.cooldown_active(window, self.clock.now());
        tracing::debug!(
            key = %key,
            closed_at_ms = closed.epoch_millis(),
            window_ms = window.num_milliseconds(),
            active,
            "Evaluated dismissal cooldown"
        );
        active
    }
}
