//! Serialized session/page state and the identity derived from it.
//!
//! [`SessionState`] is the JSON shape the CLI reads and the reference
//! collaborators consult. Field names are camelCase on the wire.

use crate::config::CookieConfig;
use crate::dismissal::Frequency;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account key holding the authenticated-session record.
pub const ME_ACCOUNT: &str = "me";

/// Snapshot of the client session a link or verdict is computed for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionState {
    pub current_page: CurrentPage,
    /// Account records keyed by user name, plus [`ME_ACCOUNT`].
    pub accounts: BTreeMap<String, AccountRecord>,
    pub user: UserInfo,
    /// Known posts keyed by post id.
    pub posts: BTreeMap<String, Post>,
    pub listing_click: ListingClickState,
    /// User opted out of cross-promotion (incognito browsing).
    pub incognito: bool,
    /// Answers for the reference collaborators.
    pub context: PageContext,
}

impl SessionState {
    #[must_use]
    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.get(post_id)
    }

    /// Record for the logged-in user, if any.
    #[must_use]
    pub fn user_account(&self) -> Option<&AccountRecord> {
        if self.user.logged_out {
            return None;
        }
        self.user
            .name
            .as_deref()
            .and_then(|name| self.accounts.get(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurrentPage {
    pub url: String,
    pub url_params: UrlParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UrlParams {
    pub subreddit_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub loid: Option<String>,
    pub loid_created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserInfo {
    pub name: Option<String>,
    pub logged_out: bool,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            name: None,
            logged_out: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Post {
    pub author: String,
    pub subreddit: String,
    pub promoted: bool,
    pub clean_permalink: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListingClickState {
    pub active: bool,
    pub click_info: Option<ClickInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClickInfo {
    pub listing_click_type: String,
}

/// Experiment bucket the session is assigned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExperimentAssignment {
    pub experiment_name: Option<String>,
    pub experiment_variant: Option<String>,
}

impl ExperimentAssignment {
    /// Name and variant, when both are present and non-empty.
    #[must_use]
    pub fn complete(&self) -> Option<(&str, &str)> {
        let name = self.experiment_name.as_deref().filter(|s| !s.is_empty())?;
        let variant = self.experiment_variant.as_deref().filter(|s| !s.is_empty())?;
        Some((name, variant))
    }
}

/// Precomputed collaborator answers carried alongside the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageContext {
    pub eligible_listing_page: bool,
    pub eligible_comments_page: bool,
    pub persistent: bool,
    pub login_required: bool,
    pub experiment: Option<ExperimentAssignment>,
    pub frequency_override: Option<Frequency>,
    pub tags: Vec<String>,
    pub base_fields: Payload,
    pub subreddit_fields: Payload,
    pub screen_view_fields: Payload,
}

// =============================================================================
// Cookies and identity
// =============================================================================

/// Read access to the browser cookie store.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Cookie jar backed by a plain map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapCookieJar {
    cookies: BTreeMap<String, String>,
}

impl MapCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapCookieJar {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            cookies: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CookieJar for MapCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }
}

/// Who the link is being built for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub loid: Option<String>,
    pub loid_created: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl SessionIdentity {
    /// Derive the identity for `state`.
    ///
    /// Logged-out ids come from the `me` account when present (even if its
    /// fields are empty), otherwise from cookies.
    pub fn resolve(state: &SessionState, cookies: &dyn CookieJar, names: &CookieConfig) -> Self {
        let (loid, loid_created) = match state.accounts.get(ME_ACCOUNT) {
            Some(me) => (me.loid.clone(), me.loid_created.clone()),
            None => (cookies.get(&names.loid), cookies.get(&names.loid_created)),
        };

        let (user_id, user_name) = state
            .user_account()
            .map(|account| (account.id.clone(), account.name.clone()))
            .unwrap_or_default();

        Self {
            loid,
            loid_created,
            user_id,
            user_name,
        }
    }
}
