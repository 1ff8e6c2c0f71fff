//! Deep-link target for a click on a listing item.

use crate::session::{Post, SessionState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Link type reported for listing-click links.
pub const LISTING_CLICK_LINK_TYPE: &str = "listing_click";

/// What part of a listing item was clicked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ListingClickType {
    Author,
    Subreddit,
    /// Any other target (post title, thumbnail, comments...).
    Other(String),
}

impl ListingClickType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Author => "author",
            Self::Subreddit => "subreddit",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ListingClickType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "author" => Self::Author,
            "subreddit" => Self::Subreddit,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ListingClickType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ListingClickType> for String {
    fn from(value: ListingClickType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ListingClickType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path the app should open for a click of `click_type` on `post`.
///
/// Promoted posts have no subreddit of their own and their permalinks do not
/// deep-link, so they send the user back to the current listing.
#[must_use]
pub fn resolve_listing_click_path(
    state: &SessionState,
    post: &Post,
    click_type: &ListingClickType,
) -> String {
    match click_type {
        ListingClickType::Author => format!("/u/{}", post.author),
        ListingClickType::Subreddit => format!("/r/{}", post.subreddit),
        ListingClickType::Other(_) if post.promoted => {
            match state
                .current_page
                .url_params
                .subreddit_name
                .as_deref()
                .filter(|name| !name.is_empty())
            {
                Some(name) => format!("/r/{name}"),
                None => "/".to_string(),
            }
        }
        ListingClickType::Other(_) => post.clean_permalink.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(promoted: bool) -> Post {
        Post {
            author: "alice".to_string(),
            subreddit: "foo".to_string(),
            promoted,
            clean_permalink: "/r/foo/comments/abc/title/".to_string(),
        }
    }

    fn state_with_subreddit(name: Option<&str>) -> SessionState {
        let mut state = SessionState::default();
        state.current_page.url_params.subreddit_name = name.map(str::to_string);
        state
    }

    #[test]
    fn author_and_subreddit_targets() {
        let state = SessionState::default();
        assert_eq!(
            resolve_listing_click_path(&state, &post(false), &ListingClickType::Author),
            "/u/alice"
        );
        assert_eq!(
            resolve_listing_click_path(&state, &post(true), &ListingClickType::Subreddit),
            "/r/foo"
        );
    }

    #[test]
    fn promoted_post_uses_current_listing() {
        let click = ListingClickType::from("post");
        assert_eq!(
            resolve_listing_click_path(&state_with_subreddit(Some("bar")), &post(true), &click),
            "/r/bar"
        );
        assert_eq!(
            resolve_listing_click_path(&state_with_subreddit(None), &post(true), &click),
            "/"
        );
    }

    #[test]
    fn organic_post_uses_permalink_verbatim() {
        let click = ListingClickType::from("thumbnail");
        assert_eq!(
            resolve_listing_click_path(&state_with_subreddit(Some("bar")), &post(false), &click),
            "/r/foo/comments/abc/title/"
        );
    }

    #[test]
    fn click_type_string_conversions() {
        assert_eq!(ListingClickType::from("author"), ListingClickType::Author);
        assert_eq!(ListingClickType::from("subreddit"), ListingClickType::Subreddit);
        assert_eq!(
            ListingClickType::from("comments"),
            ListingClickType::Other("comments".to_string())
        );
        let json = serde_json::to_string(&ListingClickType::Author).unwrap();
        assert_eq!(json, "\"author\"");
    }
}
