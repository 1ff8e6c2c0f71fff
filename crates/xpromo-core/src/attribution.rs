//! Builders for the two halves of an attribution payload.
//!
//! The caller-facing half ([`build_attribution_payload`]) describes why the
//! link was shown. The base half ([`build_base_payload`]) describes where it
//! leads and who followed it. [`crate::payload::finalize_payload`] joins them.

use crate::collaborators::XPromoContext;
use crate::config::LinksConfig;
use crate::eligibility::interstitial_data;
use crate::payload::{FieldSource, FieldValue, Payload, UTM_CONTENT, merge_sources};
use crate::session::{SessionIdentity, SessionState};

pub const UTM_SOURCE: &str = "xpromo";
pub const CHANNEL: &str = "mweb_branch";
pub const FEATURE: &str = "xpromo";
pub const CAMPAIGN: &str = "xpromo";

pub const MEDIUM_EXPERIMENT: &str = "experiment";
pub const MEDIUM_INTERSTITIAL: &str = "interstitial";

/// Fields describing why the link was shown.
///
/// Sources, last-wins: `utm_source`/`utm_content`, interstitial data,
/// `extra`, experiment attribution, screen-view fields.
pub fn build_attribution_payload<C: XPromoContext + ?Sized>(
    state: &SessionState,
    context: &C,
    link_type: &str,
    extra: &Payload,
) -> Payload {
    let defaults = Payload::new()
        .with("utm_source", UTM_SOURCE)
        .with(UTM_CONTENT, link_type);

    merge_sources(&[
        FieldSource::new("defaults", defaults),
        FieldSource::new("interstitial", interstitial_data(state, context, extra)),
        FieldSource::new("extra", extra.clone()),
        FieldSource::new("experiment", experiment_fields(state, context)),
        FieldSource::new("screen_view", context.screen_view_fields(state)),
    ])
}

/// `utm_name`/`utm_term`/`utm_medium=experiment` for a complete experiment
/// assignment, otherwise only `utm_medium=interstitial`.
pub fn experiment_fields<C: XPromoContext + ?Sized>(state: &SessionState, context: &C) -> Payload {
    let assignment = context.experiment(state);
    match assignment.as_ref().and_then(|a| a.complete()) {
        Some((name, variant)) => Payload::new()
            .with("utm_name", name)
            .with("utm_term", variant)
            .with("utm_medium", MEDIUM_EXPERIMENT),
        None => Payload::new().with("utm_medium", MEDIUM_INTERSTITIAL),
    }
}

/// Fields describing the link target and the session.
///
/// Sources, last-wins: constants, deep-link paths and identity; base event
/// fields; subreddit fields.
pub fn build_base_payload<C: XPromoContext + ?Sized>(
    state: &SessionState,
    context: &C,
    identity: &SessionIdentity,
    links: &LinksConfig,
    path: &str,
) -> Payload {
    let fixed = Payload::new()
        .with("channel", CHANNEL)
        .with("feature", FEATURE)
        .with("campaign", CAMPAIGN)
        .with("$og_redirect", format!("{}{path}", links.origin))
        .with("$deeplink_path", path)
        .with(
            "$android_deeplink_path",
            format!("{}{path}", links.android_scheme_prefix),
        )
        .with("mweb_loid", FieldValue::optional(identity.loid.clone()))
        .with(
            "mweb_loid_created",
            FieldValue::optional(identity.loid_created.clone()),
        )
        .with("mweb_user_id36", FieldValue::optional(identity.user_id.clone()))
        .with("mweb_user_name", FieldValue::optional(identity.user_name.clone()));

    merge_sources(&[
        FieldSource::new("fixed", fixed),
        FieldSource::new("base_event", context.base_fields(state)),
        FieldSource::new("subreddit", context.subreddit_fields(state)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticContext;
    use crate::session::ExperimentAssignment;

    fn experiment(name: &str, variant: &str) -> ExperimentAssignment {
        ExperimentAssignment {
            experiment_name: Some(name.to_string()),
            experiment_variant: Some(variant.to_string()),
        }
    }

    #[test]
    fn attribution_without_experiment_is_interstitial() {
        let state = SessionState::default();
        let payload = build_attribution_payload(&state, &StaticContext, "usual", &Payload::new());

        assert_eq!(payload.get_str("utm_source").as_deref(), Some("xpromo"));
        assert_eq!(payload.get_str(UTM_CONTENT).as_deref(), Some("usual"));
        assert_eq!(payload.get_str("utm_medium").as_deref(), Some("interstitial"));
        assert!(!payload.contains_key("utm_name"));
        assert!(!payload.contains_key("utm_term"));
    }

    #[test]
    fn attribution_with_experiment() {
        let mut state = SessionState::default();
        state.context.experiment = Some(experiment("mweb_xpromo_banner", "treatment_1"));
        let payload = build_attribution_payload(&state, &StaticContext, "usual", &Payload::new());

        assert_eq!(payload.get_str("utm_name").as_deref(), Some("mweb_xpromo_banner"));
        assert_eq!(payload.get_str("utm_term").as_deref(), Some("treatment_1"));
        assert_eq!(payload.get_str("utm_medium").as_deref(), Some("experiment"));
    }

    #[test]
    fn incomplete_experiment_counts_as_absent() {
        let mut state = SessionState::default();
        state.context.experiment = Some(ExperimentAssignment {
            experiment_name: Some("mweb_xpromo_banner".to_string()),
            experiment_variant: None,
        });
        let fields = experiment_fields(&state, &StaticContext);
        assert_eq!(fields.keys(), vec!["utm_medium"]);
    }

    #[test]
    fn screen_view_fields_win_over_experiment() {
        let mut state = SessionState::default();
        state.context.experiment = Some(experiment("exp", "v1"));
        state.context.screen_view_fields = Payload::new().with("utm_medium", "override");
        let payload = build_attribution_payload(&state, &StaticContext, "usual", &Payload::new());
        assert_eq!(payload.get_str("utm_medium").as_deref(), Some("override"));
    }

    #[test]
    fn extra_fields_override_interstitial_data() {
        let mut state = SessionState::default();
        state.context.eligible_comments_page = true;
        let extra = Payload::new().with("interstitial_type", "usual");
        let payload = build_attribution_payload(&state, &StaticContext, "usual", &extra);
        assert_eq!(payload.get_str("interstitial_type").as_deref(), Some("usual"));
        assert_eq!(
            payload.keys(),
            vec!["utm_source", "utm_content", "interstitial_type", "utm_medium"]
        );
    }

    #[test]
    fn base_payload_paths_and_identity() {
        let state = SessionState::default();
        let identity = SessionIdentity {
            loid: Some("L1".to_string()),
            loid_created: None,
            user_id: Some("t2_1".to_string()),
            user_name: Some("alice".to_string()),
        };
        let payload = build_base_payload(
            &state,
            &StaticContext,
            &identity,
            &LinksConfig::default(),
            "/r/pics",
        );

        assert_eq!(
            payload.keys(),
            vec![
                "channel",
                "feature",
                "campaign",
                "$og_redirect",
                "$deeplink_path",
                "$android_deeplink_path",
                "mweb_loid",
                "mweb_loid_created",
                "mweb_user_id36",
                "mweb_user_name",
            ]
        );
        assert_eq!(
            payload.get_str("$og_redirect").as_deref(),
            Some("https://www.reddit.com/r/pics")
        );
        assert_eq!(
            payload.get_str("$android_deeplink_path").as_deref(),
            Some("reddit/r/pics")
        );
        assert_eq!(payload.get("mweb_loid_created"), Some(&FieldValue::Empty));
        assert_eq!(payload.get_str("mweb_user_name").as_deref(), Some("alice"));
    }

    #[test]
    fn subreddit_fields_override_base_event_fields() {
        let mut state = SessionState::default();
        state.context.base_fields = Payload::new()
            .with("sr_name", "base")
            .with("campaign", "spring");
        state.context.subreddit_fields = Payload::new().with("sr_name", "pics");

        let payload = build_base_payload(
            &state,
            &StaticContext,
            &SessionIdentity::default(),
            &LinksConfig::default(),
            "/",
        );
        assert_eq!(payload.get_str("sr_name").as_deref(), Some("pics"));
        assert_eq!(payload.get_str("campaign").as_deref(), Some("spring"));
    }
}
