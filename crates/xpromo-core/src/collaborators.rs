//! Narrow interfaces to the systems xpromo decisions depend on.
//!
//! Page eligibility, experiment bucketing, analytics payload fields and tag
//! extraction are owned elsewhere. The core only consumes their answers.
//! [`StaticContext`] answers every question from [`SessionState::context`],
//! which is what the CLI and tests drive.

use crate::dismissal::Frequency;
use crate::payload::Payload;
use crate::session::{ExperimentAssignment, SessionState};

/// Experiment bucket lookup.
pub trait ExperimentOracle {
    /// Current xpromo experiment assignment, if any.
    fn experiment(&self, state: &SessionState) -> Option<ExperimentAssignment>;

    /// Dismissal frequency selected by the experiment, if any.
    fn frequency_override(&self, state: &SessionState) -> Option<Frequency>;
}

/// Page-level predicates.
pub trait PagePredicates {
    fn is_eligible_listing_page(&self, state: &SessionState) -> bool;
    fn is_eligible_comments_page(&self, state: &SessionState) -> bool;
    fn is_xpromo_persistent(&self, state: &SessionState) -> bool;
    fn login_required(&self, state: &SessionState) -> bool;

    /// User opted out of cross-promotion.
    fn is_incognito(&self, state: &SessionState) -> bool {
        state.incognito
    }
}

/// Contextual analytics fields folded into the payload.
pub trait ContextProviders {
    fn base_fields(&self, state: &SessionState) -> Payload;
    fn subreddit_fields(&self, state: &SessionState) -> Payload;
    fn screen_view_fields(&self, state: &SessionState) -> Payload;
}

/// Ordered attribution tags for the session.
pub trait TagExtractor {
    fn extract_tags(&self, state: &SessionState) -> Vec<String>;
}

/// Everything the xpromo facade consults.
pub trait XPromoContext:
    ExperimentOracle + PagePredicates + ContextProviders + TagExtractor + Send + Sync
{
}

impl<T> XPromoContext for T where
    T: ExperimentOracle + PagePredicates + ContextProviders + TagExtractor + Send + Sync
{
}

/// Collaborators answered from the precomputed [`crate::session::PageContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticContext;

impl ExperimentOracle for StaticContext {
    fn experiment(&self, state: &SessionState) -> Option<ExperimentAssignment> {
        state.context.experiment.clone()
    }

    fn frequency_override(&self, state: &SessionState) -> Option<Frequency> {
        state.context.frequency_override
    }
}

impl PagePredicates for StaticContext {
    fn is_eligible_listing_page(&self, state: &SessionState) -> bool {
        state.context.eligible_listing_page
    }

    fn is_eligible_comments_page(&self, state: &SessionState) -> bool {
        state.context.eligible_comments_page
    }

    fn is_xpromo_persistent(&self, state: &SessionState) -> bool {
        state.context.persistent
    }

    fn login_required(&self, state: &SessionState) -> bool {
        state.context.login_required
    }
}

impl ContextProviders for StaticContext {
    fn base_fields(&self, state: &SessionState) -> Payload {
        state.context.base_fields.clone()
    }

    fn subreddit_fields(&self, state: &SessionState) -> Payload {
        state.context.subreddit_fields.clone()
    }

    fn screen_view_fields(&self, state: &SessionState) -> Payload {
        state.context.screen_view_fields.clone()
    }
}

impl TagExtractor for StaticContext {
    fn extract_tags(&self, state: &SessionState) -> Vec<String> {
        state.context.tags.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_context<C: XPromoContext>(_: &C) {}

    #[test]
    fn static_context_reads_page_context() {
        let mut state = SessionState::default();
        state.context.eligible_comments_page = true;
        state.context.tags = vec!["a".to_string()];
        state.context.frequency_override = Some(Frequency::EveryWeek);
        state.incognito = true;

        let ctx = StaticContext;
        assert_context(&ctx);
        assert!(ctx.is_eligible_comments_page(&state));
        assert!(!ctx.is_eligible_listing_page(&state));
        assert!(ctx.is_incognito(&state));
        assert_eq!(ctx.extract_tags(&state), vec!["a".to_string()]);
        assert_eq!(ctx.frequency_override(&state), Some(Frequency::EveryWeek));
        assert!(ctx.experiment(&state).is_none());
    }
}
