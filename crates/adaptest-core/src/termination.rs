//! Stop rules evaluated after every accepted response.

use crate::config::TerminationConfig;
use crate::session::{Session, SessionStatus};

/// Decide whether `session` should stop now.
///
/// Checked in order, first match wins:
/// 1. global elapsed time reached the limit (forced, ignores precision);
/// 2. responses reached `max_items`;
/// 3. SE at or below the precision threshold with at least `min_items`
///    responses.
pub fn evaluate(session: &Session) -> Option<SessionStatus> {
    let rules = &session.config.termination;
    let answered = session.responses.len();

    if time_exhausted(rules, session.elapsed_ms) {
        return Some(SessionStatus::CompletedByTimeout);
    }
    if answered >= rules.max_items {
        return Some(SessionStatus::CompletedByItemLimit);
    }
    if answered >= rules.min_items && session.ability.se <= rules.precision_threshold {
        return Some(SessionStatus::CompletedByPrecision);
    }
    None
}

/// Whether `elapsed_ms` has reached the global time limit.
pub fn time_exhausted(rules: &TerminationConfig, elapsed_ms: u64) -> bool {
    elapsed_ms >= rules.time_limit_secs.saturating_mul(1000)
}

/// Per-item limit in milliseconds, honoring an item override.
pub fn item_time_limit_ms(rules: &TerminationConfig, item_override_secs: Option<u64>) -> u64 {
    item_override_secs
        .unwrap_or(rules.default_item_time_limit_secs)
        .saturating_mul(1000)
}
