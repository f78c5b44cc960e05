//! Fetch planning for tracked feeds
//!
//! Given what is known about a feed (its newest message, whether it is the
//! local operator's own), decide how much history to pull: nothing, the
//! full log, or a bounded recent window. Pure decision logic; the
//! replication stream executes the plans.

use crate::config::SyncConfig;
use crate::message::LatestMessage;
use crate::peer::FetchDirection;

use chrono::{DateTime, Utc};

/// Parameters the selector weighs.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// How many trailing messages a windowed fetch covers
    pub window: u64,
    /// Feeds whose newest message predates this cutoff are skipped
    pub recency_cutoff: chrono::Duration,
}

impl FetchPolicy {
    /// Policy for the regular sync pass, per the configuration
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            window: config.sync_window,
            recency_cutoff: config.recency_cutoff,
        }
    }
}

/// Why a feed was left out of a sync pass. Not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing is known about the feed yet
    NoKnownMessage,
    /// The feed's newest message predates the recency cutoff
    Stale,
}

/// How a planned fetch walks the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Everything from the first message on
    FullHistory,
    /// Ascending from a clamped start inside the feed
    WindowedForward,
    /// Descending from the feed's head, bounded by a limit
    WindowedReverse,
}

impl FetchMode {
    /// The stream direction this mode asks of the peer
    pub fn direction(self) -> FetchDirection {
        match self {
            FetchMode::FullHistory | FetchMode::WindowedForward => FetchDirection::Forward,
            FetchMode::WindowedReverse => FetchDirection::Reverse,
        }
    }
}

/// A resolved fetch for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// First sequence to request (0 means the whole log)
    pub start_sequence: u64,
    /// How the stream walks the feed
    pub mode: FetchMode,
    /// Whether the local copy will be a window rather than full history;
    /// the store records this so partial feeds are distinguishable later
    pub partial: bool,
}

impl FetchPlan {
    /// Plan for a bounded newest-first backfill (following a new feed,
    /// refreshing from the head)
    pub fn reverse_window() -> Self {
        Self {
            start_sequence: 0,
            mode: FetchMode::WindowedReverse,
            partial: true,
        }
    }
}

/// Outcome of planning one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Leave the feed alone this pass
    Skip(SkipReason),
    /// Fetch per the plan
    Fetch(FetchPlan),
}

/// Decide what to fetch for one feed.
///
/// Policy:
/// 1. A feed with no known last message is skipped.
/// 2. A non-self feed whose newest message predates the cutoff is skipped.
///    The operator's own feed is exempt.
/// 3. Otherwise the fetch starts `window` messages before the newest known
///    sequence, clamped to 0. The own feed always starts at 0: the local
///    log is replicated in full, never windowed.
pub fn plan_feed_fetch(
    is_self: bool,
    latest: Option<&LatestMessage>,
    policy: &FetchPolicy,
    now: DateTime<Utc>,
) -> FetchDecision {
    let Some(latest) = latest else {
        return FetchDecision::Skip(SkipReason::NoKnownMessage);
    };

    if !is_self {
        let cutoff = (now - policy.recency_cutoff).timestamp_millis();
        if latest.timestamp < cutoff {
            return FetchDecision::Skip(SkipReason::Stale);
        }
    }

    let start_sequence = if is_self {
        0
    } else {
        latest.sequence.saturating_sub(policy.window)
    };

    FetchDecision::Fetch(FetchPlan {
        start_sequence,
        mode: if start_sequence == 0 {
            FetchMode::FullHistory
        } else {
            FetchMode::WindowedForward
        },
        partial: start_sequence > 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FetchPolicy {
        FetchPolicy {
            window: 25,
            recency_cutoff: chrono::Duration::days(30),
        }
    }

    fn recent(now: DateTime<Utc>, sequence: u64) -> LatestMessage {
        LatestMessage {
            sequence,
            timestamp: now.timestamp_millis() - 1000,
        }
    }

    #[test]
    fn test_unknown_feed_is_skipped() {
        let decision = plan_feed_fetch(false, None, &policy(), Utc::now());
        assert_eq!(decision, FetchDecision::Skip(SkipReason::NoKnownMessage));
    }

    #[test]
    fn test_stale_feed_is_skipped() {
        let now = Utc::now();
        let old = LatestMessage {
            sequence: 50,
            timestamp: (now - chrono::Duration::days(60)).timestamp_millis(),
        };

        let decision = plan_feed_fetch(false, Some(&old), &policy(), now);
        assert_eq!(decision, FetchDecision::Skip(SkipReason::Stale));
    }

    #[test]
    fn test_own_feed_ignores_recency() {
        let now = Utc::now();
        let old = LatestMessage {
            sequence: 50,
            timestamp: (now - chrono::Duration::days(400)).timestamp_millis(),
        };

        match plan_feed_fetch(true, Some(&old), &policy(), now) {
            FetchDecision::Fetch(plan) => {
                assert_eq!(plan.start_sequence, 0);
                assert_eq!(plan.mode, FetchMode::FullHistory);
                assert!(!plan.partial);
            }
            other => panic!("Own feed must be fetched, got {:?}", other),
        }
    }

    #[test]
    fn test_window_start_arithmetic() {
        let now = Utc::now();
        let latest = recent(now, 130);

        match plan_feed_fetch(false, Some(&latest), &policy(), now) {
            FetchDecision::Fetch(plan) => {
                assert_eq!(plan.start_sequence, 105);
                assert_eq!(plan.mode, FetchMode::WindowedForward);
                assert!(plan.partial);
            }
            other => panic!("Expected a fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_window_start_clamps_to_zero() {
        let now = Utc::now();
        let latest = recent(now, 10);

        match plan_feed_fetch(false, Some(&latest), &policy(), now) {
            FetchDecision::Fetch(plan) => {
                assert_eq!(plan.start_sequence, 0);
                assert_eq!(plan.mode, FetchMode::FullHistory);
                assert!(!plan.partial);
            }
            other => panic!("Expected a fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_own_feed_ignores_window_clamp() {
        let now = Utc::now();
        let latest = recent(now, 500);

        match plan_feed_fetch(true, Some(&latest), &policy(), now) {
            FetchDecision::Fetch(plan) => assert_eq!(plan.start_sequence, 0),
            other => panic!("Expected a fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_mode_direction_mapping() {
        assert_eq!(FetchMode::FullHistory.direction(), FetchDirection::Forward);
        assert_eq!(
            FetchMode::WindowedForward.direction(),
            FetchDirection::Forward
        );
        assert_eq!(
            FetchMode::WindowedReverse.direction(),
            FetchDirection::Reverse
        );
    }

    #[test]
    fn test_reverse_window_plan_is_partial() {
        let plan = FetchPlan::reverse_window();
        assert_eq!(plan.mode, FetchMode::WindowedReverse);
        assert!(plan.partial);
    }
}
