//! Scoring policy and ranking helpers shared by every strategy.
//!
//! The weights and windows here are tunable policy. Only the ordering rule in
//! [`rank`] is fixed: descending score, ties by ascending product id.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{EventKind, InteractionEvent, ProductId, Reason, Recommendation};

/// Tunable weights and windows for the recommendation strategies
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    /// Trailing window counted by `popular`
    pub popular_window: Duration,
    /// How far back `similar` looks for co-occurring interactions
    pub similar_lookback: Duration,
    /// How much of a user's history `forYou` reads
    pub history_window: Duration,
    /// Age at which an event counts half as much as a fresh one
    pub decay_half_life_hours: f64,
    /// Score per distinct co-occurring user in `similar`
    pub co_occurrence_weight: f64,
    /// Flat bonus for sharing the subject's category in `similar`
    pub category_bonus: f64,
    /// Bonus scaled by price proximity for same-category candidates
    pub price_bonus: f64,
    /// Bonus scaled by condition proximity for same-category candidates
    pub condition_bonus: f64,
    /// Share of normalized popularity blended into `forYou` scores
    pub popularity_boost: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            popular_window: Duration::days(7),
            similar_lookback: Duration::days(30),
            history_window: Duration::days(90),
            decay_half_life_hours: 72.0,
            co_occurrence_weight: 1.0,
            category_bonus: 0.5,
            price_bonus: 0.25,
            condition_bonus: 0.1,
            popularity_boost: 0.25,
        }
    }
}

impl ScoringPolicy {
    /// Exponential age decay in `(0, 1]`; events from the future count fully
    pub fn decay(&self, occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - occurred_at).num_seconds().max(0) as f64 / 3600.0;
        0.5_f64.powf(age_hours / self.decay_half_life_hours)
    }

    /// Strength of a single event before decay
    pub fn event_strength(&self, event: &InteractionEvent) -> f64 {
        kind_weight(event.kind) * event.weight.unwrap_or(1.0).max(0.0)
    }
}

/// Relative strength of each interaction kind; purchases weigh the most
pub fn kind_weight(kind: EventKind) -> f64 {
    match kind {
        EventKind::View => 1.0,
        EventKind::Rating => 2.0,
        EventKind::Wishlist => 3.0,
        EventKind::Purchase => 5.0,
    }
}

/// Orders candidates and keeps at most `limit`
pub fn rank(candidates: HashMap<ProductId, (f64, Reason)>, limit: usize) -> Vec<Recommendation> {
    let mut items: Vec<Recommendation> = candidates
        .into_iter()
        .map(|(product_id, (score, reason))| Recommendation {
            product_id,
            score,
            reason,
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    items.truncate(limit);
    items
}
