use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::{ProductId, UserId};

/// Kind of user/product interaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    View,
    Purchase,
    Wishlist,
    Rating,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::View => "view",
            EventKind::Purchase => "purchase",
            EventKind::Wishlist => "wishlist",
            EventKind::Rating => "rating",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(EventKind::View),
            "purchase" => Ok(EventKind::Purchase),
            "wishlist" => Ok(EventKind::Wishlist),
            "rating" => Ok(EventKind::Rating),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// One append-only entry of the interaction log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    /// Optional multiplier, e.g. the star value of a rating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl InteractionEvent {
    pub fn new(
        user_id: UserId,
        product_id: ProductId,
        kind: EventKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            product_id,
            kind,
            occurred_at,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}
