//! Event-type pattern matching.
//!
//! A subscription pattern is a literal type (`order.created`), a trailing
//! wildcard (`order.*`), or the universal wildcard (`*`). How much of the
//! type a trailing wildcard may swallow is configurable: `Segment` accepts
//! exactly one extra segment, `Prefix` accepts any dotted suffix.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DeliveryError;

/// Matching semantics for trailing `.*` wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardScope {
    /// `order.*` matches `order.created` but not `order.created.v2`.
    #[default]
    Segment,
    /// `order.*` matches any type beginning with `order.`.
    Prefix,
}

impl FromStr for WildcardScope {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "segment" => Ok(Self::Segment),
            "prefix" => Ok(Self::Prefix),
            _ => Err(DeliveryError::ConfigInvalid {
                var: "HOOKRELAY_WILDCARD_MATCH".to_string(),
                reason: format!("expected \"segment\" or \"prefix\", got {s:?}"),
            }),
        }
    }
}

/// Check whether a subscription pattern matches an event type.
#[must_use]
pub fn matches(pattern: &str, event_type: &str, scope: WildcardScope) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(stem) = pattern.strip_suffix(".*") {
        let Some(rest) = event_type
            .strip_prefix(stem)
            .and_then(|r| r.strip_prefix('.'))
        else {
            return false;
        };
        return match scope {
            WildcardScope::Segment => !rest.is_empty() && !rest.contains('.'),
            WildcardScope::Prefix => !rest.is_empty(),
        };
    }

    pattern == event_type
}
