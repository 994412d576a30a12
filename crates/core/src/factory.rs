//! The tenant root entity.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::FactoryId;

/// A factory is the tenant boundary: every other entity in the relational
/// store belongs to exactly one factory, and every query is scoped to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factory {
    /// Stable numeric identifier.
    pub id: FactoryId,
    /// Unique, URL-safe slug used in MQTT topics and API routes (≤100 chars).
    pub slug: String,
    /// Display name.
    pub name: String,
    /// IANA timezone used to evaluate schedule predicates for this factory's rules.
    pub timezone: Tz,
    /// Soft-delete flag; factories are never hard-deleted.
    pub is_active: bool,
}

/// Maximum length of a factory slug, per the data model.
pub const MAX_SLUG_LEN: usize = 100;

/// Validate a candidate slug: non-empty, URL-safe, within length bounds.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("vpc"));
        assert!(is_valid_slug("plant-01"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Has Space"));
        assert!(!is_valid_slug(&"a".repeat(101)));
    }
}
