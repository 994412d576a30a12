//! Canonical shared-cache key formats, matching the persisted-state layout
//! in the system specification verbatim so operators can correlate cache
//! contents with it.

/// `slug:{s} -> factory_id`.
#[must_use]
pub fn factory_slug(slug: &str) -> String {
    format!("slug:{slug}")
}

/// `dev:{fid}:{key} -> device_id`.
#[must_use]
pub fn device_key(factory_id: i64, device_key: &str) -> String {
    format!("dev:{factory_id}:{device_key}")
}

/// `params:{device_id} -> set<string>`.
#[must_use]
pub fn device_params(device_id: i64) -> String {
    format!("params:{device_id}")
}

/// `last_seen:{device_id} -> RFC3339`.
#[must_use]
pub fn last_seen(device_id: i64) -> String {
    format!("last_seen:{device_id}")
}

/// `rules:{fid}:{device_id} -> [rule_id...]`.
#[must_use]
pub fn rule_set(factory_id: i64, device_id: i64) -> String {
    format!("rules:{factory_id}:{device_id}")
}

/// Pub/sub channel used for cache-invalidation events. Every CRUD write
/// from the API layer publishes an invalidated key on this channel so
/// other worker processes' in-process caches drop it within seconds.
pub const INVALIDATION_CHANNEL: &str = "factoryops:cache-invalidate";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_spec_layout() {
        assert_eq!(factory_slug("vpc"), "slug:vpc");
        assert_eq!(device_key(1, "M01"), "dev:1:M01");
        assert_eq!(device_params(42), "params:42");
        assert_eq!(last_seen(42), "last_seen:42");
        assert_eq!(rule_set(1, 42), "rules:1:42");
    }
}
