//! Candidate-rule caching keyed by `(factory_id, device_id)`, per §4.6 step
//! 1: cache with a short TTL, invalidate on rule CRUD events published on
//! the shared cache's invalidation channel.

use std::sync::Arc;
use std::time::Duration;

use factoryops_core::{DeviceId, FactoryId, Rule};
use factoryops_state::{keys, SharedCache};
use factoryops_store::RelationalStore;
use futures::StreamExt;
use moka::future::Cache;

use crate::error::AlertingError;

/// TTL for a cached candidate-rule set. Short because rule CRUD is rare but
/// must be reflected quickly once it happens.
const RULE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Caches the candidate-rule set the alerting worker would otherwise query
/// for every task.
pub struct RuleCache<S: ?Sized> {
    local: Cache<(i64, i64), Arc<Vec<Rule>>>,
    store: Arc<S>,
}

impl<S> RuleCache<S>
where
    S: RelationalStore + ?Sized + 'static,
{
    /// Build a cache over a relational store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            local: Cache::builder().time_to_live(RULE_CACHE_TTL).build(),
            store,
        }
    }

    /// The candidate rule set for `(factory_id, device_id)`, querying the
    /// store on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns a transient or permanent store error if the query fails.
    pub async fn candidate_rules(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Arc<Vec<Rule>>, AlertingError> {
        let key = (factory_id.get(), device_id.get());
        if let Some(rules) = self.local.get(&key).await {
            return Ok(rules);
        }
        let rules = Arc::new(self.store.candidate_rules(factory_id, device_id).await?);
        self.local.insert(key, Arc::clone(&rules)).await;
        Ok(rules)
    }

    /// Drop the cached entry for one `(factory_id, device_id)` pair.
    pub async fn invalidate(&self, factory_id: FactoryId, device_id: DeviceId) {
        self.local.invalidate(&(factory_id.get(), device_id.get())).await;
    }

    /// Drop every cached entry. Used when an invalidation event does not
    /// carry enough detail to target a single pair (a rule's `device_ids`
    /// change, for example, can affect any device in the factory).
    pub async fn invalidate_all(&self) {
        self.local.invalidate_all();
    }
}

/// Spawn a task that subscribes to the shared cache's invalidation channel
/// and drops the whole rule cache whenever a `rules:`-prefixed key is
/// published, since the out-of-scope rule-management API is the only
/// publisher and does not target individual `(factory_id, device_id)` pairs.
pub fn spawn_invalidation_listener<C, S>(shared: Arc<C>, cache: Arc<RuleCache<S>>)
where
    C: SharedCache + ?Sized + 'static,
    S: RelationalStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        loop {
            match shared.subscribe(keys::INVALIDATION_CHANNEL).await {
                Ok(mut stream) => {
                    while let Some(message) = stream.next().await {
                        if message.starts_with("rules:") {
                            cache.invalidate_all().await;
                        }
                    }
                    tracing::warn!("rule cache invalidation subscription ended; resubscribing");
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to subscribe to invalidation channel; retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_store::InMemoryStore;

    fn overheat_rule() -> Rule {
        use factoryops_core::{Comparator, ConditionTree, NotificationChannel, RuleId, RuleScope, ScheduleConfig, ScheduleType, Severity};
        Rule {
            id: RuleId::new(1),
            factory_id: FactoryId::new(1),
            name: "Overheat".into(),
            description: None,
            scope: RuleScope::Global,
            conditions: ConditionTree::Leaf {
                parameter: "spindle_temp".into(),
                op: Comparator::Gt,
                threshold: 80.0,
            },
            cooldown_minutes: 15,
            is_active: true,
            schedule_type: ScheduleType::Always,
            schedule_config: ScheduleConfig::default(),
            severity: Severity::Critical,
            notification_channels: vec![NotificationChannel::Email],
            device_ids: vec![],
        }
    }

    #[tokio::test]
    async fn caches_candidate_rules_across_calls() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_rule(overheat_rule());
        let cache = RuleCache::new(Arc::clone(&store));

        let first = cache.candidate_rules(FactoryId::new(1), DeviceId::new(1)).await.unwrap();
        assert_eq!(first.len(), 1);

        // A rule added after the first read must not appear until invalidated.
        let mut second_rule = overheat_rule();
        second_rule.id = factoryops_core::RuleId::new(2);
        store.seed_rule(second_rule);
        let second = cache.candidate_rules(FactoryId::new(1), DeviceId::new(1)).await.unwrap();
        assert_eq!(second.len(), 1);

        cache.invalidate_all().await;
        let third = cache.candidate_rules(FactoryId::new(1), DeviceId::new(1)).await.unwrap();
        assert_eq!(third.len(), 2);
    }
}
