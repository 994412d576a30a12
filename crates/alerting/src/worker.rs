//! The alerting worker (C6): consumes `rule_engine` tasks, evaluates
//! candidate rules, and atomically commits alert + cooldown on a fire,
//! per §4.6's numbered steps.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use factoryops_core::alert::render_message;
use factoryops_core::{ConditionTree, DeviceId, FactoryId, MetricValue, Rule};
use factoryops_queue::{QueueName, WorkQueue};
use factoryops_rules::{evaluate, Verdict};
use factoryops_store::{NewAlert, RelationalStore};
use serde::{Deserialize, Serialize};

use crate::error::AlertingError;
use crate::rule_cache::RuleCache;

/// One unit of work consumed from the `rule_engine` queue: everything
/// needed to evaluate every candidate rule for one telemetry message.
/// Deserialized directly from the payload the ingestion coordinator
/// submits, so field names and types must track
/// `factoryops_ingest::RuleEngineTask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvalTask {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Reporting device.
    pub device_id: DeviceId,
    /// The message's validated metrics.
    pub metrics: MetricValue,
    /// The message's effective timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Evaluates candidate rules for one task and commits any that fire.
pub struct AlertingWorker<S: ?Sized> {
    store: Arc<S>,
    rule_cache: Arc<RuleCache<S>>,
    queue: Arc<dyn WorkQueue>,
    notification_dispatch_wait: std::time::Duration,
}

impl<S> AlertingWorker<S>
where
    S: RelationalStore + ?Sized + 'static,
{
    /// Build a worker over a store, a shared rule cache and the work queue
    /// used to dispatch notification tasks.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        rule_cache: Arc<RuleCache<S>>,
        queue: Arc<dyn WorkQueue>,
        notification_dispatch_wait: std::time::Duration,
    ) -> Self {
        Self {
            store,
            rule_cache,
            queue,
            notification_dispatch_wait,
        }
    }

    /// Handle one task: load candidates, evaluate each, and commit+dispatch
    /// for every rule that fires and clears its cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`AlertingError`] if the factory is unknown, a store call
    /// fails, or a rule's condition tree is malformed.
    pub async fn handle(&self, task: RuleEvalTask) -> Result<(), AlertingError> {
        let factory = self
            .store
            .get_factory(task.factory_id)
            .await?
            .ok_or(AlertingError::UnknownFactory(task.factory_id.get()))?;

        let candidates = self
            .rule_cache
            .candidate_rules(task.factory_id, task.device_id)
            .await?;

        for rule in candidates.iter() {
            self.evaluate_one(rule, &task, factory.timezone).await?;
        }
        Ok(())
    }

    async fn evaluate_one(
        &self,
        rule: &Rule,
        task: &RuleEvalTask,
        tz: chrono_tz::Tz,
    ) -> Result<(), AlertingError> {
        let verdict = evaluate(rule, &task.metrics, task.timestamp, tz)?;
        if verdict != Verdict::Fires {
            return Ok(());
        }

        let last_triggered = self
            .store
            .cooldown_last_triggered(rule.id, task.device_id)
            .await?;
        if !factoryops_core::RuleCooldown::is_elapsed(last_triggered, rule.cooldown_minutes, task.timestamp) {
            return Ok(());
        }

        let parameter_keys = leaf_parameter_keys(&rule.conditions);
        let message = render_message(&rule.name, &parameter_keys, &task.metrics);

        let alert = self
            .store
            .commit_alert(NewAlert {
                factory_id: task.factory_id,
                rule_id: rule.id,
                device_id: task.device_id,
                triggered_at: task.timestamp,
                severity: rule.severity,
                message,
                telemetry_snapshot: task.metrics.clone(),
            })
            .await?;

        self.dispatch_notification(alert.id.get(), rule).await;
        Ok(())
    }

    async fn dispatch_notification(&self, alert_id: i64, rule: &Rule) {
        let payload = serde_json::json!({
            "alert_id": alert_id,
            "channels": rule.notification_channels,
        });
        let Ok(bytes) = serde_json::to_vec(&payload) else {
            tracing::error!(alert_id, "failed to serialize notification task");
            return;
        };
        let queue = Arc::clone(&self.queue);
        match tokio::time::timeout(
            self.notification_dispatch_wait,
            queue.submit(QueueName::Notifications, bytes),
        )
        .await
        {
            Ok(Ok(_ticket)) => {}
            Ok(Err(e)) => tracing::warn!(alert_id, error = %e, "notification dispatch failed"),
            Err(_) => tracing::warn!(alert_id, "notification dispatch dropped: queue saturated past bounded wait"),
        }
    }
}

/// Collect every leaf parameter name referenced by a condition tree, for
/// the deterministic alert message template.
fn leaf_parameter_keys(tree: &ConditionTree) -> Vec<&str> {
    let mut keys = Vec::new();
    collect_leaf_keys(tree, &mut keys);
    keys
}

fn collect_leaf_keys<'a>(tree: &'a ConditionTree, out: &mut Vec<&'a str>) {
    match tree {
        ConditionTree::Leaf { parameter, .. } => out.push(parameter.as_str()),
        ConditionTree::Group { conditions, .. } => {
            for child in conditions {
                collect_leaf_keys(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::{
        Comparator, Factory, GroupOperator, NotificationChannel, RuleId,
        RuleScope, ScheduleConfig, ScheduleType, Severity,
    };
    use factoryops_queue::MemoryWorkQueue;
    use factoryops_store::InMemoryStore;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn setup() -> (AlertingWorker<InMemoryStore>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_factory(Factory {
            id: FactoryId::new(1),
            slug: "vpc".into(),
            name: "VPC".into(),
            timezone: chrono_tz::Tz::from_str("UTC").unwrap(),
            is_active: true,
        });
        store.seed_rule(Rule {
            id: RuleId::new(1),
            factory_id: FactoryId::new(1),
            name: "Overheat".into(),
            description: None,
            scope: RuleScope::Global,
            conditions: ConditionTree::Group {
                operator: GroupOperator::And,
                conditions: vec![
                    ConditionTree::Leaf {
                        parameter: "spindle_temp".into(),
                        op: Comparator::Gt,
                        threshold: 80.0,
                    },
                    ConditionTree::Leaf {
                        parameter: "coolant_flow".into(),
                        op: Comparator::Lt,
                        threshold: 5.0,
                    },
                ],
            },
            cooldown_minutes: 15,
            is_active: true,
            schedule_type: ScheduleType::Always,
            schedule_config: ScheduleConfig::default(),
            severity: Severity::Critical,
            notification_channels: vec![NotificationChannel::Email],
            device_ids: vec![],
        });
        let rule_cache = Arc::new(RuleCache::new(Arc::clone(&store)));
        let queue: Arc<dyn WorkQueue> = Arc::new(MemoryWorkQueue::new());
        let worker = AlertingWorker::new(
            Arc::clone(&store),
            rule_cache,
            queue,
            std::time::Duration::from_millis(500),
        );
        (worker, store)
    }

    fn metrics(pairs: &[(&str, f64)]) -> MetricValue {
        let mut m = HashMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), *v);
        }
        MetricValue::from_map(m)
    }

    #[tokio::test]
    async fn fires_and_commits_alert_and_cooldown() {
        let (worker, store) = setup();
        let t0 = Utc::now();
        let task = RuleEvalTask {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]),
            timestamp: t0,
        };
        worker.handle(task).await.unwrap();

        let counts = store.active_alert_counts(FactoryId::new(1)).await.unwrap();
        assert_eq!(counts.critical, 1);
        let cooldown = store.cooldown_last_triggered(RuleId::new(1), DeviceId::new(1)).await.unwrap();
        assert_eq!(cooldown, Some(t0));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_fires_within_window() {
        let (worker, store) = setup();
        let t0 = Utc::now();
        let first = RuleEvalTask {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]),
            timestamp: t0,
        };
        worker.handle(first).await.unwrap();

        let second = RuleEvalTask {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]),
            timestamp: t0 + chrono::Duration::minutes(5),
        };
        worker.handle(second).await.unwrap();
        let counts = store.active_alert_counts(FactoryId::new(1)).await.unwrap();
        assert_eq!(counts.critical, 1);

        let third = RuleEvalTask {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 82.5), ("coolant_flow", 3.2)]),
            timestamp: t0 + chrono::Duration::minutes(16),
        };
        worker.handle(third).await.unwrap();
        let counts = store.active_alert_counts(FactoryId::new(1)).await.unwrap();
        assert_eq!(counts.critical, 2);
    }

    #[tokio::test]
    async fn does_not_fire_when_condition_false() {
        let (worker, store) = setup();
        let task = RuleEvalTask {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 50.0), ("coolant_flow", 10.0)]),
            timestamp: Utc::now(),
        };
        worker.handle(task).await.unwrap();
        let counts = store.active_alert_counts(FactoryId::new(1)).await.unwrap();
        assert_eq!(counts.critical, 0);
    }

    #[tokio::test]
    async fn unknown_factory_is_rejected() {
        let (worker, _store) = setup();
        let task = RuleEvalTask {
            factory_id: FactoryId::new(999),
            device_id: DeviceId::new(1),
            metrics: metrics(&[("spindle_temp", 82.5)]),
            timestamp: Utc::now(),
        };
        assert!(matches!(worker.handle(task).await, Err(AlertingError::UnknownFactory(999))));
    }
}
