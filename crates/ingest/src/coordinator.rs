//! Ingestion coordinator (C4): subscribes to `factories/+/devices/+/telemetry`,
//! partitions work per device across a worker pool, and drives each message
//! through topic parse → payload parse → identity resolve → parameter
//! discovery → time-series enqueue → last-seen update → rule-eval dispatch,
//! per §4.4's numbered steps.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use factoryops_core::{DeviceId, FactoryId, MetricValue};
use factoryops_queue::{QueueName, WorkQueue};
use factoryops_state::SharedCache;
use factoryops_store::RelationalStore;
use factoryops_timeseries::TimeSeriesWriter;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::identity::IdentityCache;
use crate::last_seen::LastSeenCoalescer;
use crate::payload::parse_payload;
use crate::topic::parse_topic;

/// Topic filter the coordinator subscribes to.
pub const TELEMETRY_TOPIC_FILTER: &str = "factories/+/devices/+/telemetry";

/// The payload submitted to the `rule_engine` queue: everything the
/// alerting worker needs to evaluate rules for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEngineTask {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Reporting device.
    pub device_id: DeviceId,
    /// The message's validated metrics.
    pub metrics: MetricValue,
    /// The message's effective timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Build manual-ack MQTT client options, so a message is only acknowledged
/// after the full pipeline has run (or a policy decision to drop it).
#[must_use]
pub fn mqtt_options(config: &IngestConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    opts.set_keep_alive(Duration::from_secs(30));
    opts.set_manual_acks(true);
    opts
}

/// Construct a connected client/eventloop pair from configuration.
#[must_use]
pub fn connect(config: &IngestConfig) -> (AsyncClient, EventLoop) {
    AsyncClient::new(mqtt_options(config), config.worker_queue_capacity)
}

fn partition_index(factory_slug: &str, device_key: &str, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    factory_slug.hash(&mut hasher);
    device_key.hash(&mut hasher);
    (hasher.finish() as usize) % worker_count.max(1)
}

/// Orchestrates the telemetry ingestion pipeline over a pluggable shared
/// cache, relational store and durable work queue.
pub struct IngestionCoordinator<C: ?Sized, S: ?Sized> {
    config: IngestConfig,
    identity: Arc<IdentityCache<C, S>>,
    store: Arc<S>,
    last_seen: Arc<LastSeenCoalescer<C, S>>,
    timeseries: Arc<TimeSeriesWriter>,
    queue: Arc<dyn WorkQueue>,
    retry_counts: DashMap<u64, u32>,
}

impl<C, S> IngestionCoordinator<C, S>
where
    C: SharedCache + ?Sized + 'static,
    S: RelationalStore + ?Sized + 'static,
{
    /// Build a coordinator from its already-constructed collaborators.
    #[must_use]
    pub fn new(
        config: IngestConfig,
        shared: Arc<C>,
        store: Arc<S>,
        timeseries: Arc<TimeSeriesWriter>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        let identity = Arc::new(IdentityCache::new(Arc::clone(&shared), Arc::clone(&store)));
        let last_seen = Arc::new(LastSeenCoalescer::new(shared, Arc::clone(&store), config.last_seen_debounce));
        Self {
            config,
            identity,
            store,
            last_seen,
            timeseries,
            queue,
            retry_counts: DashMap::new(),
        }
    }

    /// Run the subscribe loop and worker pool until the event loop ends, the
    /// process is terminated, or `shutdown` is cancelled. Consumes the
    /// client/eventloop pair produced by [`connect`].
    ///
    /// On cancellation the broker subscribe loop stops pulling new messages
    /// immediately; each worker drains whatever is already buffered in its
    /// channel before returning, so in-flight messages still complete the
    /// full pipeline rather than being abandoned mid-processing.
    pub async fn run(self: Arc<Self>, client: AsyncClient, mut eventloop: EventLoop, shutdown: CancellationToken) {
        if let Err(e) = client.subscribe(TELEMETRY_TOPIC_FILTER, QoS::AtLeastOnce).await {
            tracing::error!(error = %e, "failed to subscribe to telemetry topic filter");
            return;
        }

        let mut worker_senders = Vec::with_capacity(self.config.worker_count);
        let mut worker_handles = Vec::with_capacity(self.config.worker_count);
        for _ in 0..self.config.worker_count {
            let (tx, rx) = mpsc::channel::<Publish>(self.config.worker_queue_capacity);
            let coordinator = Arc::clone(&self);
            let client = client.clone();
            worker_handles.push(tokio::spawn(async move {
                coordinator.worker_loop(client, rx).await;
            }));
            worker_senders.push(tx);
        }

        tracing::info!(workers = worker_senders.len(), "ingestion coordinator started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("ingestion coordinator stopping: draining worker queues");
                    break;
                }
                polled = eventloop.poll() => match polled {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let parsed = parse_topic(&publish.topic);
                        let index = match &parsed {
                            Ok(topic) => partition_index(&topic.factory_slug, &topic.device_key, worker_senders.len()),
                            Err(e) => {
                                tracing::info!(topic = %publish.topic, error = %e, "dropping message with invalid topic");
                                let _ = client.ack(&publish).await;
                                continue;
                            }
                        };
                        if worker_senders[index].send(publish).await.is_err() {
                            tracing::error!(worker = index, "ingestion worker channel closed unexpectedly");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "mqtt event loop error; retrying in 5s");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                },
            }
        }

        drop(worker_senders);
        for handle in worker_handles {
            let _ = handle.await;
        }
    }

    async fn worker_loop(self: Arc<Self>, client: AsyncClient, mut rx: mpsc::Receiver<Publish>) {
        while let Some(publish) = rx.recv().await {
            self.handle_publish(&client, publish).await;
        }
    }

    async fn handle_publish(&self, client: &AsyncClient, publish: Publish) {
        let message_key = hash_message(&publish.topic, &publish.payload);

        match self.process_message(&publish.topic, &publish.payload).await {
            Ok(()) => {
                self.retry_counts.remove(&message_key);
                let _ = client.ack(&publish).await;
            }
            Err(e) if e.is_retryable() => {
                let attempts = {
                    let mut entry = self.retry_counts.entry(message_key).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if attempts >= self.config.max_message_retries {
                    tracing::error!(topic = %publish.topic, attempts, error = %e, "message exhausted retries; dead-lettering");
                    self.dead_letter(&publish, &e).await;
                    self.retry_counts.remove(&message_key);
                    let _ = client.ack(&publish).await;
                } else {
                    tracing::warn!(topic = %publish.topic, attempts, error = %e, "transient failure; leaving unacked for redelivery");
                }
            }
            Err(e) => {
                tracing::info!(topic = %publish.topic, error = %e, "dropping message");
                let _ = client.ack(&publish).await;
            }
        }
    }

    async fn dead_letter(&self, publish: &Publish, error: &IngestError) {
        let line = serde_json::json!({
            "topic": publish.topic,
            "payload": String::from_utf8_lossy(&publish.payload),
            "error": error.to_string(),
            "dead_lettered_at": Utc::now().to_rfc3339(),
        });
        let Ok(mut serialized) = serde_json::to_string(&line) else {
            return;
        };
        serialized.push('\n');

        if let Some(parent) = std::path::Path::new(&self.config.dead_letter_path).parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.dead_letter_path)
            .await
        {
            Ok(mut file) => {
                if let Err(e) = file.write_all(serialized.as_bytes()).await {
                    tracing::error!(error = %e, "failed to write dead-letter file");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to open dead-letter file"),
        }
    }

    /// Run one message through the full pipeline. Exposed directly for
    /// tests and for callers driving ingestion from something other than a
    /// live MQTT event loop.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] classifying why the message was rejected or
    /// could not be processed; see the variant docs for ack/retry policy.
    pub async fn process_message(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let parsed_topic = parse_topic(topic)?;
        let parsed_payload = parse_payload(payload)?;

        let factory_id = self.identity.resolve_factory(&parsed_topic.factory_slug).await?;
        let device_id = self
            .identity
            .resolve_or_create_device(factory_id, &parsed_topic.device_key)
            .await?;

        crate::parameters::ensure_registered(
            &self.identity,
            &self.store,
            factory_id,
            device_id,
            &parsed_payload.metrics,
        )
        .await?;

        let now = Utc::now();
        let message_timestamp = parsed_payload.timestamp.unwrap_or(now);
        let metrics = MetricValue::from_typed_map(parsed_payload.metrics);
        let point = factoryops_core::TelemetryPoint::new(factory_id, device_id, metrics.clone(), message_timestamp, now);
        if point.timestamp_clamped {
            tracing::warn!(device_id = device_id.get(), "telemetry timestamp clamped: too far in the future");
        }
        self.timeseries
            .submit(point.clone())
            .await
            .map_err(|e| IngestError::TransientStore(e.to_string()))?;

        self.last_seen.record(factory_id, device_id, point.timestamp).await;

        let task = RuleEngineTask {
            factory_id,
            device_id,
            metrics,
            timestamp: point.timestamp,
        };
        self.dispatch_rule_eval(task).await;

        Ok(())
    }

    /// Submit a rule-eval task with bounded back-pressure, per §4.4 step 8:
    /// block on a saturated `rule_engine` queue up to `rule_dispatch_wait`,
    /// then drop the dispatch (telemetry has already been persisted).
    async fn dispatch_rule_eval(&self, task: RuleEngineTask) {
        let Ok(payload) = serde_json::to_vec(&task) else {
            tracing::error!("failed to serialize rule-eval task");
            return;
        };
        let queue = Arc::clone(&self.queue);
        let wait = self.config.rule_dispatch_wait;
        match tokio::time::timeout(wait, queue.submit(QueueName::RuleEngine, payload)).await {
            Ok(Ok(_ticket)) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "rule_dispatch_dropped: submit failed");
            }
            Err(_) => {
                tracing::warn!("rule_dispatch_dropped: rule_engine queue saturated past bounded wait");
            }
        }
    }
}

fn hash_message(topic: &str, payload: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    payload.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::Factory;
    use factoryops_queue::MemoryWorkQueue;
    use factoryops_state_memory::MemorySharedCache;
    use factoryops_store::InMemoryStore;
    use factoryops_timeseries::{HttpLineProtocolSink, TimeseriesConfig};
    use std::str::FromStr;

    fn test_coordinator() -> IngestionCoordinator<MemorySharedCache, InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.seed_factory(Factory {
            id: FactoryId::new(1),
            slug: "vpc".into(),
            name: "VPC".into(),
            timezone: chrono_tz::Tz::from_str("UTC").unwrap(),
            is_active: true,
        });
        let shared = Arc::new(MemorySharedCache::new());
        let mut ts_config = TimeseriesConfig::default();
        ts_config.overflow_dir = std::env::temp_dir()
            .join(format!("fo-coordinator-{}", std::process::id()))
            .to_string_lossy()
            .into_owned();
        let sink = Arc::new(HttpLineProtocolSink::new(ts_config.clone()).unwrap());
        let timeseries = Arc::new(TimeSeriesWriter::spawn(ts_config, sink));
        let queue: Arc<dyn WorkQueue> = Arc::new(MemoryWorkQueue::new());
        IngestionCoordinator::new(IngestConfig::default(), shared, store, timeseries, queue)
    }

    #[tokio::test]
    async fn first_sight_device_creates_device_and_parameters() {
        let coordinator = test_coordinator();
        let topic = "factories/vpc/devices/M01/telemetry";
        let payload = br#"{"metrics":{"voltage":231.4,"current":3.2}}"#;

        coordinator.process_message(topic, payload).await.unwrap();

        let device = coordinator
            .store
            .get_device_by_key(FactoryId::new(1), "M01")
            .await
            .unwrap()
            .expect("device should be auto-created");
        let params = coordinator.store.list_parameters(device.id).await.unwrap();
        assert_eq!(params.len(), 2);
    }

    #[tokio::test]
    async fn malformed_topic_is_rejected_without_side_effects() {
        let coordinator = test_coordinator();
        let result = coordinator
            .process_message("factories/vpc/devices/M01/TELEMETRY", b"{}")
            .await;
        assert!(matches!(result, Err(IngestError::InvalidTopic(_))));
        let device = coordinator.store.get_device_by_key(FactoryId::new(1), "M01").await.unwrap();
        assert!(device.is_none());
    }

    #[tokio::test]
    async fn unknown_factory_is_rejected() {
        let coordinator = test_coordinator();
        let result = coordinator
            .process_message("factories/ghost/devices/M01/telemetry", br#"{"metrics":{"v":1.0}}"#)
            .await;
        assert!(matches!(result, Err(IngestError::UnknownFactory(_))));
    }

    #[tokio::test]
    async fn partition_index_is_stable_for_same_device() {
        let a = partition_index("vpc", "M01", 8);
        let b = partition_index("vpc", "M01", 8);
        assert_eq!(a, b);
    }
}
