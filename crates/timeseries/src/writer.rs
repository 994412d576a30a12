//! The time-series writer: accepts telemetry points, batches them by size or
//! time, flushes to a [`TimeseriesSink`] with retry/backoff, and spills to
//! the overflow buffer when a batch exhausts its retries. A background task
//! drains the overflow buffer independently so a backed-up sink cannot stall
//! newly arriving points.

use std::sync::Arc;

use factoryops_core::TelemetryPoint;
use factoryops_queue::BackoffPolicy;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::TimeseriesConfig;
use crate::error::TimeseriesError;
use crate::overflow::OverflowBuffer;
use crate::sink::TimeseriesSink;

/// Handle for submitting telemetry points to the writer's background task.
#[derive(Clone)]
pub struct TimeSeriesWriter {
    sender: mpsc::Sender<TelemetryPoint>,
}

impl TimeSeriesWriter {
    /// Spawn the writer's buffering, flush and overflow-drain tasks.
    ///
    /// Returns immediately; the returned handle can be cloned freely and
    /// used to enqueue points from any number of callers.
    #[must_use]
    pub fn spawn(config: TimeseriesConfig, sink: Arc<dyn TimeseriesSink>) -> Self {
        let (sender, receiver) = mpsc::channel(config.batch_size * 4);
        let overflow = Arc::new(OverflowBuffer::new(
            config.overflow_dir.clone(),
            config.overflow_capacity,
        ));

        {
            let overflow = Arc::clone(&overflow);
            tokio::spawn(async move {
                if let Err(e) = overflow.load_from_disk().await {
                    tracing::warn!(error = %e, "failed to replay overflow buffer on startup");
                }
            });
        }

        tokio::spawn(run_buffering_loop(
            config.clone(),
            Arc::clone(&sink),
            Arc::clone(&overflow),
            receiver,
        ));

        tokio::spawn(run_overflow_drain_loop(config, sink, overflow));

        Self { sender }
    }

    /// Enqueue a point for batching. Backpressures the caller if the
    /// internal channel is full, which only happens when the buffering task
    /// has fallen far behind.
    ///
    /// # Errors
    ///
    /// Returns [`TimeseriesError::Overflow`] if the writer task has stopped.
    pub async fn submit(&self, point: TelemetryPoint) -> Result<(), TimeseriesError> {
        self.sender
            .send(point)
            .await
            .map_err(|_| TimeseriesError::Overflow("writer task is no longer running".into()))
    }
}

async fn run_buffering_loop(
    config: TimeseriesConfig,
    sink: Arc<dyn TimeseriesSink>,
    overflow: Arc<OverflowBuffer>,
    mut receiver: mpsc::Receiver<TelemetryPoint>,
) {
    let mut buffer: Vec<TelemetryPoint> = Vec::with_capacity(config.batch_size);
    let mut ticker = interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_point = receiver.recv() => {
                match maybe_point {
                    Some(point) => {
                        buffer.push(point);
                        if buffer.len() >= config.batch_size {
                            flush_with_retry(&config, &sink, &overflow, std::mem::take(&mut buffer)).await;
                        }
                    }
                    None => {
                        if !buffer.is_empty() {
                            flush_with_retry(&config, &sink, &overflow, std::mem::take(&mut buffer)).await;
                        }
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush_with_retry(&config, &sink, &overflow, std::mem::take(&mut buffer)).await;
                }
            }
        }
    }
}

/// Flush one batch, retrying with backoff up to `config.max_retries` times.
/// A batch that still fails after the retry budget is spilled to the
/// overflow buffer rather than dropped.
async fn flush_with_retry(
    config: &TimeseriesConfig,
    sink: &Arc<dyn TimeseriesSink>,
    overflow: &Arc<OverflowBuffer>,
    batch: Vec<TelemetryPoint>,
) {
    let policy = BackoffPolicy {
        base: config.backoff_base,
        max: config.backoff_max,
        ..BackoffPolicy::default()
    };

    for attempt in 0..config.max_retries {
        match sink.write_batch(&batch).await {
            Ok(()) => return,
            Err(TimeseriesError::Permanent(msg)) => {
                tracing::error!(error = %msg, points = batch.len(), "dropping batch after permanent sink error");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "flush failed, retrying");
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
    }

    tracing::warn!(points = batch.len(), "flush retries exhausted, spilling to overflow buffer");
    if let Err(e) = overflow.push(batch).await {
        tracing::error!(error = %e, "failed to spill batch to overflow buffer");
    }
}

/// Periodically retries whatever sits in the overflow buffer, independent of
/// the hot buffering path.
async fn run_overflow_drain_loop(
    config: TimeseriesConfig,
    sink: Arc<dyn TimeseriesSink>,
    overflow: Arc<OverflowBuffer>,
) {
    let drain_interval = config.flush_interval.max(std::time::Duration::from_secs(1));
    let mut ticker = interval(drain_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let lock = Mutex::new(());

    loop {
        ticker.tick().await;
        let _guard = lock.lock().await;
        let Some(batch) = overflow.pop() else {
            continue;
        };
        match sink.write_batch(&batch).await {
            Ok(()) => {
                if let Err(e) = overflow.sync_after_drain().await {
                    tracing::warn!(error = %e, "failed to persist overflow buffer after drain");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "overflow drain retry still failing");
                if let Err(e) = overflow.push(batch).await {
                    tracing::error!(error = %e, "failed to requeue overflow batch after failed drain");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use factoryops_core::{DeviceId, FactoryId, MetricValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSink {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl TimeseriesSink for CountingSink {
        async fn write_batch(&self, points: &[TelemetryPoint]) -> Result<(), TimeseriesError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(TimeseriesError::Transient("simulated".into()));
            }
            assert!(!points.is_empty());
            Ok(())
        }
    }

    fn point() -> TelemetryPoint {
        TelemetryPoint {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: MetricValue::default(),
            timestamp: Utc::now(),
            timestamp_clamped: false,
        }
    }

    #[tokio::test]
    async fn flushes_once_batch_size_reached() {
        let mut config = TimeseriesConfig::default();
        config.batch_size = 2;
        config.flush_interval = Duration::from_secs(60);
        config.overflow_dir =
            std::env::temp_dir().join(format!("fo-writer-{}", std::process::id())).to_string_lossy().into_owned();

        let sink = Arc::new(CountingSink { calls: AtomicUsize::new(0), fail_first_n: 0 });
        let writer = TimeSeriesWriter::spawn(config, sink.clone());

        writer.submit(point()).await.unwrap();
        writer.submit(point()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_before_succeeding() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(5),
            jitter_fraction: 0.0,
            ..BackoffPolicy::default()
        };
        let mut config = TimeseriesConfig::default();
        config.backoff_base = policy.base;
        config.backoff_max = policy.max;
        config.max_retries = 3;
        config.overflow_dir =
            std::env::temp_dir().join(format!("fo-writer-retry-{}", std::process::id())).to_string_lossy().into_owned();

        let sink = Arc::new(CountingSink { calls: AtomicUsize::new(0), fail_first_n: 2 });
        flush_with_retry(&config, &(sink.clone() as Arc<dyn TimeseriesSink>), &Arc::new(OverflowBuffer::new(&config.overflow_dir, 10)), vec![point()]).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }
}
