//! Bounded on-disk overflow buffer for batches that exhausted their flush
//! retries. A background drainer retries these independently of the hot
//! buffering path so a slow or down time-series store does not block new
//! samples from being accepted.
//!
//! Durability is best-effort: the buffer is an append-only NDJSON file
//! mirrored by an in-memory queue, replayed once at startup. If the buffer
//! fills, the oldest unflushed batch is dropped with a logged warning —
//! availability over completeness, per the time-series writer's design.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use factoryops_core::TelemetryPoint;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::TimeseriesError;

struct Inner {
    queue: VecDeque<Vec<TelemetryPoint>>,
    points_buffered: usize,
}

/// A bounded, file-backed FIFO of batches awaiting redelivery.
pub struct OverflowBuffer {
    inner: Mutex<Inner>,
    capacity_points: usize,
    path: PathBuf,
}

impl OverflowBuffer {
    /// Open (creating if absent) the overflow file at `dir/overflow.ndjson`.
    /// Existing content is not eagerly replayed here; call
    /// [`Self::load_from_disk`] once at startup if recovery is desired.
    pub fn new(dir: impl Into<PathBuf>, capacity_points: usize) -> Self {
        let mut path = dir.into();
        path.push("overflow.ndjson");
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                points_buffered: 0,
            }),
            capacity_points,
            path,
        }
    }

    /// Replay batches persisted by a prior process, so a restart does not
    /// lose what was spilled before shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`TimeseriesError::Overflow`] if the file exists but cannot
    /// be read.
    pub async fn load_from_disk(&self) -> Result<(), TimeseriesError> {
        let Ok(contents) = fs::read_to_string(&self.path).await else {
            return Ok(());
        };
        let mut inner = self.inner.lock().unwrap();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Vec<TelemetryPoint>>(line) {
                Ok(batch) => {
                    inner.points_buffered += batch.len();
                    inner.queue.push_back(batch);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unreadable overflow batch on load");
                }
            }
        }
        Ok(())
    }

    /// Push a batch that could not be flushed after retries. If the buffer
    /// is at capacity, the oldest batch is shed first.
    pub async fn push(&self, batch: Vec<TelemetryPoint>) -> Result<(), TimeseriesError> {
        let shed = {
            let mut inner = self.inner.lock().unwrap();
            let mut shed = None;
            while inner.points_buffered + batch.len() > self.capacity_points
                && !inner.queue.is_empty()
            {
                if let Some(oldest) = inner.queue.pop_front() {
                    inner.points_buffered -= oldest.len();
                    shed = Some(oldest.len());
                }
            }
            inner.points_buffered += batch.len();
            inner.queue.push_back(batch);
            shed
        };
        if let Some(points) = shed {
            tracing::warn!(points, "overflow buffer full; shed oldest unflushed batch");
        }
        self.append_to_disk().await
    }

    /// Pop the oldest pending batch, if any.
    pub fn pop(&self) -> Option<Vec<TelemetryPoint>> {
        let mut inner = self.inner.lock().unwrap();
        let batch = inner.queue.pop_front();
        if let Some(batch) = &batch {
            inner.points_buffered -= batch.len();
        }
        batch
    }

    /// Number of batches currently pending redelivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the on-disk mirror from the current in-memory state. Called
    /// after every push and after a successful drain so the file never
    /// diverges from memory by more than one batch.
    async fn append_to_disk(&self) -> Result<(), TimeseriesError> {
        let serialized: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner
                .queue
                .iter()
                .filter_map(|batch| serde_json::to_string(batch).ok())
                .collect()
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TimeseriesError::Overflow(e.to_string()))?;
        }
        let mut file = fs::File::create(&self.path)
            .await
            .map_err(|e| TimeseriesError::Overflow(e.to_string()))?;
        for line in serialized {
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| TimeseriesError::Overflow(e.to_string()))?;
            file.write_all(b"\n")
                .await
                .map_err(|e| TimeseriesError::Overflow(e.to_string()))?;
        }
        Ok(())
    }

    /// Persist the current state after a successful drain of the head batch.
    pub async fn sync_after_drain(&self) -> Result<(), TimeseriesError> {
        self.append_to_disk().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use factoryops_core::{DeviceId, FactoryId, MetricValue};

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
    async fn push_and_pop_preserves_fifo_order() {
        let dir = std::env::temp_dir().join(format!("fo-overflow-{}", std::process::id()));
        let buffer = OverflowBuffer::new(&dir, 100);
        buffer.push(vec![point()]).await.unwrap();
        buffer.push(vec![point(), point()]).await.unwrap();
        assert_eq!(buffer.len(), 2);
        let first = buffer.pop().unwrap();
        assert_eq!(first.len(), 1);
        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn sheds_oldest_when_over_capacity() {
        let dir = std::env::temp_dir().join(format!("fo-overflow-cap-{}", std::process::id()));
        let buffer = OverflowBuffer::new(&dir, 2);
        buffer.push(vec![point(), point()]).await.unwrap();
        buffer.push(vec![point()]).await.unwrap();
        // Oldest 2-point batch should have been shed to make room.
        assert_eq!(buffer.len(), 1);
        let remaining = buffer.pop().unwrap();
        assert_eq!(remaining.len(), 1);
        let _ = fs::remove_dir_all(&dir).await;
    }
}
