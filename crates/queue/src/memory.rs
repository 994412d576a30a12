//! In-process [`WorkQueue`], used for local development and tests. State is
//! lost on restart; [`crate::postgres`](../queue_postgres) is the durable
//! backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backoff::BackoffPolicy;
use crate::error::QueueError;
use crate::queue_name::QueueName;
use crate::traits::WorkQueue;
use crate::types::{Task, Ticket, DEFAULT_MAX_RETRIES, MAX_PAYLOAD_BYTES};

struct Entry {
    ticket: Ticket,
    payload: Vec<u8>,
    attempt: u32,
    visible_at: DateTime<Utc>,
}

struct InFlight {
    queue: QueueName,
    payload: Vec<u8>,
    attempt: u32,
}

/// A dead-lettered task: retries exhausted, or a non-requeueing nack.
pub struct DeadLetterEntry {
    /// The payload that could not be processed.
    pub payload: Vec<u8>,
    /// Total delivery attempts made before giving up.
    pub attempts: u32,
    /// When the task was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Entry>,
    dead_letters: Vec<DeadLetterEntry>,
}

/// In-memory [`WorkQueue`] backed by one FIFO deque per named queue.
pub struct MemoryWorkQueue {
    states: HashMap<&'static str, Mutex<QueueState>>,
    in_flight: Mutex<HashMap<u64, InFlight>>,
    next_ticket: AtomicU64,
    backoff: BackoffPolicy,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkQueue {
    /// An empty queue set with the default backoff policy.
    #[must_use]
    pub fn new() -> Self {
        let states = QueueName::ALL
            .iter()
            .map(|q| (q.as_str(), Mutex::new(QueueState::default())))
            .collect();
        Self {
            states,
            in_flight: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Snapshot of dead-lettered tasks for `queue`, for test assertions.
    pub fn dead_letters(&self, queue: QueueName) -> Vec<DeadLetterEntry> {
        let state = self.states[queue.as_str()].lock().unwrap();
        state
            .dead_letters
            .iter()
            .map(|e| DeadLetterEntry {
                payload: e.payload.clone(),
                attempts: e.attempts,
                failed_at: e.failed_at,
            })
            .collect()
    }

    fn in_flight_count(&self, queue: QueueName) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.queue == queue)
            .count()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn submit(&self, queue: QueueName, payload: Vec<u8>) -> Result<Ticket, QueueError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(QueueError::PayloadTooLarge { len: payload.len() });
        }
        let ticket = Ticket::new(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        let entry = Entry {
            ticket,
            payload,
            attempt: 0,
            visible_at: Utc::now(),
        };
        self.states[queue.as_str()]
            .lock()
            .unwrap()
            .ready
            .push_back(entry);
        Ok(ticket)
    }

    async fn consume(&self, queue: QueueName, max_in_flight: usize) -> Result<Vec<Task>, QueueError> {
        let capacity = queue
            .max_concurrency()
            .min(max_in_flight)
            .saturating_sub(self.in_flight_count(queue));
        if capacity == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut state = self.states[queue.as_str()].lock().unwrap();
        let mut tasks = Vec::with_capacity(capacity);
        while tasks.len() < capacity {
            match state.ready.front() {
                Some(front) if front.visible_at <= now => {
                    let entry = state.ready.pop_front().unwrap();
                    tasks.push(Task {
                        ticket: entry.ticket,
                        queue,
                        payload: entry.payload.clone(),
                        attempt: entry.attempt,
                    });
                    self.in_flight.lock().unwrap().insert(
                        entry.ticket.get(),
                        InFlight {
                            queue,
                            payload: entry.payload,
                            attempt: entry.attempt,
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(tasks)
    }

    async fn ack(&self, ticket: Ticket) -> Result<(), QueueError> {
        self.in_flight
            .lock()
            .unwrap()
            .remove(&ticket.get())
            .map(|_| ())
            .ok_or(QueueError::UnknownTicket)
    }

    async fn nack(&self, ticket: Ticket, requeue: bool) -> Result<(), QueueError> {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap()
            .remove(&ticket.get())
            .ok_or(QueueError::UnknownTicket)?;

        let next_attempt = in_flight.attempt + 1;
        let mut state = self.states[in_flight.queue.as_str()].lock().unwrap();

        if requeue && next_attempt < DEFAULT_MAX_RETRIES {
            let delay = self.backoff.delay_for(next_attempt);
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            state.ready.push_back(Entry {
                ticket,
                payload: in_flight.payload,
                attempt: next_attempt,
                visible_at: Utc::now() + delay,
            });
        } else {
            tracing::warn!(
                queue = in_flight.queue.as_str(),
                attempts = next_attempt,
                "task dead-lettered"
            );
            state.dead_letters.push(DeadLetterEntry {
                payload: in_flight.payload,
                attempts: next_attempt,
                failed_at: Utc::now(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_consume_then_ack() {
        let queue = MemoryWorkQueue::new();
        let ticket = queue
            .submit(QueueName::RuleEngine, b"hello".to_vec())
            .await
            .unwrap();
        let tasks = queue.consume(QueueName::RuleEngine, 4).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].ticket, ticket);
        queue.ack(ticket).await.unwrap();
        assert!(queue.consume(QueueName::RuleEngine, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_payload_rejected() {
        let queue = MemoryWorkQueue::new();
        let payload = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        let result = queue.submit(QueueName::Notifications, payload).await;
        assert!(matches!(result, Err(QueueError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn concurrency_cap_limits_in_flight_delivery() {
        let queue = MemoryWorkQueue::new();
        for _ in 0..5 {
            queue
                .submit(QueueName::Reporting, b"x".to_vec())
                .await
                .unwrap();
        }
        // Reporting caps at 2 in flight even though 5 are requested.
        let first = queue.consume(QueueName::Reporting, 5).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = queue.consume(QueueName::Reporting, 5).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn nack_without_requeue_dead_letters_immediately() {
        let queue = MemoryWorkQueue::new();
        let ticket = queue
            .submit(QueueName::Notifications, b"payload".to_vec())
            .await
            .unwrap();
        queue.consume(QueueName::Notifications, 4).await.unwrap();
        queue.nack(ticket, false).await.unwrap();
        assert_eq!(queue.dead_letters(QueueName::Notifications).len(), 1);
    }

    #[tokio::test]
    async fn nack_with_requeue_becomes_visible_again_eventually() {
        let queue = MemoryWorkQueue::new();
        let ticket = queue
            .submit(QueueName::RuleEngine, b"payload".to_vec())
            .await
            .unwrap();
        queue.consume(QueueName::RuleEngine, 4).await.unwrap();
        queue.nack(ticket, true).await.unwrap();
        // Not immediately visible: backoff delay has not elapsed.
        assert!(queue.consume(QueueName::RuleEngine, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_ticket_rejected() {
        let queue = MemoryWorkQueue::new();
        let bogus = Ticket::new(999);
        assert!(matches!(queue.ack(bogus).await, Err(QueueError::UnknownTicket)));
        assert!(matches!(
            queue.nack(bogus, true).await,
            Err(QueueError::UnknownTicket)
        ));
    }
}
