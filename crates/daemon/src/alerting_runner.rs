//! Runs a pool of alerting workers consuming the `rule_engine` queue.
//!
//! Each worker polls [`WorkQueue::consume`] for ready tasks, deserializes
//! them into [`RuleEvalTask`], hands them to the shared [`AlertingWorker`],
//! and acks or nacks based on the result. Polling stops as soon as
//! `shutdown` is cancelled; a task already being handled always runs to
//! completion first.

use std::sync::Arc;
use std::time::Duration;

use factoryops_alerting::{AlertingWorker, RuleEvalTask};
use factoryops_queue::{QueueName, WorkQueue};
use factoryops_store::RelationalStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn `worker_count` tasks, each independently polling the `rule_engine`
/// queue. Returns their join handles so the caller can await a bounded
/// drain after requesting shutdown.
pub fn spawn<S>(
    worker: Arc<AlertingWorker<S>>,
    queue: Arc<dyn WorkQueue>,
    worker_count: usize,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    S: RelationalStore + ?Sized + 'static,
{
    (0..worker_count.max(1))
        .map(|index| {
            let worker = Arc::clone(&worker);
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_one(index, worker, queue, poll_interval, shutdown).await;
            })
        })
        .collect()
}

async fn run_one<S>(
    index: usize,
    worker: Arc<AlertingWorker<S>>,
    queue: Arc<dyn WorkQueue>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) where
    S: RelationalStore + ?Sized + 'static,
{
    tracing::info!(worker = index, "alerting worker started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let tasks = match queue.consume(QueueName::RuleEngine, 1).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(worker = index, error = %e, "rule_engine consume failed; retrying in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        if tasks.is_empty() {
            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                () = shutdown.cancelled() => break,
            }
            continue;
        }

        for task in tasks {
            let eval_task: RuleEvalTask = match serde_json::from_slice(&task.payload) {
                Ok(task) => task,
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "malformed rule_engine payload; dead-lettering");
                    let _ = queue.nack(task.ticket, false).await;
                    continue;
                }
            };

            match worker.handle(eval_task).await {
                Ok(()) => {
                    if let Err(e) = queue.ack(task.ticket).await {
                        tracing::error!(worker = index, error = %e, "failed to ack rule_engine task");
                    }
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::warn!(worker = index, error = %e, retryable, "rule evaluation failed");
                    if let Err(e) = queue.nack(task.ticket, retryable).await {
                        tracing::error!(worker = index, error = %e, "failed to nack rule_engine task");
                    }
                }
            }
        }
    }
    tracing::info!(worker = index, "alerting worker stopped");
}
