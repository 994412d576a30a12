//! Durable [`WorkQueue`] backed by PostgreSQL: tasks are claimed with
//! `SELECT ... FOR UPDATE SKIP LOCKED` so multiple consumer processes can
//! share one table without double-delivery, and an expired visibility
//! timeout makes an abandoned in-flight task claimable again without any
//! background reaper.

use chrono::Utc;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use factoryops_queue::{
    BackoffPolicy, QueueError, QueueName, Task, Ticket, WorkQueue, DEFAULT_MAX_RETRIES,
    MAX_PAYLOAD_BYTES,
};

use crate::config::PostgresQueueConfig;
use crate::error::backend_error;

/// A [`WorkQueue`] whose state lives in PostgreSQL, shared by every process
/// pointed at the same database.
pub struct PostgresWorkQueue {
    pool: PgPool,
    config: PostgresQueueConfig,
    backoff: BackoffPolicy,
}

impl PostgresWorkQueue {
    /// Wrap an already-connected pool. Callers are expected to have run
    /// [`crate::migrations::run_migrations`] first.
    #[must_use]
    pub fn new(pool: PgPool, config: PostgresQueueConfig) -> Self {
        Self {
            pool,
            config,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn submit(&self, queue: QueueName, payload: Vec<u8>) -> Result<Ticket, QueueError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(QueueError::PayloadTooLarge { len: payload.len() });
        }
        let table = self.config.tasks_table();
        let row = sqlx::query(&format!(
            "INSERT INTO {table} (queue, payload) VALUES ($1, $2) RETURNING id"
        ))
        .bind(queue.as_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(backend_error)?;
        let id: i64 = row.try_get("id").map_err(backend_error)?;
        #[allow(clippy::cast_sign_loss)]
        Ok(Ticket::new(id as u64))
    }

    async fn consume(&self, queue: QueueName, max_in_flight: usize) -> Result<Vec<Task>, QueueError> {
        let capacity = queue.max_concurrency().min(max_in_flight);
        if capacity == 0 {
            return Ok(Vec::new());
        }
        let table = self.config.tasks_table();
        let visibility_secs = self.config.visibility_timeout.as_secs_f64();

        #[allow(clippy::cast_possible_wrap)]
        let limit = capacity as i64;
        let rows = sqlx::query(&format!(
            "UPDATE {table}
             SET status = 'in_flight', locked_until = now() + make_interval(secs => $1)
             WHERE id IN (
                 SELECT id FROM {table}
                 WHERE queue = $2
                   AND (
                       (status = 'ready' AND visible_at <= now())
                       OR (status = 'in_flight' AND locked_until < now())
                   )
                 ORDER BY id
                 FOR UPDATE SKIP LOCKED
                 LIMIT $3
             )
             RETURNING id, payload, attempt"
        ))
        .bind(visibility_secs)
        .bind(queue.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(backend_error)?;
            let payload: Vec<u8> = row.try_get("payload").map_err(backend_error)?;
            let attempt: i32 = row.try_get("attempt").map_err(backend_error)?;
            #[allow(clippy::cast_sign_loss)]
            tasks.push(Task {
                ticket: Ticket::new(id as u64),
                queue,
                payload,
                #[allow(clippy::cast_sign_loss)]
                attempt: attempt as u32,
            });
        }
        Ok(tasks)
    }

    async fn ack(&self, ticket: Ticket) -> Result<(), QueueError> {
        let table = self.config.tasks_table();
        #[allow(clippy::cast_possible_wrap)]
        let id = ticket.get() as i64;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;
        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownTicket);
        }
        Ok(())
    }

    async fn nack(&self, ticket: Ticket, requeue: bool) -> Result<(), QueueError> {
        let tasks_table = self.config.tasks_table();
        let dead_letters_table = self.config.dead_letters_table();
        #[allow(clippy::cast_possible_wrap)]
        let id = ticket.get() as i64;

        let mut tx = self.pool.begin().await.map_err(backend_error)?;
        let row = sqlx::query(&format!(
            "SELECT queue, payload, attempt FROM {tasks_table} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend_error)?;

        let Some(row) = row else {
            return Err(QueueError::UnknownTicket);
        };
        let queue_name: String = row.try_get("queue").map_err(backend_error)?;
        let payload: Vec<u8> = row.try_get("payload").map_err(backend_error)?;
        let attempt: i32 = row.try_get("attempt").map_err(backend_error)?;
        #[allow(clippy::cast_sign_loss)]
        let next_attempt = attempt as u32 + 1;

        if requeue && next_attempt < DEFAULT_MAX_RETRIES {
            let delay = self.backoff.delay_for(next_attempt);
            let delay_secs = delay.as_secs_f64();
            sqlx::query(&format!(
                "UPDATE {tasks_table}
                 SET status = 'ready', attempt = $2, visible_at = now() + make_interval(secs => $3), locked_until = NULL
                 WHERE id = $1"
            ))
            .bind(id)
            .bind(next_attempt as i32)
            .bind(delay_secs)
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        } else {
            tracing::warn!(queue = %queue_name, attempts = next_attempt, "task dead-lettered");
            sqlx::query(&format!(
                "INSERT INTO {dead_letters_table} (queue, payload, attempts, failed_at) VALUES ($1, $2, $3, $4)"
            ))
            .bind(&queue_name)
            .bind(&payload)
            .bind(next_attempt as i32)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;

            sqlx::query(&format!("DELETE FROM {tasks_table} WHERE id = $1"))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;
        Ok(())
    }
}
