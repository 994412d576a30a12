use sqlx::PgPool;

use crate::config::PostgresQueueConfig;

/// Create the queue's tables if they do not already exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresQueueConfig) -> Result<(), sqlx::Error> {
    let tasks = config.tasks_table();
    let dead_letters = config.dead_letters_table();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {tasks} (
            id BIGSERIAL PRIMARY KEY,
            queue TEXT NOT NULL,
            payload BYTEA NOT NULL,
            attempt INT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'ready',
            visible_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            locked_until TIMESTAMPTZ
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_queue_ready_idx ON {tasks} (queue, visible_at) WHERE status = 'ready'",
        config.table_prefix
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {dead_letters} (
            id BIGSERIAL PRIMARY KEY,
            queue TEXT NOT NULL,
            payload BYTEA NOT NULL,
            attempts INT NOT NULL,
            failed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
