//! Process entrypoint: wires the ingestion coordinator and the alerting
//! worker pool to their backing store, shared cache, work queue and
//! time-series writer, then runs until told to shut down.

mod alerting_runner;
mod backends;
mod config;

use std::sync::Arc;

use factoryops_alerting::{rule_cache::spawn_invalidation_listener, AlertingWorker, RuleCache};
use factoryops_ingest::{IngestConfig, IngestionCoordinator};
use factoryops_timeseries::{HttpLineProtocolSink, TimeSeriesWriter, TimeseriesConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let daemon_config = DaemonConfig::from_env();

    let store = backends::build_store(&daemon_config).await?;
    let shared = backends::build_cache(&daemon_config)?;
    let queue = backends::build_queue(&daemon_config).await?;

    let ts_config = TimeseriesConfig::from_env();
    let sink = Arc::new(HttpLineProtocolSink::new(ts_config.clone())?);
    let timeseries = Arc::new(TimeSeriesWriter::spawn(ts_config, sink));

    let ingest_config = IngestConfig::from_env();
    let (mqtt_client, eventloop) = factoryops_ingest::connect(&ingest_config);
    let coordinator = Arc::new(IngestionCoordinator::new(
        ingest_config,
        Arc::clone(&shared),
        Arc::clone(&store),
        Arc::clone(&timeseries),
        Arc::clone(&queue),
    ));

    let ingestion_shutdown = CancellationToken::new();
    let ingestion_handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = ingestion_shutdown.clone();
        tokio::spawn(async move {
            coordinator.run(mqtt_client, eventloop, shutdown).await;
        })
    };

    let rule_cache = Arc::new(RuleCache::new(Arc::clone(&store)));
    spawn_invalidation_listener(Arc::clone(&shared), Arc::clone(&rule_cache));

    let alerting_worker = Arc::new(AlertingWorker::new(
        Arc::clone(&store),
        Arc::clone(&rule_cache),
        Arc::clone(&queue),
        daemon_config.notification_dispatch_wait,
    ));
    let alerting_shutdown = CancellationToken::new();
    let alerting_handles = alerting_runner::spawn(
        Arc::clone(&alerting_worker),
        Arc::clone(&queue),
        daemon_config.alerting_workers,
        daemon_config.queue_poll_interval,
        alerting_shutdown.clone(),
    );

    info!(
        alerting_workers = daemon_config.alerting_workers,
        "factoryops-daemon started"
    );

    shutdown_signal().await;
    info!("shutdown signal received; draining in-flight work");

    ingestion_shutdown.cancel();
    alerting_shutdown.cancel();

    let drain = async {
        let _ = ingestion_handle.await;
        for handle in alerting_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(daemon_config.shutdown_grace, drain).await.is_err() {
        tracing::warn!("shutdown grace period elapsed with work still in flight; exiting anyway");
    }

    // Drop every remaining handle to the time-series writer so its internal
    // channel closes and the buffering task flushes its last batch before
    // the process exits.
    drop(coordinator);
    drop(timeseries);

    info!("factoryops-daemon shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
