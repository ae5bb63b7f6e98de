//! Wires configuration, telemetry, the durable store, and the cleaning
//! engine together, then runs the recurring scheduler until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sweeparr_cleaner::{CancelFlag, DownloadCleaner, QueueCleaner, StrikeTracker};
use sweeparr_config::load_settings;
use sweeparr_core::{JobRunStore, Notice, Notifier, StrikeStore};
use sweeparr_data::CleaningStore;
use sweeparr_events::{Event, EventBus, JobKind};
use sweeparr_fsops::FsHardlinkInspector;
use sweeparr_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::{AdapterFactory, StubAdapterFactory};
use crate::error::{AppError, AppResult};
use crate::scheduler::{JobGuard, spawn_recurring};

const DEFAULT_CONFIG_PATH: &str = "sweeparr.yaml";

/// Notifier that logs notices; real delivery transports are integration
/// points behind the same trait.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notice: Notice) -> anyhow::Result<()> {
        info!(
            event = %notice.event_type,
            severity = ?notice.severity,
            "{}",
            notice.message
        );
        Ok(())
    }
}

/// Bootstrap with the default (backend-less) adapter factory.
///
/// # Errors
///
/// Returns an error when configuration, telemetry, or store initialisation
/// fails, or when instances are configured without a backend to drive them.
pub async fn run_app() -> AppResult<()> {
    run_app_with(&StubAdapterFactory).await
}

/// Bootstrap with a caller-supplied adapter factory.
///
/// # Errors
///
/// Returns an error when configuration, telemetry, or store initialisation
/// fails, or when the factory rejects a configured instance.
pub async fn run_app_with(factory: &dyn AdapterFactory) -> AppResult<()> {
    let config_path =
        std::env::var("SWEEPARR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let (settings, advisories) = load_settings(&config_path)?;

    let format = LogFormat::from_label(settings.logging.format.as_deref());
    init_logging(&LoggingConfig {
        level: &settings.logging.level,
        format,
        build_sha: option_env!("SWEEPARR_BUILD_SHA").unwrap_or("dev"),
    })
    .map_err(AppError::Telemetry)?;
    let metrics = Metrics::new().map_err(AppError::Telemetry)?;

    let events = EventBus::new();
    spawn_metrics_pump(&events, metrics.clone());
    for advisory in advisories {
        warn!(advisory = %advisory.message, "rule coverage advisory");
        events.publish(Event::ConfigAdvisory {
            message: advisory.message,
        });
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to the cleaning store database")
        .map_err(AppError::Database)?;
    let store = Arc::new(
        CleaningStore::new(pool)
            .await
            .map_err(AppError::Database)?,
    );

    let adapters = factory.build(&settings)?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let timeout = Duration::from_secs(settings.schedule.request_timeout_secs);

    let tracker = Arc::new(StrikeTracker::new(
        Arc::clone(&store) as Arc<dyn StrikeStore>,
        events.clone(),
    ));
    let queue_cleaner = Arc::new(QueueCleaner::new(
        settings.queue_cleaner.clone(),
        timeout,
        tracker,
        Arc::clone(&store) as Arc<dyn JobRunStore>,
        events.clone(),
        Arc::clone(&notifier),
    )?);
    let download_cleaner = Arc::new(DownloadCleaner::new(
        settings.download_cleaner.clone(),
        timeout,
        Arc::clone(&store) as Arc<dyn JobRunStore>,
        events.clone(),
        Arc::clone(&notifier),
        Some(Arc::new(FsHardlinkInspector::new())),
    ));

    let cancel = CancelFlag::new();
    let guard = JobGuard::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = Vec::new();

    if settings.queue_cleaner.enabled {
        if adapters.targets.is_empty() {
            warn!("queue cleaner enabled but no arr instances are configured");
        } else {
            let cleaner = Arc::clone(&queue_cleaner);
            let targets = adapters.targets.clone();
            let cancel = cancel.clone();
            loops.push(spawn_recurring(
                JobKind::QueueCleaner,
                Duration::from_secs(settings.schedule.queue_interval_secs),
                guard.clone(),
                shutdown_rx.clone(),
                move || {
                    let cleaner = Arc::clone(&cleaner);
                    let targets = targets.clone();
                    let cancel = cancel.clone();
                    async move { cleaner.run_pass(targets, &cancel).await }
                },
            ));
        }
    }

    if settings.download_cleaner.enabled {
        if adapters.clients.is_empty() {
            warn!("download cleaner enabled but no client instances are configured");
        } else {
            let cleaner = Arc::clone(&download_cleaner);
            let clients = adapters.clients.clone();
            let cancel = cancel.clone();
            loops.push(spawn_recurring(
                JobKind::DownloadCleaner,
                Duration::from_secs(settings.schedule.download_interval_secs),
                guard,
                shutdown_rx,
                move || {
                    let cleaner = Arc::clone(&cleaner);
                    let clients = clients.clone();
                    let cancel = cancel.clone();
                    async move { cleaner.run_pass(clients, &cancel).await }
                },
            ));
        }
    }

    info!(loops = loops.len(), "sweeparr started");
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
    }

    info!("shutdown requested; cancelling in-flight passes");
    cancel.cancel();
    let _ = shutdown_tx.send(true);
    for handle in loops {
        let _ = handle.await;
    }
    info!("sweeparr stopped");
    Ok(())
}

/// Forward bus events into the metrics registry.
fn spawn_metrics_pump(events: &EventBus, metrics: Metrics) {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            metrics.inc_event(envelope.event.kind());
            match &envelope.event {
                Event::StrikeRecorded { kind, .. } => metrics.inc_strike(kind.as_str()),
                Event::QueueRecordRemoved { .. } => metrics.inc_queue_removal(),
                Event::DownloadCleaned { .. } => metrics.inc_download_cleaned(),
                Event::TorrentRecategorized { .. } => metrics.inc_recategorized(),
                Event::InstanceFailed { .. } => metrics.inc_instance_failure(),
                Event::JobRunCompleted {
                    kind,
                    items_processed,
                    ..
                } => {
                    metrics.inc_pass(kind.as_str(), "completed");
                    if *kind == JobKind::QueueCleaner {
                        metrics
                            .set_queue_items(i64::try_from(*items_processed).unwrap_or(i64::MAX));
                    }
                }
                Event::JobRunFailed { kind, .. } => metrics.inc_pass(kind.as_str(), "failed"),
                _ => {}
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeparr_events::StrikeKind;

    #[tokio::test]
    async fn metrics_pump_translates_events() {
        let events = EventBus::with_capacity(32);
        let metrics = Metrics::new().expect("metrics");
        spawn_metrics_pump(&events, metrics.clone());

        events.publish(Event::StrikeRecorded {
            hash: "a".repeat(40),
            name: "release".into(),
            kind: StrikeKind::Stalled,
            count: 1,
            max_strikes: 3,
        });
        events.publish(Event::QueueRecordRemoved {
            hash: "a".repeat(40),
            title: "release".into(),
            instance: "sonarr-main".into(),
            deleted_from_client: true,
            dry_run: false,
        });

        // Let the pump task drain the bus.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_removals_total, 1);
    }

    #[tokio::test]
    async fn log_notifier_swallows_nothing() {
        let notifier = LogNotifier;
        let notice = Notice::from_event(&Event::ConfigAdvisory {
            message: "stall rules leave public torrents uncovered in [40, 60)".into(),
        });
        notifier.publish(notice).await.expect("logging never fails");
    }
}
