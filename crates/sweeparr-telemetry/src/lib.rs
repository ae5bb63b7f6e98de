//! Telemetry primitives shared across the Sweeparr workspace.
//!
//! Centralises logging initialisation and the metrics registry so every
//! surface reports through one consistent observability story.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

/// Default logging target when `RUST_LOG` is not provided.
const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for
/// example, because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    BUILD_SHA
        .set(config.build_sha.to_string())
        .ok()
        .or(Some(()));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));

    let builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    pub level: &'a str,
    pub format: LogFormat,
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse a configured format label, falling back to [`LogFormat::infer`].
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("json") => Self::Json,
            Some("pretty") => Self::Pretty,
            _ => Self::infer(),
        }
    }
}

/// Access the build SHA recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_emitted_total: IntCounterVec,
    passes_total: IntCounterVec,
    strikes_recorded_total: IntCounterVec,
    queue_removals_total: IntCounter,
    downloads_cleaned_total: IntCounter,
    torrents_recategorized_total: IntCounter,
    instance_failures_total: IntCounter,
    queue_items: IntGauge,
}

/// Snapshot of selected counters and gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub queue_items: i64,
    pub queue_removals_total: u64,
    pub downloads_cleaned_total: u64,
    pub torrents_recategorized_total: u64,
    pub instance_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )?;
        let passes_total = IntCounterVec::new(
            Opts::new("passes_total", "Cleaning passes executed by kind and status"),
            &["kind", "status"],
        )?;
        let strikes_recorded_total = IntCounterVec::new(
            Opts::new("strikes_recorded_total", "Strikes recorded by kind"),
            &["kind"],
        )?;
        let queue_removals_total = IntCounter::with_opts(Opts::new(
            "queue_removals_total",
            "Queue records removed by the queue cleaner",
        ))?;
        let downloads_cleaned_total = IntCounter::with_opts(Opts::new(
            "downloads_cleaned_total",
            "Seed-complete torrents deleted by the download cleaner",
        ))?;
        let torrents_recategorized_total = IntCounter::with_opts(Opts::new(
            "torrents_recategorized_total",
            "Torrents quarantined by the unlinked policy",
        ))?;
        let instance_failures_total = IntCounter::with_opts(Opts::new(
            "instance_failures_total",
            "Backend instances skipped due to adapter failures",
        ))?;
        let queue_items =
            IntGauge::with_opts(Opts::new("queue_items", "Queue records seen in the last pass"))?;

        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(passes_total.clone()))?;
        registry.register(Box::new(strikes_recorded_total.clone()))?;
        registry.register(Box::new(queue_removals_total.clone()))?;
        registry.register(Box::new(downloads_cleaned_total.clone()))?;
        registry.register(Box::new(torrents_recategorized_total.clone()))?;
        registry.register(Box::new(instance_failures_total.clone()))?;
        registry.register(Box::new(queue_items.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                events_emitted_total,
                passes_total,
                strikes_recorded_total,
                queue_removals_total,
                downloads_cleaned_total,
                torrents_recategorized_total,
                instance_failures_total,
                queue_items,
            }),
        })
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Increment the pass counter for the given kind and terminal status.
    pub fn inc_pass(&self, kind: &str, status: &str) {
        self.inner
            .passes_total
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Increment the strike counter for a strike kind.
    pub fn inc_strike(&self, kind: &str) {
        self.inner
            .strikes_recorded_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Increment the queue removal counter.
    pub fn inc_queue_removal(&self) {
        self.inner.queue_removals_total.inc();
    }

    /// Increment the cleaned download counter.
    pub fn inc_download_cleaned(&self) {
        self.inner.downloads_cleaned_total.inc();
    }

    /// Increment the recategorisation counter.
    pub fn inc_recategorized(&self) {
        self.inner.torrents_recategorized_total.inc();
    }

    /// Increment the instance failure counter.
    pub fn inc_instance_failure(&self) {
        self.inner.instance_failures_total.inc();
    }

    /// Record the queue depth observed in the last pass.
    pub fn set_queue_items(&self, count: i64) {
        self.inner.queue_items.set(count);
    }

    /// Render the metrics registry using the Prometheus text exposition
    /// format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant collectors.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_items: self.inner.queue_items.get(),
            queue_removals_total: self.inner.queue_removals_total.get(),
            downloads_cleaned_total: self.inner.downloads_cleaned_total.get(),
            torrents_recategorized_total: self.inner.torrents_recategorized_total.get(),
            instance_failures_total: self.inner.instance_failures_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_pass("queue_cleaner", "completed");
        metrics.inc_strike("stalled");
        metrics.inc_strike("stalled");
        metrics.inc_queue_removal();
        metrics.set_queue_items(12);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_items, 12);
        assert_eq!(snapshot.queue_removals_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("strikes_recorded_total"));
        assert!(rendered.contains("passes_total"));
        Ok(())
    }

    #[test]
    fn log_format_parses_labels() {
        assert!(matches!(LogFormat::from_label(Some("json")), LogFormat::Json));
        assert!(matches!(
            LogFormat::from_label(Some("pretty")),
            LogFormat::Pretty
        ));
        let _ = LogFormat::from_label(None);
        let _ = LogFormat::from_label(Some("unknown"));
    }
}
