//! Queue-cleaning orchestrator: drives one scheduled pass over the arr
//! queues and their matching download-client torrents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sweeparr_config::{BlockAction, QueueCleanerSettings};
use sweeparr_core::{
    ArrManager, DownloadClient, JobRunStore, JobStatus, Notice, Notifier, Protocol, QueueRecord,
    StrikeKind, StrikeRequest, Torrent, normalize_hash,
};
use sweeparr_events::{Event, EventBus, JobKind};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CleanerError, CleanerResult};
use crate::evaluate::{Verdict, evaluate_slow, evaluate_stall};
use crate::filter::ContentFilter;
use crate::gate::MutationGate;
use crate::pass::{CancelFlag, PassSummary, should_notify, with_timeout};
use crate::rules::RuleManager;
use crate::strikes::StrikeTracker;

/// One arr manager joined with the download client its queue points at.
#[derive(Clone)]
pub struct ArrTarget {
    pub manager: Arc<dyn ArrManager>,
    pub client: Arc<dyn DownloadClient>,
}

/// Orchestrates one queue-cleaning pass.
///
/// Work across independent targets fans out concurrently; work for one item
/// hash stays serialised through the strike store. Adapter failures are
/// contained per instance, persistence failures abort the pass.
pub struct QueueCleaner {
    settings: QueueCleanerSettings,
    timeout: Duration,
    rules: RuleManager,
    filter: Option<ContentFilter>,
    tracker: Arc<StrikeTracker>,
    runs: Arc<dyn JobRunStore>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    gate: MutationGate,
}

impl QueueCleaner {
    /// Build the orchestrator, compiling block patterns up front.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Pattern`] when a configured regex fails to
    /// compile.
    pub fn new(
        settings: QueueCleanerSettings,
        timeout: Duration,
        tracker: Arc<StrikeTracker>,
        runs: Arc<dyn JobRunStore>,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> CleanerResult<Self> {
        let filter = if settings.blocklist.enabled {
            Some(ContentFilter::from_settings(&settings.blocklist)?)
        } else {
            None
        };
        let rules = RuleManager::new(settings.stall_rules.clone(), settings.slow_rules.clone());
        let gate = MutationGate::new(settings.dry_run);

        Ok(Self {
            settings,
            timeout,
            rules,
            filter,
            tracker,
            runs,
            events,
            notifier,
            gate,
        })
    }

    /// Execute one pass across the given targets.
    ///
    /// # Errors
    ///
    /// Returns an error only for pass-fatal conditions (store failures);
    /// adapter and per-item failures are logged and contained.
    pub async fn run_pass(
        self: &Arc<Self>,
        targets: Vec<ArrTarget>,
        cancel: &CancelFlag,
    ) -> anyhow::Result<PassSummary> {
        let run = self
            .runs
            .begin_run(JobKind::QueueCleaner)
            .await
            .map_err(|source| CleanerError::store("begin_run", source))?;
        self.events.publish(Event::JobRunStarted {
            run_id: run.id,
            kind: JobKind::QueueCleaner,
            dry_run: self.gate.is_dry_run(),
        });
        info!(
            run_id = %run.id,
            targets = targets.len(),
            dry_run = self.gate.is_dry_run(),
            "queue cleaning pass started"
        );

        let mut tasks = JoinSet::new();
        for target in targets {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            let run_id = run.id;
            tasks.spawn(async move {
                let instance = target.manager.name().to_string();
                let result = this.process_instance(&target, run_id, &cancel).await;
                (instance, result)
            });
        }

        let mut summary = PassSummary {
            run_id: run.id,
            ..PassSummary::default()
        };
        let mut fatal: Option<anyhow::Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(part))) => summary.absorb(&part),
                Ok((instance, Err(error))) => {
                    if is_store_error(&error) {
                        fatal.get_or_insert(error);
                    } else {
                        summary.instances_failed += 1;
                        warn!(instance, error = %error, "instance skipped for this pass");
                        self.emit(Event::InstanceFailed {
                            instance,
                            message: format!("{error:#}"),
                        })
                        .await;
                    }
                }
                Err(join_error) => {
                    summary.instances_failed += 1;
                    warn!(error = %join_error, "instance task aborted");
                }
            }
        }

        if let Some(error) = fatal {
            let _ = self.runs.finish_run(run.id, JobStatus::Failed).await;
            self.emit(Event::JobRunFailed {
                run_id: run.id,
                kind: JobKind::QueueCleaner,
                message: format!("{error:#}"),
            })
            .await;
            return Err(error);
        }

        if let Err(source) = self.runs.finish_run(run.id, JobStatus::Completed).await {
            let error = CleanerError::store("finish_run", source);
            self.emit(Event::JobRunFailed {
                run_id: run.id,
                kind: JobKind::QueueCleaner,
                message: error.to_string(),
            })
            .await;
            return Err(error.into());
        }

        self.events.publish(Event::JobRunCompleted {
            run_id: run.id,
            kind: JobKind::QueueCleaner,
            items_processed: summary.items_processed,
            removals: summary.removals,
        });
        info!(
            run_id = %run.id,
            items = summary.items_processed,
            removals = summary.removals,
            failed_instances = summary.instances_failed,
            "queue cleaning pass completed"
        );
        Ok(summary)
    }

    async fn process_instance(
        &self,
        target: &ArrTarget,
        run_id: Uuid,
        cancel: &CancelFlag,
    ) -> anyhow::Result<PassSummary> {
        let manager = target.manager.as_ref();
        let client = target.client.as_ref();

        let torrents = with_timeout(
            self.timeout,
            client.name(),
            "list_torrents",
            client.list_torrents(None),
        )
        .await?;
        let torrents: HashMap<String, Torrent> = torrents
            .into_iter()
            .map(|torrent| (normalize_hash(&torrent.hash), torrent))
            .collect();

        let mut summary = PassSummary::default();
        let page_size = self.settings.page_size;
        let mut page = 1_u32;
        'pages: loop {
            if cancel.is_cancelled() {
                info!(instance = manager.name(), "pass cancelled between pages");
                break;
            }
            let queue = with_timeout(
                self.timeout,
                manager.name(),
                "queue_page",
                manager.queue_page(page, page_size),
            )
            .await?;
            if queue.records.is_empty() {
                break;
            }
            let fetched = queue.records.len();

            for record in queue.records {
                if cancel.is_cancelled() {
                    info!(instance = manager.name(), "pass cancelled between items");
                    break 'pages;
                }
                if record.protocol != Protocol::Torrent {
                    continue;
                }
                if self.is_ignored(&record.title) {
                    debug!(title = %record.title, "queue record matches an ignore pattern");
                    continue;
                }
                let hash = normalize_hash(&record.download_id);
                let Some(torrent) = torrents.get(&hash) else {
                    debug!(
                        title = %record.title,
                        download_id = %record.download_id,
                        "no torrent joined for queue record"
                    );
                    continue;
                };

                summary.items_processed += 1;
                match self.process_item(manager, client, run_id, &record, torrent).await {
                    Ok(removed) => {
                        if removed {
                            summary.removals += 1;
                        }
                    }
                    Err(error) if is_store_error(&error) => return Err(error),
                    Err(error) => {
                        warn!(
                            title = %record.title,
                            hash = %torrent.hash,
                            error = %error,
                            "item processing failed"
                        );
                    }
                }
            }

            let seen = u64::from(page) * u64::from(page_size);
            if seen >= queue.total || fetched < page_size as usize {
                break;
            }
            page += 1;
        }

        Ok(summary)
    }

    /// Process one joined (queue record, torrent) pair; returns whether the
    /// record was removed.
    async fn process_item(
        &self,
        manager: &dyn ArrManager,
        client: &dyn DownloadClient,
        run_id: Uuid,
        record: &QueueRecord,
        torrent: &Torrent,
    ) -> anyhow::Result<bool> {
        if let Some(filter) = &self.filter {
            let files = match &torrent.files {
                Some(files) => files.clone(),
                None => {
                    with_timeout(
                        self.timeout,
                        client.name(),
                        "get_files",
                        client.get_files(&torrent.hash),
                    )
                    .await?
                }
            };
            let decision = filter.evaluate(&files);
            let to_skip = decision.files_to_skip();
            if !to_skip.is_empty() {
                for index in &to_skip {
                    self.gate.set_file_skip(client, &torrent.hash, *index).await?;
                }
                self.emit(Event::FilesBlocked {
                    hash: torrent.hash.clone(),
                    name: torrent.name.clone(),
                    blocked: decision.blocked_count(),
                    total: u32::try_from(files.len()).unwrap_or(u32::MAX),
                    fully_blocked: decision.all_files_blocked,
                    dry_run: self.gate.is_dry_run(),
                })
                .await;
            }
            if decision.all_files_blocked {
                // The transfer contributes nothing; stall/slow accounting
                // does not apply on top.
                return self.handle_fully_blocked(manager, run_id, record, torrent).await;
            }
        }

        if let Some(rule) = self.rules.find_stall_rule(torrent) {
            let previous = self
                .tracker
                .previous_bytes(&torrent.hash, StrikeKind::Stalled)
                .await?;
            match evaluate_stall(torrent, rule, previous) {
                Verdict::Violation => {
                    let outcome = self
                        .tracker
                        .record(StrikeRequest {
                            hash: torrent.hash.clone(),
                            title: record.title.clone(),
                            kind: StrikeKind::Stalled,
                            job_run_id: run_id,
                            max_strikes: rule.max_strikes,
                            downloaded_bytes: Some(
                                i64::try_from(torrent.downloaded_bytes).unwrap_or(i64::MAX),
                            ),
                        })
                        .await?;
                    if outcome.condemned {
                        self.remove_record(manager, record, torrent, rule.delete_private_from_client)
                            .await?;
                        return Ok(true);
                    }
                    // Stall takes precedence: one strike kind per item per pass.
                    return Ok(false);
                }
                Verdict::Reset => {
                    self.tracker.reset(&torrent.hash, StrikeKind::Stalled).await?;
                }
                Verdict::NoViolation | Verdict::NotApplicable => {}
            }
        }

        if let Some(rule) = self.rules.find_slow_rule(torrent) {
            let now = Utc::now();
            let applicable = !torrent.is_complete()
                && torrent.is_downloading()
                && !(torrent.download_bps == 0 && !torrent.is_stalled());
            let below = applicable && torrent.download_bps < rule.min_speed_bps;
            let below_since = self.tracker.slow_sample(&torrent.hash, below, now);
            if evaluate_slow(torrent, rule, below_since, now) == Verdict::Violation {
                let outcome = self
                    .tracker
                    .record(StrikeRequest {
                        hash: torrent.hash.clone(),
                        title: record.title.clone(),
                        kind: StrikeKind::Slow,
                        job_run_id: run_id,
                        max_strikes: rule.max_strikes,
                        downloaded_bytes: Some(
                            i64::try_from(torrent.downloaded_bytes).unwrap_or(i64::MAX),
                        ),
                    })
                    .await?;
                if outcome.condemned {
                    self.remove_record(manager, record, torrent, rule.delete_private_from_client)
                        .await?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    async fn handle_fully_blocked(
        &self,
        manager: &dyn ArrManager,
        run_id: Uuid,
        record: &QueueRecord,
        torrent: &Torrent,
    ) -> anyhow::Result<bool> {
        match self.settings.blocklist.block_action {
            BlockAction::Remove => {
                self.remove_record(manager, record, torrent, false).await?;
                Ok(true)
            }
            BlockAction::Strike => {
                let outcome = self
                    .tracker
                    .record(StrikeRequest {
                        hash: torrent.hash.clone(),
                        title: record.title.clone(),
                        kind: StrikeKind::FailedImport,
                        job_run_id: run_id,
                        max_strikes: self.settings.blocklist.max_strikes,
                        downloaded_bytes: None,
                    })
                    .await?;
                if outcome.condemned {
                    self.remove_record(manager, record, torrent, false).await?;
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    /// Remove a condemned record from the arr queue, deleting the client
    /// payload only when the torrent is public or the rule allows it.
    async fn remove_record(
        &self,
        manager: &dyn ArrManager,
        record: &QueueRecord,
        torrent: &Torrent,
        delete_private: bool,
    ) -> anyhow::Result<()> {
        let remove_from_client = !torrent.is_private || delete_private;
        self.gate
            .remove_from_queue(manager, record.id, remove_from_client)
            .await?;
        // In dry-run mode nothing was actually removed; leave the item's
        // condemned state in place so operators keep seeing the decision.
        if !self.gate.is_dry_run() {
            self.tracker.mark_removed(&torrent.hash).await?;
        }

        if self.settings.search_after_removal
            && let Err(error) = self.gate.trigger_search(manager, &[record.item_id]).await
        {
            warn!(
                instance = manager.name(),
                item_id = record.item_id,
                error = %error,
                "replacement search failed"
            );
        }

        self.emit(Event::QueueRecordRemoved {
            hash: torrent.hash.clone(),
            title: record.title.clone(),
            instance: manager.name().to_string(),
            deleted_from_client: remove_from_client,
            dry_run: self.gate.is_dry_run(),
        })
        .await;
        Ok(())
    }

    fn is_ignored(&self, title: &str) -> bool {
        let lowered = title.to_lowercase();
        self.settings
            .ignored_titles
            .iter()
            .any(|pattern| lowered.contains(&pattern.to_lowercase()))
    }

    async fn emit(&self, event: Event) {
        let notify = should_notify(&event);
        let notice = notify.then(|| Notice::from_event(&event));
        self.events.publish(event);
        if let Some(notice) = notice
            && let Err(error) = self.notifier.publish(notice).await
        {
            warn!(error = %error, "notification delivery failed");
        }
    }
}

fn is_store_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<CleanerError>(),
        Some(CleanerError::Store { .. })
    )
}
