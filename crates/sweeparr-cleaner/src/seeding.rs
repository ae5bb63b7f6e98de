//! Download (seeding) cleaner: ratio/seed-time cleanup and the unlinked
//! quarantine policy. Shares the canonical torrent view with the queue
//! cleaner but never consumes the strike mechanism.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sweeparr_config::{CategoryRule, DownloadCleanerSettings};
use sweeparr_core::{
    DownloadClient, HardlinkInspector, JobRunStore, JobStatus, Notice, Notifier, Torrent,
};
use sweeparr_events::{Event, EventBus, JobKind};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::CleanerError;
use crate::gate::MutationGate;
use crate::pass::{CancelFlag, PassSummary, should_notify, with_timeout};

/// Orchestrates one seeding-cleanup pass across the download clients.
pub struct DownloadCleaner {
    settings: DownloadCleanerSettings,
    timeout: Duration,
    runs: Arc<dyn JobRunStore>,
    events: EventBus,
    notifier: Arc<dyn Notifier>,
    hardlinks: Option<Arc<dyn HardlinkInspector>>,
    gate: MutationGate,
}

impl DownloadCleaner {
    #[must_use]
    pub fn new(
        settings: DownloadCleanerSettings,
        timeout: Duration,
        runs: Arc<dyn JobRunStore>,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
        hardlinks: Option<Arc<dyn HardlinkInspector>>,
    ) -> Self {
        let gate = MutationGate::new(settings.dry_run);
        Self {
            settings,
            timeout,
            runs,
            events,
            notifier,
            hardlinks,
            gate,
        }
    }

    /// Execute one pass across the given clients.
    ///
    /// # Errors
    ///
    /// Returns an error only for pass-fatal conditions (store failures);
    /// adapter failures are contained per client instance.
    pub async fn run_pass(
        self: &Arc<Self>,
        clients: Vec<Arc<dyn DownloadClient>>,
        cancel: &CancelFlag,
    ) -> anyhow::Result<PassSummary> {
        let run = self
            .runs
            .begin_run(JobKind::DownloadCleaner)
            .await
            .map_err(|source| CleanerError::store("begin_run", source))?;
        self.events.publish(Event::JobRunStarted {
            run_id: run.id,
            kind: JobKind::DownloadCleaner,
            dry_run: self.gate.is_dry_run(),
        });
        info!(
            run_id = %run.id,
            clients = clients.len(),
            dry_run = self.gate.is_dry_run(),
            "download cleaning pass started"
        );

        let mut tasks = JoinSet::new();
        for client in clients {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let instance = client.name().to_string();
                let result = this.process_client(client.as_ref(), &cancel).await;
                (instance, result)
            });
        }

        let mut summary = PassSummary {
            run_id: run.id,
            ..PassSummary::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(part))) => summary.absorb(&part),
                Ok((instance, Err(error))) => {
                    summary.instances_failed += 1;
                    warn!(instance, error = %error, "client skipped for this pass");
                    self.emit(Event::InstanceFailed {
                        instance,
                        message: format!("{error:#}"),
                    })
                    .await;
                }
                Err(join_error) => {
                    summary.instances_failed += 1;
                    warn!(error = %join_error, "client task aborted");
                }
            }
        }

        if let Err(source) = self.runs.finish_run(run.id, JobStatus::Completed).await {
            let error = CleanerError::store("finish_run", source);
            self.emit(Event::JobRunFailed {
                run_id: run.id,
                kind: JobKind::DownloadCleaner,
                message: error.to_string(),
            })
            .await;
            return Err(error.into());
        }

        self.events.publish(Event::JobRunCompleted {
            run_id: run.id,
            kind: JobKind::DownloadCleaner,
            items_processed: summary.items_processed,
            removals: summary.removals,
        });
        info!(
            run_id = %run.id,
            items = summary.items_processed,
            removals = summary.removals,
            "download cleaning pass completed"
        );
        Ok(summary)
    }

    async fn process_client(
        &self,
        client: &dyn DownloadClient,
        cancel: &CancelFlag,
    ) -> anyhow::Result<PassSummary> {
        let torrents = with_timeout(
            self.timeout,
            client.name(),
            "list_torrents",
            client.list_torrents(None),
        )
        .await?;

        let mut summary = PassSummary::default();
        for torrent in torrents {
            if cancel.is_cancelled() {
                info!(client = client.name(), "pass cancelled between torrents");
                break;
            }
            summary.items_processed += 1;

            if let Some(rule) = self.category_rule(&torrent.category)
                && torrent.is_complete()
                && seeding_violation(&torrent, rule)
            {
                self.clean_download(client, &torrent, rule).await?;
                summary.removals += 1;
                continue;
            }

            if self.unlinked_candidate(&torrent) {
                match self.quarantine_if_unlinked(client, &torrent).await {
                    Ok(moved) => {
                        if moved {
                            debug!(hash = %torrent.hash, "torrent quarantined as unlinked");
                        }
                    }
                    Err(error) => {
                        warn!(
                            hash = %torrent.hash,
                            error = %error,
                            "hardlink inspection failed"
                        );
                    }
                }
            }
        }
        Ok(summary)
    }

    fn category_rule(&self, category: &str) -> Option<&CategoryRule> {
        self.settings.categories.iter().find(|rule| rule.name == category)
    }

    async fn clean_download(
        &self,
        client: &dyn DownloadClient,
        torrent: &Torrent,
        rule: &CategoryRule,
    ) -> anyhow::Result<()> {
        self.gate
            .delete_torrent(client, &torrent.hash, rule.delete_source_files)
            .await?;
        self.emit(Event::DownloadCleaned {
            hash: torrent.hash.clone(),
            name: torrent.name.clone(),
            category: torrent.category.clone(),
            ratio: torrent.ratio,
            seeding_seconds: torrent.seeding_seconds,
            deleted_files: rule.delete_source_files,
            dry_run: self.gate.is_dry_run(),
        })
        .await;
        Ok(())
    }

    fn unlinked_candidate(&self, torrent: &Torrent) -> bool {
        self.settings.unlinked.enabled
            && self.hardlinks.is_some()
            && torrent.is_complete()
            && torrent.category != self.settings.unlinked.target_category
            && self
                .settings
                .unlinked
                .categories
                .iter()
                .any(|category| category == &torrent.category)
    }

    async fn quarantine_if_unlinked(
        &self,
        client: &dyn DownloadClient,
        torrent: &Torrent,
    ) -> anyhow::Result<bool> {
        let Some(inspector) = &self.hardlinks else {
            return Ok(false);
        };
        let linked = inspector.has_hardlinks(Path::new(&torrent.save_path)).await?;
        if linked {
            return Ok(false);
        }

        let target = self.settings.unlinked.target_category.clone();
        self.gate.change_category(client, &torrent.hash, &target).await?;
        self.emit(Event::TorrentRecategorized {
            hash: torrent.hash.clone(),
            name: torrent.name.clone(),
            from_category: torrent.category.clone(),
            to_category: target,
            dry_run: self.gate.is_dry_run(),
        })
        .await;
        Ok(true)
    }

    async fn emit(&self, event: Event) {
        let notice = should_notify(&event).then(|| Notice::from_event(&event));
        self.events.publish(event);
        if let Some(notice) = notice
            && let Err(error) = self.notifier.publish(notice).await
        {
            warn!(error = %error, "notification delivery failed");
        }
    }
}

/// Ratio/seed-time violation check with `-1` sentinels disabling a branch.
fn seeding_violation(torrent: &Torrent, rule: &CategoryRule) -> bool {
    let ratio_hit = rule.max_ratio >= 0.0
        && torrent.ratio >= rule.max_ratio
        && torrent.seeding_seconds >= rule.min_seed_time_secs;
    let time_hit =
        rule.max_seed_time_secs >= 0 && torrent.seeding_seconds >= rule.max_seed_time_secs;
    ratio_hit || time_hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sweeparr_config::UnlinkedSettings;
    use sweeparr_core::TorrentState;
    use sweeparr_test_support::fixtures::sample_torrent;
    use sweeparr_test_support::mocks::{FakeDownloadClient, MemoryJobRunStore, RecordingNotifier};

    struct FixedInspector {
        linked: bool,
    }

    #[async_trait]
    impl HardlinkInspector for FixedInspector {
        async fn has_hardlinks(&self, _path: &Path) -> anyhow::Result<bool> {
            Ok(self.linked)
        }
    }

    fn seeded_torrent(hash: &str, category: &str, ratio: f64, seeding_hours: i64) -> Torrent {
        let mut torrent = sample_torrent(hash);
        torrent.category = category.to_string();
        torrent.state = TorrentState::Seeding;
        torrent.downloaded_bytes = torrent.size_bytes;
        torrent.ratio = ratio;
        torrent.seeding_seconds = seeding_hours * 3_600;
        torrent
    }

    fn category_rule(name: &str, max_ratio: f64, min_hours: i64, max_hours: i64) -> CategoryRule {
        CategoryRule {
            name: name.to_string(),
            max_ratio,
            min_seed_time_secs: min_hours * 3_600,
            max_seed_time_secs: if max_hours < 0 { -1 } else { max_hours * 3_600 },
            delete_source_files: false,
        }
    }

    fn cleaner(
        settings: DownloadCleanerSettings,
        inspector: Option<Arc<dyn HardlinkInspector>>,
    ) -> (Arc<DownloadCleaner>, Arc<MemoryJobRunStore>, EventBus) {
        let events = EventBus::with_capacity(128);
        let runs = Arc::new(MemoryJobRunStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let cleaner = Arc::new(DownloadCleaner::new(
            settings,
            Duration::from_secs(5),
            Arc::clone(&runs) as Arc<dyn JobRunStore>,
            events.clone(),
            notifier,
            inspector,
        ));
        (cleaner, runs, events)
    }

    #[test]
    fn ratio_branch_requires_minimum_seed_time() {
        let rule = category_rule("tv", 2.0, 24, -1);
        let ripe = seeded_torrent(&"a".repeat(40), "tv", 2.5, 30);
        assert!(seeding_violation(&ripe, &rule));

        let young = seeded_torrent(&"a".repeat(40), "tv", 2.5, 10);
        assert!(!seeding_violation(&young, &rule));
    }

    #[test]
    fn sentinel_disables_a_branch() {
        let no_ratio = category_rule("tv", -1.0, 0, 48);
        let high_ratio = seeded_torrent(&"a".repeat(40), "tv", 9.0, 10);
        assert!(
            !seeding_violation(&high_ratio, &no_ratio),
            "ratio branch disabled by -1"
        );

        let old = seeded_torrent(&"a".repeat(40), "tv", 0.1, 50);
        assert!(seeding_violation(&old, &no_ratio), "time branch still fires");

        let no_time = category_rule("tv", 2.0, 0, -1);
        assert!(
            !seeding_violation(&old, &no_time),
            "time branch disabled by -1"
        );
    }

    #[tokio::test]
    async fn ripe_torrent_is_deleted_per_category_rule() {
        let hash = "b".repeat(40);
        let mut rule = category_rule("movies", 2.0, 24, -1);
        rule.delete_source_files = true;
        let settings = DownloadCleanerSettings {
            enabled: true,
            dry_run: false,
            categories: vec![rule],
            unlinked: UnlinkedSettings::default(),
        };
        let (cleaner, runs, _) = cleaner(settings, None);
        let client = Arc::new(FakeDownloadClient::new(
            "qbit",
            vec![seeded_torrent(&hash, "movies", 2.5, 30)],
        ));

        let summary = cleaner
            .run_pass(
                vec![Arc::clone(&client) as Arc<dyn DownloadClient>],
                &CancelFlag::new(),
            )
            .await
            .expect("pass");

        assert_eq!(summary.removals, 1);
        assert_eq!(client.deleted(), vec![(hash, true)]);
        assert_eq!(runs.runs()[0].status, Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn dry_run_logs_instead_of_deleting() {
        let hash = "c".repeat(40);
        let settings = DownloadCleanerSettings {
            enabled: true,
            dry_run: true,
            categories: vec![category_rule("movies", 2.0, 0, -1)],
            unlinked: UnlinkedSettings::default(),
        };
        let (cleaner, _, events) = cleaner(settings, None);
        let client = Arc::new(FakeDownloadClient::new(
            "qbit",
            vec![seeded_torrent(&hash, "movies", 3.0, 5)],
        ));

        let summary = cleaner
            .run_pass(
                vec![Arc::clone(&client) as Arc<dyn DownloadClient>],
                &CancelFlag::new(),
            )
            .await
            .expect("pass");

        assert_eq!(summary.removals, 1, "decision is still computed");
        assert!(client.deleted().is_empty());

        let mut stream = events.subscribe(Some(0));
        let mut saw_dry_marker = false;
        while let Some(envelope) = tokio::time::timeout(Duration::from_millis(50), stream.next())
            .await
            .ok()
            .flatten()
        {
            if let Event::DownloadCleaned { dry_run, .. } = envelope.event {
                saw_dry_marker = dry_run;
            }
        }
        assert!(saw_dry_marker);
    }

    #[tokio::test]
    async fn unlinked_torrent_is_quarantined_not_deleted() {
        let hash = "d".repeat(40);
        let settings = DownloadCleanerSettings {
            enabled: true,
            dry_run: false,
            categories: Vec::new(),
            unlinked: UnlinkedSettings {
                enabled: true,
                categories: vec!["movies".to_string()],
                target_category: "sweeparr-unlinked".to_string(),
            },
        };
        let (cleaner, _, _) = cleaner(settings, Some(Arc::new(FixedInspector { linked: false })));
        let client = Arc::new(FakeDownloadClient::new(
            "qbit",
            vec![seeded_torrent(&hash, "movies", 0.5, 2)],
        ));

        cleaner
            .run_pass(
                vec![Arc::clone(&client) as Arc<dyn DownloadClient>],
                &CancelFlag::new(),
            )
            .await
            .expect("pass");

        assert_eq!(
            client.recategorized(),
            vec![(hash, "sweeparr-unlinked".to_string())]
        );
        assert!(client.deleted().is_empty());
    }

    #[tokio::test]
    async fn hardlinked_torrent_stays_in_place() {
        let hash = "e".repeat(40);
        let settings = DownloadCleanerSettings {
            enabled: true,
            dry_run: false,
            categories: Vec::new(),
            unlinked: UnlinkedSettings {
                enabled: true,
                categories: vec!["movies".to_string()],
                target_category: "sweeparr-unlinked".to_string(),
            },
        };
        let (cleaner, _, _) = cleaner(settings, Some(Arc::new(FixedInspector { linked: true })));
        let client = Arc::new(FakeDownloadClient::new(
            "qbit",
            vec![seeded_torrent(&hash, "movies", 0.5, 2)],
        ));

        cleaner
            .run_pass(
                vec![Arc::clone(&client) as Arc<dyn DownloadClient>],
                &CancelFlag::new(),
            )
            .await
            .expect("pass");

        assert!(client.recategorized().is_empty());
    }

    #[tokio::test]
    async fn incomplete_torrents_are_left_alone() {
        let hash = "f".repeat(40);
        let settings = DownloadCleanerSettings {
            enabled: true,
            dry_run: false,
            categories: vec![category_rule("movies", 0.0, 0, 0)],
            unlinked: UnlinkedSettings::default(),
        };
        let (cleaner, _, _) = cleaner(settings, None);
        let mut torrent = seeded_torrent(&hash, "movies", 5.0, 100);
        torrent.downloaded_bytes = torrent.size_bytes / 2;
        torrent.state = TorrentState::Downloading;
        let client = Arc::new(FakeDownloadClient::new("qbit", vec![torrent]));

        let summary = cleaner
            .run_pass(
                vec![Arc::clone(&client) as Arc<dyn DownloadClient>],
                &CancelFlag::new(),
            )
            .await
            .expect("pass");

        assert_eq!(summary.removals, 0);
        assert!(client.deleted().is_empty());
    }
}
