//! Postgres persistence for the strike ledger and job-run audit trail.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use sweeparr_core::{
    DownloadItem, JobRun, JobRunStore, JobStatus, Strike, StrikeKind, StrikeOutcome,
    StrikeRequest, StrikeStore, normalize_hash,
};
use sweeparr_events::JobKind;
use tracing::{debug, warn};
use uuid::Uuid;

/// Database-backed repository for cleaning state.
#[derive(Clone)]
pub struct CleaningStore {
    pool: PgPool,
}

const UPSERT_ITEM: &str = r"
    INSERT INTO download_items (id, hash, title)
    VALUES ($1, $2, $3)
    ON CONFLICT (hash) DO UPDATE
    SET is_returning = download_items.is_returning OR download_items.removed,
        removed = FALSE
    RETURNING id
";

const INSERT_STRIKE: &str = r"
    INSERT INTO strikes (id, item_id, job_run_id, kind, created_at, last_downloaded_bytes)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (item_id, job_run_id, kind) DO NOTHING
";

const COUNT_STRIKES_BY_ITEM: &str = r"
    SELECT COUNT(*) AS live FROM strikes WHERE item_id = $1 AND kind = $2
";

const MARK_CONDEMNED: &str = r"
    UPDATE download_items SET marked_for_removal = TRUE WHERE id = $1
";

const DELETE_STRIKES_BY_HASH_KIND: &str = r"
    DELETE FROM strikes
    USING download_items
    WHERE strikes.item_id = download_items.id
      AND download_items.hash = $1
      AND strikes.kind = $2
";

const COUNT_STRIKES_BY_HASH: &str = r"
    SELECT COUNT(*) AS live
    FROM strikes
    JOIN download_items ON strikes.item_id = download_items.id
    WHERE download_items.hash = $1 AND strikes.kind = $2
";

const LAST_DOWNLOADED_BYTES: &str = r"
    SELECT strikes.last_downloaded_bytes
    FROM strikes
    JOIN download_items ON strikes.item_id = download_items.id
    WHERE download_items.hash = $1 AND strikes.kind = $2
    ORDER BY strikes.created_at DESC
    LIMIT 1
";

const MARK_REMOVED: &str = r"
    UPDATE download_items
    SET removed = TRUE, marked_for_removal = TRUE
    WHERE hash = $1
    RETURNING id
";

const DELETE_STRIKES_BY_ITEM: &str = r"
    DELETE FROM strikes WHERE item_id = $1
";

const DELETE_ORPHANED_ITEMS: &str = r"
    DELETE FROM download_items
    WHERE NOT EXISTS (
        SELECT 1 FROM strikes WHERE strikes.item_id = download_items.id
    )
";

const DELETE_ALL_STRIKES: &str = r"DELETE FROM strikes";

const INSERT_JOB_RUN: &str = r"
    INSERT INTO job_runs (id, kind, started_at) VALUES ($1, $2, $3)
";

const FINISH_JOB_RUN: &str = r"
    UPDATE job_runs SET completed_at = $2, status = $3 WHERE id = $1
";

const LIST_ITEMS: &str = r"
    SELECT id, hash, title, marked_for_removal, removed, is_returning
    FROM download_items
    ORDER BY created_at
";

const LIST_STRIKES_FOR: &str = r"
    SELECT strikes.id, strikes.item_id, strikes.job_run_id, strikes.kind,
           strikes.created_at, strikes.last_downloaded_bytes
    FROM strikes
    JOIN download_items ON strikes.item_id = download_items.id
    WHERE download_items.hash = $1
    ORDER BY strikes.created_at
";

const LIST_RECENT_RUNS: &str = r"
    SELECT id, kind, started_at, completed_at, status
    FROM job_runs
    ORDER BY id DESC
    LIMIT $1
";

impl CleaningStore {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run cleaning store migrations")?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load every supervised download item, for reporting surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_items(&self) -> Result<Vec<DownloadItem>> {
        let rows = sqlx::query(LIST_ITEMS)
            .fetch_all(&self.pool)
            .await
            .context("failed to list download items")?;
        rows.into_iter()
            .map(|row| {
                Ok(DownloadItem {
                    id: row.try_get("id")?,
                    hash: row.try_get("hash")?,
                    title: row.try_get("title")?,
                    marked_for_removal: row.try_get("marked_for_removal")?,
                    removed: row.try_get("removed")?,
                    returning: row.try_get("is_returning")?,
                })
            })
            .collect()
    }

    /// Load the strike ledger for one hash, for reporting surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn strikes_for(&self, hash: &str) -> Result<Vec<Strike>> {
        let rows = sqlx::query(LIST_STRIKES_FOR)
            .bind(normalize_hash(hash))
            .fetch_all(&self.pool)
            .await
            .context("failed to list strikes")?;
        rows.into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(Strike {
                    id: row.try_get("id")?,
                    item_id: row.try_get("item_id")?,
                    job_run_id: row.try_get("job_run_id")?,
                    kind: parse_strike_kind(&kind),
                    created_at: row.try_get("created_at")?,
                    last_downloaded_bytes: row.try_get("last_downloaded_bytes")?,
                })
            })
            .collect()
    }

    /// Load the most recent job runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<JobRun>> {
        let rows = sqlx::query(LIST_RECENT_RUNS)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("failed to list job runs")?;
        rows.into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let status: Option<String> = row.try_get("status")?;
                Ok(JobRun {
                    id: row.try_get("id")?,
                    kind: parse_job_kind(&kind),
                    started_at: row.try_get("started_at")?,
                    completed_at: row.try_get("completed_at")?,
                    status: status.as_deref().map(parse_job_status),
                })
            })
            .collect()
    }
}

fn parse_strike_kind(label: &str) -> StrikeKind {
    match label {
        "stalled" => StrikeKind::Stalled,
        "slow" => StrikeKind::Slow,
        "failed_import" => StrikeKind::FailedImport,
        other => {
            warn!(kind = %other, "unknown strike kind in store; treating as stalled");
            StrikeKind::Stalled
        }
    }
}

fn parse_job_kind(label: &str) -> JobKind {
    match label {
        "download_cleaner" => JobKind::DownloadCleaner,
        "queue_cleaner" => JobKind::QueueCleaner,
        other => {
            warn!(kind = %other, "unknown job kind in store; treating as queue cleaner");
            JobKind::QueueCleaner
        }
    }
}

fn parse_job_status(label: &str) -> JobStatus {
    match label {
        "failed" => JobStatus::Failed,
        "completed" => JobStatus::Completed,
        other => {
            warn!(status = %other, "unknown job status in store; treating as failed");
            JobStatus::Failed
        }
    }
}


#[async_trait]
impl StrikeStore for CleaningStore {
    async fn record_strike(&self, request: StrikeRequest) -> Result<StrikeOutcome> {
        let hash = normalize_hash(&request.hash);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open strike transaction")?;

        // The upsert takes a row-level lock on the item for the remainder of
        // the transaction, serialising concurrent strikes on the same hash.
        let item_id: Uuid = sqlx::query(UPSERT_ITEM)
            .bind(Uuid::new_v4())
            .bind(&hash)
            .bind(&request.title)
            .fetch_one(&mut *tx)
            .await
            .context("failed to upsert download item")?
            .try_get("id")?;

        let inserted = sqlx::query(INSERT_STRIKE)
            .bind(Uuid::new_v4())
            .bind(item_id)
            .bind(request.job_run_id)
            .bind(request.kind.as_str())
            .bind(Utc::now())
            .bind(request.downloaded_bytes)
            .execute(&mut *tx)
            .await
            .context("failed to insert strike")?
            .rows_affected();

        let live: i64 = sqlx::query(COUNT_STRIKES_BY_ITEM)
            .bind(item_id)
            .bind(request.kind.as_str())
            .fetch_one(&mut *tx)
            .await
            .context("failed to count live strikes")?
            .try_get("live")?;
        let live_count = u32::try_from(live).unwrap_or(u32::MAX);
        let condemned = live_count >= request.max_strikes;

        if condemned {
            sqlx::query(MARK_CONDEMNED)
                .bind(item_id)
                .execute(&mut *tx)
                .await
                .context("failed to flag item for removal")?;
        }

        tx.commit().await.context("failed to commit strike transaction")?;

        debug!(
            hash,
            kind = request.kind.as_str(),
            live_count,
            condemned,
            "strike recorded"
        );
        Ok(StrikeOutcome {
            recorded: inserted == 1,
            live_count,
            condemned,
        })
    }

    async fn reset_strikes(&self, hash: &str, kind: StrikeKind) -> Result<u64> {
        let removed = sqlx::query(DELETE_STRIKES_BY_HASH_KIND)
            .bind(normalize_hash(hash))
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .context("failed to reset strikes")?
            .rows_affected();
        Ok(removed)
    }

    async fn live_strike_count(&self, hash: &str, kind: StrikeKind) -> Result<u32> {
        let live: i64 = sqlx::query(COUNT_STRIKES_BY_HASH)
            .bind(normalize_hash(hash))
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .context("failed to count strikes")?
            .try_get("live")?;
        Ok(u32::try_from(live).unwrap_or(u32::MAX))
    }

    async fn last_downloaded_bytes(&self, hash: &str, kind: StrikeKind) -> Result<Option<i64>> {
        let row = sqlx::query(LAST_DOWNLOADED_BYTES)
            .bind(normalize_hash(hash))
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to load last observed bytes")?;
        Ok(row
            .map(|row| row.try_get::<Option<i64>, _>("last_downloaded_bytes"))
            .transpose()?
            .flatten())
    }

    async fn mark_removed(&self, hash: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open removal transaction")?;

        let row = sqlx::query(MARK_REMOVED)
            .bind(normalize_hash(hash))
            .fetch_optional(&mut *tx)
            .await
            .context("failed to flag item removed")?;
        if let Some(row) = row {
            let item_id: Uuid = row.try_get("id")?;
            sqlx::query(DELETE_STRIKES_BY_ITEM)
                .bind(item_id)
                .execute(&mut *tx)
                .await
                .context("failed to clear strikes for removed item")?;
        }

        tx.commit().await.context("failed to commit removal transaction")?;
        Ok(())
    }

    async fn delete_orphaned_items(&self) -> Result<u64> {
        let removed = sqlx::query(DELETE_ORPHANED_ITEMS)
            .execute(&self.pool)
            .await
            .context("failed to delete orphaned items")?
            .rows_affected();
        Ok(removed)
    }

    async fn purge_all(&self) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open purge transaction")?;
        let strikes = sqlx::query(DELETE_ALL_STRIKES)
            .execute(&mut *tx)
            .await
            .context("failed to purge strikes")?
            .rows_affected();
        sqlx::query(DELETE_ORPHANED_ITEMS)
            .execute(&mut *tx)
            .await
            .context("failed to purge orphaned items")?;
        tx.commit().await.context("failed to commit purge transaction")?;
        Ok(strikes)
    }
}

#[async_trait]
impl JobRunStore for CleaningStore {
    async fn begin_run(&self, kind: JobKind) -> Result<JobRun> {
        let run = JobRun {
            id: Uuid::now_v7(),
            kind,
            started_at: Utc::now(),
            completed_at: None,
            status: None,
        };
        sqlx::query(INSERT_JOB_RUN)
            .bind(run.id)
            .bind(kind.as_str())
            .bind(run.started_at)
            .execute(&self.pool)
            .await
            .context("failed to insert job run")?;
        Ok(run)
    }

    async fn finish_run(&self, run_id: Uuid, status: JobStatus) -> Result<()> {
        sqlx::query(FINISH_JOB_RUN)
            .bind(run_id)
            .bind(Utc::now())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to finish job run")?;
        Ok(())
    }
}
