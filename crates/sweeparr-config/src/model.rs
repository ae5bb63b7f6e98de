//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers deserialised from the settings file.
//! - Validation and coverage analysis live in `validate.rs`.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root settings document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Postgres connection string for the strike/job-run store.
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub queue_cleaner: QueueCleanerSettings,
    #[serde(default)]
    pub download_cleaner: DownloadCleanerSettings,
    /// Configured arr-manager instances.
    #[serde(default)]
    pub arr_instances: Vec<ArrInstanceSettings>,
    /// Configured download-client instances.
    #[serde(default)]
    pub client_instances: Vec<ClientInstanceSettings>,
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive applied when `RUST_LOG` is unset.
    #[serde(default = "defaults::log_level")]
    pub level: String,
    /// Output format: `json` or `pretty`.
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            format: None,
        }
    }
}

/// Cadence and timeout knobs for the scheduled passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSettings {
    /// Seconds between queue-cleaner passes.
    #[serde(default = "defaults::queue_interval_secs")]
    pub queue_interval_secs: u64,
    /// Seconds between download-cleaner passes.
    #[serde(default = "defaults::download_interval_secs")]
    pub download_interval_secs: u64,
    /// Timeout applied to every adapter call.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            queue_interval_secs: defaults::queue_interval_secs(),
            download_interval_secs: defaults::download_interval_secs(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

/// Privacy scope a rule applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Public,
    Private,
    #[default]
    Both,
}

impl RuleScope {
    /// Whether a torrent with the given privacy flag falls inside the scope.
    #[must_use]
    pub const fn includes(self, is_private: bool) -> bool {
        match self {
            Self::Both => true,
            Self::Public => !is_private,
            Self::Private => is_private,
        }
    }
}

/// Policy for transfers that report a downloading state without progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StallRule {
    /// Display name, unique within the rule list.
    pub name: String,
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Consecutive violations before the item is condemned.
    #[serde(default = "defaults::max_strikes")]
    pub max_strikes: u32,
    #[serde(default)]
    pub scope: RuleScope,
    /// Inclusive lower bound of the completion coverage interval.
    #[serde(default)]
    pub min_completion: f64,
    /// Exclusive upper bound of the completion coverage interval.
    #[serde(default = "defaults::max_completion")]
    pub max_completion: f64,
    /// Clear accumulated strikes when downloaded bytes move forward.
    #[serde(default = "defaults::enabled")]
    pub reset_strikes_on_progress: bool,
    /// Whether condemned private torrents may be deleted from the client.
    #[serde(default)]
    pub delete_private_from_client: bool,
}

/// Policy for transfers downloading below an acceptable speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlowRule {
    /// Display name, unique within the rule list.
    pub name: String,
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    /// Consecutive violations before the item is condemned.
    #[serde(default = "defaults::max_strikes")]
    pub max_strikes: u32,
    #[serde(default)]
    pub scope: RuleScope,
    /// Inclusive lower bound of the completion coverage interval.
    #[serde(default)]
    pub min_completion: f64,
    /// Exclusive upper bound of the completion coverage interval.
    #[serde(default = "defaults::max_completion")]
    pub max_completion: f64,
    /// Minimum acceptable download speed in bytes per second.
    pub min_speed_bps: u64,
    /// Seconds a transfer must stay below the threshold before it counts.
    #[serde(default = "defaults::min_sample_secs")]
    pub min_sample_secs: u64,
    /// Whether condemned private torrents may be deleted from the client.
    #[serde(default)]
    pub delete_private_from_client: bool,
}

/// How literal block patterns are compared against file paths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LiteralMatchMode {
    /// Case-insensitive substring containment.
    #[default]
    Substring,
    /// Case-insensitive whole-path equality.
    Exact,
}

/// Action taken when content filtering blocks every file of a transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// Record a failed-import strike and let the threshold decide.
    #[default]
    Strike,
    /// Remove the transfer immediately.
    Remove,
}

/// Unwanted-content filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlocklistSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub literal_mode: LiteralMatchMode,
    /// Literal patterns compared per `literal_mode`.
    #[serde(default)]
    pub literals: Vec<String>,
    /// Regular-expression patterns, compiled case-insensitively.
    #[serde(default)]
    pub regexes: Vec<String>,
    /// Threshold used when `block_action` is `strike`.
    #[serde(default = "defaults::max_strikes")]
    pub max_strikes: u32,
    #[serde(default)]
    pub block_action: BlockAction,
}

impl Default for BlocklistSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            literal_mode: LiteralMatchMode::default(),
            literals: Vec::new(),
            regexes: Vec::new(),
            max_strikes: defaults::max_strikes(),
            block_action: BlockAction::default(),
        }
    }
}

/// Queue supervision pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueCleanerSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Compute and persist decisions but never mutate external systems.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub stall_rules: Vec<StallRule>,
    #[serde(default)]
    pub slow_rules: Vec<SlowRule>,
    #[serde(default)]
    pub blocklist: BlocklistSettings,
    /// Queue records whose title matches one of these case-insensitive
    /// substrings are never touched.
    #[serde(default)]
    pub ignored_titles: Vec<String>,
    /// Trigger a replacement search after removing a queue record.
    #[serde(default)]
    pub search_after_removal: bool,
    /// Page size used when fetching arr queues.
    #[serde(default = "defaults::queue_page_size")]
    pub page_size: u32,
}

impl Default for QueueCleanerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: false,
            stall_rules: Vec::new(),
            slow_rules: Vec::new(),
            blocklist: BlocklistSettings::default(),
            ignored_titles: Vec::new(),
            search_after_removal: false,
            page_size: defaults::queue_page_size(),
        }
    }
}

/// Per-category seeding cleanup policy.
///
/// A `-1` sentinel on `max_ratio` or `max_seed_time_secs` disables that
/// branch of the violation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryRule {
    /// Client category the rule applies to.
    pub name: String,
    #[serde(default = "defaults::unlimited_f64")]
    pub max_ratio: f64,
    /// Minimum seeding time before the ratio branch may trigger.
    #[serde(default)]
    pub min_seed_time_secs: i64,
    #[serde(default = "defaults::unlimited_i64")]
    pub max_seed_time_secs: i64,
    /// Delete the payload alongside the torrent.
    #[serde(default)]
    pub delete_source_files: bool,
}

/// Quarantine policy for downloads without hard-linked library copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlinkedSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Categories eligible for the hardlink check.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Category unlinked torrents are moved into.
    #[serde(default = "defaults::unlinked_target_category")]
    pub target_category: String,
}

impl Default for UnlinkedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            categories: Vec::new(),
            target_category: defaults::unlinked_target_category(),
        }
    }
}

/// Seeding cleanup pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DownloadCleanerSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Compute and log decisions but never mutate external systems.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
    #[serde(default)]
    pub unlinked: UnlinkedSettings,
}

/// One configured arr-manager instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrInstanceSettings {
    /// Unique display name.
    pub name: String,
    /// Backend kind (e.g. `sonarr`, `radarr`).
    pub kind: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Download client instance this manager's queue joins against.
    pub download_client: String,
}

/// One configured download-client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientInstanceSettings {
    /// Unique display name, referenced by `ArrInstanceSettings`.
    pub name: String,
    /// Backend kind (e.g. `qbittorrent`, `transmission`, `deluge`).
    pub kind: String,
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_scope_matches_privacy() {
        assert!(RuleScope::Both.includes(true));
        assert!(RuleScope::Both.includes(false));
        assert!(RuleScope::Private.includes(true));
        assert!(!RuleScope::Private.includes(false));
        assert!(RuleScope::Public.includes(false));
        assert!(!RuleScope::Public.includes(true));
    }

    #[test]
    fn settings_deserialise_with_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").expect("empty settings");
        assert!(!settings.queue_cleaner.enabled);
        assert_eq!(settings.queue_cleaner.page_size, 100);
        assert_eq!(settings.schedule.request_timeout_secs, 30);
        assert!(settings.arr_instances.is_empty());
    }

    #[test]
    fn category_rule_sentinels_default_to_unlimited() {
        let rule: CategoryRule = serde_yaml::from_str("name: tv").expect("category rule");
        assert!((rule.max_ratio - -1.0).abs() < f64::EPSILON);
        assert_eq!(rule.max_seed_time_secs, -1);
        assert_eq!(rule.min_seed_time_secs, 0);
    }
}
