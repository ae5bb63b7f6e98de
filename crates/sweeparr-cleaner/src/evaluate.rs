//! Verdict evaluation: applies a matched rule's thresholds to a torrent.

use chrono::{DateTime, Utc};
use sweeparr_config::{SlowRule, StallRule};
use sweeparr_core::Torrent;

/// Outcome of evaluating one rule against one torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The rule's thresholds are breached; a strike should be recorded.
    Violation,
    /// The rule applies but is not breached.
    NoViolation,
    /// Qualifying progress was observed; accumulated strikes should clear.
    Reset,
    /// The rule does not apply to the torrent in its current state.
    NotApplicable,
}

/// Evaluate a stall rule.
///
/// `previous_bytes` is the downloaded-byte counter stored with the item's
/// most recent stall strike (supplied by the strike tracker); `None` means
/// no stall strike exists yet. Finished transfers are never starvable, so
/// completion at 100% is [`Verdict::NotApplicable`].
#[must_use]
pub fn evaluate_stall(torrent: &Torrent, rule: &StallRule, previous_bytes: Option<i64>) -> Verdict {
    if torrent.is_complete() || !torrent.is_downloading() {
        return Verdict::NotApplicable;
    }

    let current = i64::try_from(torrent.downloaded_bytes).unwrap_or(i64::MAX);
    if let Some(previous) = previous_bytes
        && current > previous
    {
        // Forward movement since the last strike.
        return if rule.reset_strikes_on_progress {
            Verdict::Reset
        } else {
            Verdict::NoViolation
        };
    }

    if torrent.is_stalled() {
        return Verdict::Violation;
    }

    // The client reports plain downloading: only a frozen byte counter
    // relative to an earlier strike counts as a continued stall.
    if previous_bytes.is_some() {
        Verdict::Violation
    } else {
        Verdict::NoViolation
    }
}

/// Evaluate a slow rule.
///
/// `below_since` is the instant the transfer was first observed under the
/// speed threshold (held by the strike tracker's observation map); `None`
/// means the transfer is at or above the threshold. The violation only
/// fires once the transfer has been sampled below the threshold for the
/// rule's minimum duration.
#[must_use]
pub fn evaluate_slow(
    torrent: &Torrent,
    rule: &SlowRule,
    below_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Verdict {
    if torrent.is_complete() || !torrent.is_downloading() {
        return Verdict::NotApplicable;
    }

    // Zero declared speed without a stalled state means the transfer is not
    // actually moving data (queued, checking); starving it is pointless and
    // stall handling owns the stalled case.
    if torrent.download_bps == 0 && !torrent.is_stalled() {
        return Verdict::NotApplicable;
    }

    if torrent.download_bps >= rule.min_speed_bps {
        return Verdict::NoViolation;
    }

    match below_since {
        Some(since) => {
            let sampled = now.signed_duration_since(since).num_seconds();
            if sampled >= i64::try_from(rule.min_sample_secs).unwrap_or(i64::MAX) {
                Verdict::Violation
            } else {
                Verdict::NoViolation
            }
        }
        None => Verdict::NoViolation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sweeparr_config::RuleScope;
    use sweeparr_core::TorrentState;

    fn stall_rule(reset_on_progress: bool) -> StallRule {
        StallRule {
            name: "default".to_string(),
            enabled: true,
            max_strikes: 3,
            scope: RuleScope::Both,
            min_completion: 0.0,
            max_completion: 100.0,
            reset_strikes_on_progress: reset_on_progress,
            delete_private_from_client: false,
        }
    }

    fn slow_rule(min_speed_bps: u64, min_sample_secs: u64) -> SlowRule {
        SlowRule {
            name: "floor".to_string(),
            enabled: true,
            max_strikes: 3,
            scope: RuleScope::Both,
            min_completion: 0.0,
            max_completion: 100.0,
            min_speed_bps,
            min_sample_secs,
            delete_private_from_client: false,
        }
    }

    fn torrent(state: TorrentState, downloaded: u64, speed: u64) -> Torrent {
        Torrent {
            hash: "e".repeat(40),
            name: "release".to_string(),
            category: "movies".to_string(),
            is_private: false,
            state,
            size_bytes: 1_000,
            downloaded_bytes: downloaded,
            download_bps: speed,
            ratio: 0.0,
            eta_seconds: None,
            seeding_seconds: 0,
            save_path: "/downloads".to_string(),
            files: None,
        }
    }

    #[test]
    fn complete_torrents_are_not_applicable_for_either_rule() {
        let finished = torrent(TorrentState::Downloading, 1_000, 0);
        assert_eq!(
            evaluate_stall(&finished, &stall_rule(true), Some(500)),
            Verdict::NotApplicable
        );
        assert_eq!(
            evaluate_slow(&finished, &slow_rule(100, 0), None, Utc::now()),
            Verdict::NotApplicable
        );
    }

    #[test]
    fn client_reported_stall_is_a_violation() {
        let stalled = torrent(TorrentState::Stalled, 400, 0);
        assert_eq!(
            evaluate_stall(&stalled, &stall_rule(true), None),
            Verdict::Violation
        );
    }

    #[test]
    fn frozen_counter_since_last_strike_is_a_violation() {
        let idle = torrent(TorrentState::Downloading, 400, 10);
        assert_eq!(
            evaluate_stall(&idle, &stall_rule(true), Some(400)),
            Verdict::Violation
        );
    }

    #[test]
    fn progress_resets_when_the_rule_requests_it() {
        let moving = torrent(TorrentState::Downloading, 500, 10);
        assert_eq!(
            evaluate_stall(&moving, &stall_rule(true), Some(400)),
            Verdict::Reset
        );
        assert_eq!(
            evaluate_stall(&moving, &stall_rule(false), Some(400)),
            Verdict::NoViolation
        );
    }

    #[test]
    fn first_observation_of_a_progressing_download_is_clean() {
        let moving = torrent(TorrentState::Downloading, 500, 10);
        assert_eq!(
            evaluate_stall(&moving, &stall_rule(true), None),
            Verdict::NoViolation
        );
    }

    #[test]
    fn paused_torrents_are_not_applicable() {
        let paused = torrent(TorrentState::Paused, 400, 0);
        assert_eq!(
            evaluate_stall(&paused, &stall_rule(true), Some(300)),
            Verdict::NotApplicable
        );
    }

    #[test]
    fn slow_violation_requires_the_sample_window() {
        let crawling = torrent(TorrentState::Downloading, 400, 50);
        let rule = slow_rule(1_024, 600);
        let now = Utc::now();

        assert_eq!(
            evaluate_slow(&crawling, &rule, Some(now), now),
            Verdict::NoViolation,
            "just dipped below the threshold"
        );
        assert_eq!(
            evaluate_slow(&crawling, &rule, Some(now - Duration::seconds(601)), now),
            Verdict::Violation
        );
    }

    #[test]
    fn adequate_speed_is_clean() {
        let healthy = torrent(TorrentState::Downloading, 400, 2_048);
        assert_eq!(
            evaluate_slow(&healthy, &slow_rule(1_024, 600), None, Utc::now()),
            Verdict::NoViolation
        );
    }

    #[test]
    fn zero_speed_without_stall_state_is_not_applicable() {
        let queued = torrent(TorrentState::Downloading, 400, 0);
        assert_eq!(
            evaluate_slow(&queued, &slow_rule(1_024, 600), None, Utc::now()),
            Verdict::NotApplicable
        );
    }
}
