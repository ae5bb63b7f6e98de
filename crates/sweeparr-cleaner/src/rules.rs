//! Rule selection: picks the single best-matching rule for a torrent.

use sweeparr_config::{RuleScope, SlowRule, StallRule};
use sweeparr_core::Torrent;

/// Accessors shared by every queue rule kind for matching purposes.
trait QueueRule {
    fn enabled(&self) -> bool;
    fn scope(&self) -> RuleScope;
    /// Completion coverage interval as `[min, max)`.
    fn bounds(&self) -> (f64, f64);
}

impl QueueRule for StallRule {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn scope(&self) -> RuleScope {
        self.scope
    }

    fn bounds(&self) -> (f64, f64) {
        (self.min_completion, self.max_completion)
    }
}

impl QueueRule for SlowRule {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn scope(&self) -> RuleScope {
        self.scope
    }

    fn bounds(&self) -> (f64, f64) {
        (self.min_completion, self.max_completion)
    }
}

/// Holds the configured rule sets and answers "which rule governs this
/// torrent right now".
///
/// Matching filters by privacy scope, then by completion-interval
/// containment. Overlapping intervals are a configuration mistake, not a
/// crash condition: the rule with the lowest lower bound wins, ties broken
/// by configured order. No match means the torrent is exempt for this pass.
pub struct RuleManager {
    stall_rules: Vec<StallRule>,
    slow_rules: Vec<SlowRule>,
}

impl RuleManager {
    #[must_use]
    pub const fn new(stall_rules: Vec<StallRule>, slow_rules: Vec<SlowRule>) -> Self {
        Self {
            stall_rules,
            slow_rules,
        }
    }

    /// Select the stall rule governing `torrent`, if any.
    #[must_use]
    pub fn find_stall_rule(&self, torrent: &Torrent) -> Option<&StallRule> {
        best_match(&self.stall_rules, torrent)
    }

    /// Select the slow rule governing `torrent`, if any.
    #[must_use]
    pub fn find_slow_rule(&self, torrent: &Torrent) -> Option<&SlowRule> {
        best_match(&self.slow_rules, torrent)
    }
}

fn best_match<'rules, R: QueueRule>(rules: &'rules [R], torrent: &Torrent) -> Option<&'rules R> {
    let completion = torrent.completion_percent();
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.enabled() && rule.scope().includes(torrent.is_private))
        .filter(|(_, rule)| {
            let (min, max) = rule.bounds();
            completion >= min && completion < max
        })
        .min_by(|(left_idx, left), (right_idx, right)| {
            left.bounds()
                .0
                .total_cmp(&right.bounds().0)
                .then(left_idx.cmp(right_idx))
        })
        .map(|(_, rule)| rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeparr_core::TorrentState;

    fn stall_rule(name: &str, scope: RuleScope, min: f64, max: f64) -> StallRule {
        StallRule {
            name: name.to_string(),
            enabled: true,
            max_strikes: 3,
            scope,
            min_completion: min,
            max_completion: max,
            reset_strikes_on_progress: true,
            delete_private_from_client: false,
        }
    }

    fn torrent_at(completion_bytes: u64, is_private: bool) -> Torrent {
        Torrent {
            hash: "f".repeat(40),
            name: "release".to_string(),
            category: "tv".to_string(),
            is_private,
            state: TorrentState::Downloading,
            size_bytes: 100,
            downloaded_bytes: completion_bytes,
            download_bps: 0,
            ratio: 0.0,
            eta_seconds: None,
            seeding_seconds: 0,
            save_path: "/downloads".to_string(),
            files: None,
        }
    }

    #[test]
    fn selects_rule_containing_completion() {
        let manager = RuleManager::new(
            vec![
                stall_rule("early", RuleScope::Both, 0.0, 50.0),
                stall_rule("late", RuleScope::Both, 50.0, 100.0),
            ],
            Vec::new(),
        );

        let early = manager.find_stall_rule(&torrent_at(40, false)).expect("match");
        assert_eq!(early.name, "early");

        let late = manager.find_stall_rule(&torrent_at(50, false)).expect("match");
        assert_eq!(late.name, "late");
    }

    #[test]
    fn upper_bound_is_exclusive_and_complete_torrents_never_match() {
        let manager = RuleManager::new(
            vec![stall_rule("all", RuleScope::Both, 0.0, 100.0)],
            Vec::new(),
        );
        assert!(manager.find_stall_rule(&torrent_at(100, false)).is_none());
    }

    #[test]
    fn privacy_scope_filters_candidates() {
        let manager = RuleManager::new(
            vec![
                stall_rule("public-only", RuleScope::Public, 0.0, 100.0),
                stall_rule("private-only", RuleScope::Private, 0.0, 100.0),
            ],
            Vec::new(),
        );

        let matched = manager.find_stall_rule(&torrent_at(10, true)).expect("match");
        assert_eq!(matched.name, "private-only");

        let matched = manager.find_stall_rule(&torrent_at(10, false)).expect("match");
        assert_eq!(matched.name, "public-only");
    }

    #[test]
    fn overlap_resolves_to_lowest_lower_bound_then_configured_order() {
        let manager = RuleManager::new(
            vec![
                stall_rule("wide", RuleScope::Both, 20.0, 100.0),
                stall_rule("low", RuleScope::Both, 10.0, 60.0),
                stall_rule("low-duplicate", RuleScope::Both, 10.0, 80.0),
            ],
            Vec::new(),
        );

        let matched = manager.find_stall_rule(&torrent_at(40, false)).expect("match");
        assert_eq!(matched.name, "low", "lowest min wins, first configured on ties");
    }

    #[test]
    fn disabled_rules_and_gaps_yield_no_match() {
        let mut disabled = stall_rule("off", RuleScope::Both, 0.0, 100.0);
        disabled.enabled = false;
        let manager = RuleManager::new(
            vec![disabled, stall_rule("tail", RuleScope::Both, 80.0, 100.0)],
            Vec::new(),
        );
        assert!(manager.find_stall_rule(&torrent_at(40, false)).is_none());
    }
}
