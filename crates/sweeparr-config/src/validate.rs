//! Validation and coverage analysis for settings documents.
//!
//! Hard failures (malformed intervals, bad regexes, broken instance wiring)
//! are [`ConfigError`]s; rule-coverage gaps are advisories only — the engine
//! treats an uncovered torrent as "no rule matches" and keeps running.

use regex::RegexBuilder;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Settings, SlowRule, StallRule};

/// Non-blocking finding surfaced to operators at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub message: String,
}

/// Validate a settings document, returning coverage advisories on success.
///
/// # Errors
///
/// Returns a [`ConfigError`] when a rule interval is malformed, a strike
/// threshold is zero, a block pattern fails to compile, or instance wiring
/// references an unknown download client.
pub fn validate_settings(settings: &Settings) -> ConfigResult<Vec<Advisory>> {
    let mut advisories = Vec::new();

    for rule in &settings.queue_cleaner.stall_rules {
        validate_interval("stall_rules", &rule.name, rule.min_completion, rule.max_completion)?;
        validate_strikes("stall_rules", &rule.name, rule.max_strikes)?;
    }
    for rule in &settings.queue_cleaner.slow_rules {
        validate_interval("slow_rules", &rule.name, rule.min_completion, rule.max_completion)?;
        validate_strikes("slow_rules", &rule.name, rule.max_strikes)?;
        if rule.min_speed_bps == 0 {
            return Err(ConfigError::InvalidField {
                section: "slow_rules".to_string(),
                field: rule.name.clone(),
                reason: "min_speed_bps must be positive".to_string(),
            });
        }
    }

    for pattern in &settings.queue_cleaner.blocklist.regexes {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
    }

    validate_instances(settings)?;

    advisories.extend(coverage_advisories(
        "stall",
        &settings.queue_cleaner.stall_rules,
        StallRule::coverage,
    ));
    advisories.extend(coverage_advisories(
        "slow",
        &settings.queue_cleaner.slow_rules,
        SlowRule::coverage,
    ));

    Ok(advisories)
}

/// Coverage accessor shared by the advisory computation.
type Coverage = Option<(f64, f64)>;

impl StallRule {
    fn coverage(&self, private: bool) -> Coverage {
        (self.enabled && self.scope.includes(private))
            .then_some((self.min_completion, self.max_completion))
    }
}

impl SlowRule {
    fn coverage(&self, private: bool) -> Coverage {
        (self.enabled && self.scope.includes(private))
            .then_some((self.min_completion, self.max_completion))
    }
}

fn validate_interval(section: &str, name: &str, min: f64, max: f64) -> ConfigResult<()> {
    let valid = (0.0..=100.0).contains(&min) && (0.0..=100.0).contains(&max) && min < max;
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            section: section.to_string(),
            field: name.to_string(),
            reason: format!("completion interval [{min}, {max}) must satisfy 0 <= min < max <= 100"),
        })
    }
}

fn validate_strikes(section: &str, name: &str, max_strikes: u32) -> ConfigResult<()> {
    if max_strikes == 0 {
        return Err(ConfigError::InvalidField {
            section: section.to_string(),
            field: name.to_string(),
            reason: "max_strikes must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_instances(settings: &Settings) -> ConfigResult<()> {
    let mut client_names = Vec::new();
    for client in &settings.client_instances {
        if client.name.trim().is_empty() {
            return Err(ConfigError::InvalidInstance {
                reason: "client instance names must not be empty".to_string(),
            });
        }
        if client_names.contains(&client.name) {
            return Err(ConfigError::InvalidInstance {
                reason: format!("duplicate client instance name '{}'", client.name),
            });
        }
        client_names.push(client.name.clone());
    }

    let mut arr_names = Vec::new();
    for arr in &settings.arr_instances {
        if arr_names.contains(&arr.name) {
            return Err(ConfigError::InvalidInstance {
                reason: format!("duplicate arr instance name '{}'", arr.name),
            });
        }
        arr_names.push(arr.name.clone());
        if !client_names.contains(&arr.download_client) {
            return Err(ConfigError::InvalidInstance {
                reason: format!(
                    "arr instance '{}' references unknown download client '{}'",
                    arr.name, arr.download_client
                ),
            });
        }
    }
    Ok(())
}

fn coverage_advisories<R>(
    label: &str,
    rules: &[R],
    coverage: impl Fn(&R, bool) -> Coverage,
) -> Vec<Advisory> {
    let mut advisories = Vec::new();
    for private in [false, true] {
        let mut intervals: Vec<(f64, f64)> = rules
            .iter()
            .filter_map(|rule| coverage(rule, private))
            .collect();
        if intervals.is_empty() {
            continue;
        }
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let scope = if private { "private" } else { "public" };
        let mut cursor = 0.0_f64;
        for (min, max) in intervals {
            if min > cursor {
                advisories.push(Advisory {
                    message: format!(
                        "{label} rules leave {scope} torrents uncovered in [{cursor}, {min})"
                    ),
                });
            }
            cursor = cursor.max(max);
        }
        if cursor < 100.0 {
            advisories.push(Advisory {
                message: format!(
                    "{label} rules leave {scope} torrents uncovered in [{cursor}, 100)"
                ),
            });
        }
    }
    advisories
}
