//! Content filtering: decides per file whether it is wanted.

use regex::{Regex, RegexBuilder};
use sweeparr_config::{BlocklistSettings, LiteralMatchMode};
use sweeparr_core::FileEntry;

use crate::error::{CleanerError, CleanerResult};

/// Verdict for one file of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVerdict {
    /// File index within the torrent payload.
    pub index: u32,
    /// Whether a block pattern matched the file path.
    pub blocked: bool,
    /// Whether the client already excludes the file from download.
    pub already_skipped: bool,
}

/// Aggregate filter decision for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub verdicts: Vec<FileVerdict>,
    /// True when every file still wanted at the client is blocked — the
    /// transfer contributes nothing and is eligible for removal regardless
    /// of strike count.
    pub all_files_blocked: bool,
}

impl FilterDecision {
    /// Indexes that should be newly marked "skip" at the client.
    ///
    /// Already-skipped files are excluded so the downstream mutation stays
    /// idempotent.
    #[must_use]
    pub fn files_to_skip(&self) -> Vec<u32> {
        self.verdicts
            .iter()
            .filter(|verdict| verdict.blocked && !verdict.already_skipped)
            .map(|verdict| verdict.index)
            .collect()
    }

    /// Number of files a block pattern matched.
    #[must_use]
    pub fn blocked_count(&self) -> u32 {
        u32::try_from(self.verdicts.iter().filter(|v| v.blocked).count()).unwrap_or(u32::MAX)
    }
}

/// Matches file paths against the configured block patterns.
///
/// Patterns are compiled once at construction; evaluation is pure and free
/// of side effects — applying the decision is the orchestrator's job.
#[derive(Debug)]
pub struct ContentFilter {
    literal_mode: LiteralMatchMode,
    literals: Vec<String>,
    regexes: Vec<Regex>,
}

impl ContentFilter {
    /// Build a filter from blocklist settings.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Pattern`] when a regex pattern fails to
    /// compile. Literal patterns cannot fail.
    pub fn from_settings(settings: &BlocklistSettings) -> CleanerResult<Self> {
        let literals = settings
            .literals
            .iter()
            .map(|pattern| pattern.to_lowercase())
            .collect();
        let regexes = settings
            .regexes
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| CleanerError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<CleanerResult<Vec<_>>>()?;

        Ok(Self {
            literal_mode: settings.literal_mode,
            literals,
            regexes,
        })
    }

    /// Evaluate a transfer's file listing against the block patterns.
    ///
    /// An empty listing yields an empty decision with
    /// `all_files_blocked == false`: absent metadata is never treated as
    /// fully blocked. A listing whose every file is already skipped at the
    /// client is fully blocked — the transfer contributes nothing.
    #[must_use]
    pub fn evaluate(&self, files: &[FileEntry]) -> FilterDecision {
        let verdicts: Vec<FileVerdict> = files
            .iter()
            .map(|file| FileVerdict {
                index: file.index,
                blocked: self.is_blocked(&file.path),
                already_skipped: file.skipped,
            })
            .collect();

        let all_files_blocked = !verdicts.is_empty()
            && verdicts
                .iter()
                .filter(|verdict| !verdict.already_skipped)
                .all(|verdict| verdict.blocked);

        FilterDecision {
            verdicts,
            all_files_blocked,
        }
    }

    fn is_blocked(&self, path: &str) -> bool {
        let lowered = path.to_lowercase();
        let literal_hit = match self.literal_mode {
            LiteralMatchMode::Substring => {
                self.literals.iter().any(|pattern| lowered.contains(pattern))
            }
            LiteralMatchMode::Exact => self.literals.iter().any(|pattern| &lowered == pattern),
        };
        literal_hit || self.regexes.iter().any(|regex| regex.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(index: u32, path: &str, skipped: bool) -> FileEntry {
        FileEntry {
            index,
            path: path.to_string(),
            size_bytes: 1_024,
            bytes_completed: 0,
            skipped,
        }
    }

    fn filter_with(literals: &[&str], regexes: &[&str]) -> ContentFilter {
        let settings = BlocklistSettings {
            enabled: true,
            literal_mode: LiteralMatchMode::Substring,
            literals: literals.iter().map(ToString::to_string).collect(),
            regexes: regexes.iter().map(ToString::to_string).collect(),
            max_strikes: 3,
            block_action: sweeparr_config::BlockAction::Strike,
        };
        ContentFilter::from_settings(&settings).expect("valid patterns")
    }

    #[test]
    fn literal_match_is_case_insensitive() {
        let filter = filter_with(&["SAMPLE"], &[]);
        let decision = filter.evaluate(&[
            file(0, "Show.S01E01/sample.mkv", false),
            file(1, "Show.S01E01/episode.mkv", false),
        ]);
        assert!(decision.verdicts[0].blocked);
        assert!(!decision.verdicts[1].blocked);
        assert!(!decision.all_files_blocked);
        assert_eq!(decision.files_to_skip(), vec![0]);
    }

    #[test]
    fn exact_mode_requires_whole_path_equality() {
        let settings = BlocklistSettings {
            enabled: true,
            literal_mode: LiteralMatchMode::Exact,
            literals: vec!["junk.exe".to_string()],
            regexes: Vec::new(),
            max_strikes: 3,
            block_action: sweeparr_config::BlockAction::Strike,
        };
        let filter = ContentFilter::from_settings(&settings).expect("valid patterns");
        let decision = filter.evaluate(&[file(0, "JUNK.EXE", false), file(1, "dir/junk.exe", false)]);
        assert!(decision.verdicts[0].blocked);
        assert!(!decision.verdicts[1].blocked);
    }

    #[test]
    fn regex_patterns_block_matching_files() {
        let filter = filter_with(&[], &[r"\.(exe|lnk|zipx)$"]);
        let decision = filter.evaluate(&[
            file(0, "release/setup.EXE", false),
            file(1, "release/movie.mkv", false),
        ]);
        assert!(decision.verdicts[0].blocked);
        assert!(!decision.verdicts[1].blocked);
    }

    #[test]
    fn fully_blocked_when_every_wanted_file_matches() {
        let filter = filter_with(&["sample"], &[r"\.nfo$"]);
        let decision = filter.evaluate(&[
            file(0, "release/sample.mkv", false),
            file(1, "release/info.nfo", false),
        ]);
        assert!(decision.all_files_blocked);
    }

    #[test]
    fn already_skipped_files_do_not_rescue_a_blocked_transfer() {
        let filter = filter_with(&["sample"], &[]);
        let decision = filter.evaluate(&[
            file(0, "release/sample.mkv", false),
            file(1, "release/movie.mkv", true),
        ]);
        assert!(
            decision.all_files_blocked,
            "the only still-wanted file is blocked"
        );
        assert_eq!(decision.files_to_skip(), vec![0]);
    }

    #[test]
    fn unmatched_wanted_file_keeps_transfer_alive() {
        let filter = filter_with(&["sample"], &[]);
        let decision = filter.evaluate(&[
            file(0, "release/sample.mkv", false),
            file(1, "release/movie.mkv", false),
        ]);
        assert!(!decision.all_files_blocked);
    }

    #[test]
    fn empty_listing_is_never_fully_blocked() {
        let filter = filter_with(&["sample"], &[]);
        let decision = filter.evaluate(&[]);
        assert!(!decision.all_files_blocked);
        assert!(decision.files_to_skip().is_empty());
    }

    #[test]
    fn invalid_regex_is_reported_with_the_pattern() {
        let settings = BlocklistSettings {
            enabled: true,
            literal_mode: LiteralMatchMode::Substring,
            literals: Vec::new(),
            regexes: vec!["[unclosed".to_string()],
            max_strikes: 3,
            block_action: sweeparr_config::BlockAction::Strike,
        };
        let error = ContentFilter::from_settings(&settings).expect_err("invalid regex");
        assert!(matches!(error, CleanerError::Pattern { .. }));
    }
}
