//! Settings file loading.

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Settings;
use crate::validate::{Advisory, validate_settings};

/// Load and validate a settings document from a YAML file.
///
/// Coverage advisories are returned alongside the settings so callers can
/// surface them; they never block startup.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the file cannot be read, parsed, or fails
/// hard validation.
pub fn load_settings(path: impl AsRef<Path>) -> ConfigResult<(Settings, Vec<Advisory>)> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { source })?;
    let advisories = validate_settings(&settings)?;

    info!(
        path = %path.display(),
        arr_instances = settings.arr_instances.len(),
        client_instances = settings.client_instances.len(),
        advisories = advisories.len(),
        "settings loaded"
    );
    Ok((settings, advisories))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
database_url: postgres://sweeparr@localhost/sweeparr
queue_cleaner:
  enabled: true
  dry_run: true
  stall_rules:
    - name: default
      max_strikes: 3
      scope: both
  slow_rules:
    - name: floor
      min_speed_bps: 51200
      min_sample_secs: 300
  blocklist:
    enabled: true
    literals: ["sample", ".lnk"]
    regexes: ["(?i)\\.exe$"]
client_instances:
  - name: qbit-main
    kind: qbittorrent
    base_url: http://localhost:8080
arr_instances:
  - name: sonarr-main
    kind: sonarr
    base_url: http://localhost:8989
    api_key: secret
    download_client: qbit-main
"#;

    #[test]
    fn sample_document_round_trips() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write sample");

        let (settings, advisories) = load_settings(file.path()).expect("load sample");
        assert!(settings.queue_cleaner.enabled);
        assert!(settings.queue_cleaner.dry_run);
        assert_eq!(settings.queue_cleaner.stall_rules.len(), 1);
        assert_eq!(settings.queue_cleaner.slow_rules[0].min_speed_bps, 51_200);
        assert_eq!(settings.arr_instances[0].download_client, "qbit-main");
        assert!(advisories.is_empty(), "full-range default rules cover [0, 100)");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = load_settings("/definitely/not/here.yaml").expect_err("missing file");
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"queue_cleaner:\n  no_such_field: true\n")
            .expect("write sample");
        let error = load_settings(file.path()).expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }
}
