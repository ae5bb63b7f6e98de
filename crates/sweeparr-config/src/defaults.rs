//! Default values for settings fields.
//!
//! # Design
//! - Centralize serde defaults so the documented configuration surface and
//!   the deserialiser cannot drift apart.

pub(crate) fn log_level() -> String {
    "info".to_string()
}

pub(crate) const fn enabled() -> bool {
    true
}

pub(crate) const fn max_strikes() -> u32 {
    3
}

pub(crate) const fn max_completion() -> f64 {
    100.0
}

pub(crate) const fn min_sample_secs() -> u64 {
    600
}

pub(crate) const fn queue_interval_secs() -> u64 {
    300
}

pub(crate) const fn download_interval_secs() -> u64 {
    900
}

pub(crate) const fn request_timeout_secs() -> u64 {
    30
}

pub(crate) const fn queue_page_size() -> u32 {
    100
}

pub(crate) const fn unlimited_f64() -> f64 {
    -1.0
}

pub(crate) const fn unlimited_i64() -> i64 {
    -1
}

pub(crate) fn unlinked_target_category() -> String {
    "sweeparr-unlinked".to_string()
}
