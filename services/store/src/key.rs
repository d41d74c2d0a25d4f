//! Object key rules shared by the publisher and the notifier.
//!
//! Report keys have the shape `{prefix}/{stamp}.{extension}` where `stamp` is
//! the run date at midnight, e.g. `reports/2024-06-03T00:00:00.html`. The
//! stamp only changes once per day, so a retried run overwrites the object
//! written by the failed attempt instead of adding a second one.

use chrono::NaiveDate;
use std::fmt;

const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Append a trailing `/` to a non-empty prefix that lacks one.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Whether `key` starts with `prefix`, ignoring surrounding whitespace in
/// the configured value. The comparison is a plain string prefix, so
/// `reports/weekly-` matches `reports/weekly-2024-06-03.html`.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix.trim())
}

/// Deterministic key a report is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageObjectKey(String);

impl StorageObjectKey {
    /// Key for the report of `run_date`.
    pub fn for_report(prefix: &str, run_date: NaiveDate, extension: &str) -> Self {
        let stamp = run_date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.format(STAMP_FORMAT).to_string())
            .unwrap_or_else(|| run_date.to_string());

        Self(format!(
            "{prefix}{stamp}.{extension}",
            prefix = normalize_prefix(prefix),
            stamp = stamp,
            extension = extension.trim_start_matches('.'),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StorageObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
