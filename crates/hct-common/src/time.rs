//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Shared primitives and utilities for the update agent."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use chrono::{DateTime, SecondsFormat, Utc};

/// Compact stamp used to namespace run logs and backups (`20240131T101500.000042`).
///
/// Microsecond resolution keeps back-to-back runs of one component apart; the
/// fixed width keeps lexical order equal to chronological order.
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.6f").to_string()
}

/// RFC 3339 timestamp with second precision, used in run log lines.
pub fn log_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_stamp_is_compact() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 10, 15, 0).unwrap();
        assert_eq!(run_stamp(at), "20240131T101500.000000");
        assert_eq!(log_timestamp(at), "2024-01-31T10:15:00Z");
    }

    #[test]
    fn run_stamp_separates_runs_within_one_second() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 10, 15, 0).unwrap();
        let next = at + chrono::Duration::microseconds(1);
        assert_eq!(run_stamp(next), "20240131T101500.000001");
        assert!(run_stamp(at) < run_stamp(next));
    }
}
