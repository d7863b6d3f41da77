// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules.

pub mod deliveries;
pub mod messages;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width UTC timestamp as stored in every TEXT time column.
///
/// Millisecond precision with a `Z` suffix, so lexical order is time order and
/// expiry comparisons can run in SQL.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let a = DateTime::parse_from_rfc3339("2026-03-01T09:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + chrono::Duration::milliseconds(1500);
        assert_eq!(format_ts(a), "2026-03-01T09:05:00.000Z");
        assert_eq!(format_ts(b), "2026-03-01T09:05:01.500Z");
        assert!(format_ts(a) < format_ts(b));
        assert_eq!(parse_ts(&format_ts(b)).unwrap(), b);
    }
}
