//! Shared utility functions

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 datetime string, returning `None` if it is malformed
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse a datetime string (RFC3339 format) or return current time
///
/// Only used for bookkeeping columns. Freshness-relevant timestamps go
/// through [`parse_datetime`] so that a corrupt value is never mistaken for
/// a recent one.
pub fn parse_datetime_or_now(s: &str) -> DateTime<Utc> {
    parse_datetime(s).unwrap_or_else(Utc::now)
}

/// Format bytes as human-readable string
///
/// Converts byte sizes into human-readable format with appropriate units
/// (B, KB, MB, GB, TB). Uses binary units (1024 base).
///
/// # Examples
///
/// ```
/// use shellcache_db::utils::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1048576), "1.00 MB");
/// assert_eq!(format_bytes(500), "500 B");
/// ```
pub fn format_bytes(bytes: i64) -> String {
    if bytes < 0 {
        return format!("{} B", bytes);
    }

    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;
    const TB: i64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
