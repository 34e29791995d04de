//! Freshness policy

use chrono::{DateTime, Utc};
use std::time::Duration;

/// How long an entry may be served without revalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// Presence alone is enough
    NoExpiry,
    /// Fresh while `now - fetched_at < max_age`
    MaxAge(Duration),
}

/// Age of an entry, `None` when its timestamp is missing or unparseable
///
/// A timestamp in the future counts as age zero.
pub fn entry_age(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    let fetched_at = fetched_at?;
    Some((now - fetched_at).to_std().unwrap_or(Duration::ZERO))
}

impl FreshnessPolicy {
    pub fn is_fresh(&self, fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match self {
            FreshnessPolicy::NoExpiry => true,
            FreshnessPolicy::MaxAge(max_age) => {
                entry_age(fetched_at, now).is_some_and(|age| age < *max_age)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_max_age_window() {
        let policy = FreshnessPolicy::MaxAge(Duration::from_secs(600));
        assert!(policy.is_fresh(Some(t0()), t0()));
        assert!(policy.is_fresh(Some(t0()), t0() + secs(300)));
        assert!(policy.is_fresh(Some(t0()), t0() + secs(599)));
        assert!(!policy.is_fresh(Some(t0()), t0() + secs(600)));
        assert!(!policy.is_fresh(Some(t0()), t0() + secs(700)));
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        let policy = FreshnessPolicy::MaxAge(Duration::from_secs(600));
        assert!(!policy.is_fresh(None, t0()));
        assert_eq!(entry_age(None, t0()), None);
    }

    #[test]
    fn test_future_timestamp_is_age_zero() {
        let policy = FreshnessPolicy::MaxAge(Duration::from_secs(600));
        assert_eq!(entry_age(Some(t0() + secs(3600)), t0()), Some(Duration::ZERO));
        assert!(policy.is_fresh(Some(t0() + secs(3600)), t0()));
    }

    #[test]
    fn test_zero_max_age_never_fresh() {
        let policy = FreshnessPolicy::MaxAge(Duration::ZERO);
        assert!(!policy.is_fresh(Some(t0()), t0()));
    }

    #[test]
    fn test_no_expiry() {
        let policy = FreshnessPolicy::NoExpiry;
        assert!(policy.is_fresh(Some(t0()), t0() + secs(86400 * 365)));
        assert!(policy.is_fresh(None, t0()));
    }
}
