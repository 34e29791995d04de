//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::DbError;
use crate::utils::{parse_datetime, parse_datetime_or_now};

/// A cache namespace and its current contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entry_count: i64,
    /// Sum of body sizes in bytes
    pub total_size: i64,
}

/// Cache entry model
///
/// One row per `(namespace, method, url)`. The body itself lives in blob
/// storage under `body_digest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: i64,
    pub namespace: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Response headers in original order, as `(name, value)` pairs
    pub headers: Vec<(String, String)>,
    pub body_digest: String,
    pub size: i64,
    /// When the response was fetched. `None` if the stored value is missing
    /// or unparseable.
    pub fetched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let status: i64 = row.try_get("status")?;
        let status = u16::try_from(status)
            .map_err(|_| DbError::InvalidRow(format!("status out of range: {}", status)))?;

        let headers: String = row.try_get("headers")?;
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;

        let fetched_at: Option<String> = row.try_get("fetched_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            namespace: row.try_get("namespace")?,
            method: row.try_get("method")?,
            url: row.try_get("url")?,
            status,
            headers,
            body_digest: row.try_get("body_digest")?,
            size: row.try_get("size")?,
            fetched_at: fetched_at.as_deref().and_then(parse_datetime),
            updated_at: parse_datetime_or_now(&updated_at),
        })
    }
}

/// New cache entry (for insertion or replacement)
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub namespace: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body_digest: String,
    pub size: i64,
    pub fetched_at: DateTime<Utc>,
}
