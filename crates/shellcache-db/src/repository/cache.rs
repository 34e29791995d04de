//! Cache entry operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{CacheEntry, NewCacheEntry};
use crate::repository::Database;

const ENTRY_COLUMNS: &str =
    "id, namespace, method, url, status, headers, body_digest, size, fetched_at, updated_at";

impl Database {
    // ==================== Cache Entry Operations ====================

    /// Insert or replace the entry for `(namespace, method, url)`
    ///
    /// The namespace row is created on demand. Both statements run in one
    /// transaction, and the entry itself is a single upsert, so readers see
    /// either the previous entry or the new one.
    pub async fn upsert_cache_entry(&self, entry: NewCacheEntry) -> Result<CacheEntry, DbError> {
        let now = Utc::now();
        let headers = serde_json::to_string(&entry.headers)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?, ?)")
            .bind(&entry.namespace)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO cache_entries (namespace, method, url, status, headers, body_digest, size, fetched_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (namespace, method, url) DO UPDATE SET
                status = excluded.status,
                headers = excluded.headers,
                body_digest = excluded.body_digest,
                size = excluded.size,
                fetched_at = excluded.fetched_at,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&entry.namespace)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(i64::from(entry.status))
        .bind(&headers)
        .bind(&entry.body_digest)
        .bind(entry.size)
        .bind(entry.fetched_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CacheEntry {
            id: row.get("id"),
            namespace: entry.namespace,
            method: entry.method,
            url: entry.url,
            status: entry.status,
            headers: entry.headers,
            body_digest: entry.body_digest,
            size: entry.size,
            fetched_at: Some(entry.fetched_at),
            updated_at: now,
        })
    }

    /// Get the entry for a request identity within a namespace
    pub async fn get_cache_entry(
        &self,
        namespace: &str,
        method: &str,
        url: &str,
    ) -> Result<Option<CacheEntry>, DbError> {
        let sql = format!(
            "SELECT {} FROM cache_entries WHERE namespace = ? AND method = ? AND url = ?",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(namespace)
            .bind(method)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(CacheEntry::from_row).transpose()
    }

    /// Delete an entry, but only while it still references `body_digest`
    ///
    /// An entry replaced concurrently with a new body is left alone.
    pub async fn delete_cache_entry(
        &self,
        namespace: &str,
        method: &str,
        url: &str,
        body_digest: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE namespace = ? AND method = ? AND url = ? AND body_digest = ?",
        )
        .bind(namespace)
        .bind(method)
        .bind(url)
        .bind(body_digest)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Check whether any entry in any namespace still points at a body
    pub async fn is_digest_referenced(&self, digest: &str) -> Result<bool, DbError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM cache_entries WHERE body_digest = ?) as referenced",
        )
        .bind(digest)
        .fetch_one(&self.pool)
        .await?;
        let referenced: i64 = row.get("referenced");
        Ok(referenced != 0)
    }
}
