//! Namespace operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::Namespace;
use crate::repository::Database;
use crate::utils::parse_datetime_or_now;

impl Database {
    // ==================== Namespace Operations ====================

    /// Create a namespace if it does not exist yet
    ///
    /// Returns `true` if the namespace was created by this call.
    pub async fn create_namespace(&self, name: &str) -> Result<bool, DbError> {
        let result = sqlx::query("INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all namespaces with their entry counts, ordered by name
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT n.name, n.created_at,
                   COUNT(e.id) as entry_count,
                   COALESCE(SUM(e.size), 0) as total_size
            FROM namespaces n
            LEFT JOIN cache_entries e ON e.namespace = n.name
            GROUP BY n.name, n.created_at
            ORDER BY n.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Namespace, DbError> {
                let created_at: String = row.try_get("created_at")?;
                Ok(Namespace {
                    name: row.try_get("name")?,
                    created_at: parse_datetime_or_now(&created_at),
                    entry_count: row.try_get("entry_count")?,
                    total_size: row.try_get("total_size")?,
                })
            })
            .collect()
    }

    /// Delete a namespace and every entry in it
    ///
    /// Returns `None` if the namespace did not exist, otherwise the distinct
    /// body digests its entries referenced (so the caller can reclaim bodies
    /// that are no longer referenced anywhere).
    pub async fn delete_namespace(&self, name: &str) -> Result<Option<Vec<String>>, DbError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT DISTINCT body_digest FROM cache_entries WHERE namespace = ?")
            .bind(name)
            .fetch_all(&mut *tx)
            .await?;
        let digests: Vec<String> = rows.iter().map(|row| row.get("body_digest")).collect();

        sqlx::query("DELETE FROM cache_entries WHERE namespace = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM namespaces WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if removed.rows_affected() == 0 && digests.is_empty() {
            return Ok(None);
        }
        Ok(Some(digests))
    }
}
