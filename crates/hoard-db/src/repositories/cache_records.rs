//! SQLite implementation of CacheIndex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoard_core::cache::IndexedRecord;
use hoard_core::ports::CacheIndex;
use hoard_core::{Error, Result, TaskHash};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const COLUMNS: &str = "hash, code, size, source_machine_id, created_at, accessed_at";

pub struct SqliteCacheIndex {
    pool: SqlitePool,
}

impl SqliteCacheIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_millis(at: DateTime<Utc>) -> i64 {
        at.timestamp_millis()
    }

    fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::Database(format!("Timestamp {} out of range", millis)))
    }

    fn row_to_record(r: &SqliteRow) -> Result<IndexedRecord> {
        let hash: String = r.get("hash");
        Ok(IndexedRecord {
            hash: TaskHash::new(hash)?,
            code: r.get::<i64, _>("code") as i32,
            size_bytes: r.get::<i64, _>("size").max(0) as u64,
            source_machine_id: r.get("source_machine_id"),
            created_at: Self::from_millis(r.get("created_at"))?,
            accessed_at: Self::from_millis(r.get("accessed_at"))?,
        })
    }
}

#[async_trait]
impl CacheIndex for SqliteCacheIndex {
    async fn touch(&self, hash: &TaskHash) -> Result<Option<IndexedRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE cache_outputs SET accessed_at = ? WHERE hash = ? RETURNING {}",
            COLUMNS
        ))
        .bind(Self::to_millis(Utc::now()))
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn upsert(&self, record: &IndexedRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO cache_outputs ({}) VALUES (?, ?, ?, ?, ?, ?)",
            COLUMNS
        ))
        .bind(record.hash.as_str())
        .bind(record.code as i64)
        .bind(i64::try_from(record.size_bytes).unwrap_or(i64::MAX))
        .bind(&record.source_machine_id)
        .bind(Self::to_millis(record.created_at))
        .bind(Self::to_millis(record.accessed_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, hash: &TaskHash) -> Result<()> {
        sqlx::query("DELETE FROM cache_outputs WHERE hash = ?")
            .bind(hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn total_size(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COALESCE(SUM(size), 0) AS total FROM cache_outputs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.get::<i64, _>("total").max(0) as u64)
    }

    async fn list_least_recently_used(&self) -> Result<Vec<IndexedRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM cache_outputs ORDER BY accessed_at ASC, hash ASC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn remove_not_accessed_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskHash>> {
        let rows = sqlx::query("DELETE FROM cache_outputs WHERE accessed_at < ? RETURNING hash")
            .bind(Self::to_millis(cutoff))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.iter()
            .map(|r| TaskHash::new(r.get::<String, _>("hash")))
            .collect()
    }

    async fn contains(&self, hash: &TaskHash) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM cache_outputs WHERE hash = ?")
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn index() -> SqliteCacheIndex {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        SqliteCacheIndex::new(db.pool().clone())
    }

    fn record(hash: &str, size: u64, accessed_at: DateTime<Utc>) -> IndexedRecord {
        IndexedRecord {
            hash: TaskHash::new(hash).unwrap(),
            code: 0,
            size_bytes: size,
            source_machine_id: Some("machine-a".to_string()),
            created_at: accessed_at,
            accessed_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_sums() {
        let index = index().await;
        let now = Utc::now();
        index.upsert(&record("a", 100, now)).await.unwrap();
        index.upsert(&record("b", 50, now)).await.unwrap();
        index.upsert(&record("a", 10, now)).await.unwrap();

        assert_eq!(index.total_size().await.unwrap(), 60);
        assert!(index.contains(&TaskHash::new("a").unwrap()).await.unwrap());

        index.remove(&TaskHash::new("a").unwrap()).await.unwrap();
        index.remove(&TaskHash::new("a").unwrap()).await.unwrap();
        assert_eq!(index.total_size().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_touch_moves_record_to_most_recent() {
        let index = index().await;
        let old = Utc::now() - Duration::hours(2);
        index.upsert(&record("first", 1, old)).await.unwrap();
        index
            .upsert(&record("second", 1, old + Duration::minutes(1)))
            .await
            .unwrap();

        let touched = index.touch(&TaskHash::new("first").unwrap()).await.unwrap().unwrap();
        assert!(touched.accessed_at > old);
        assert_eq!(touched.created_at.timestamp_millis(), old.timestamp_millis());

        let order: Vec<String> = index
            .list_least_recently_used()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.hash.to_string())
            .collect();
        assert_eq!(order, vec!["second".to_string(), "first".to_string()]);

        assert!(index.touch(&TaskHash::new("absent").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_not_accessed_since() {
        let index = index().await;
        let now = Utc::now();
        index.upsert(&record("stale", 5, now - Duration::days(8))).await.unwrap();
        index.upsert(&record("fresh", 7, now)).await.unwrap();

        let removed = index
            .remove_not_accessed_since(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, vec![TaskHash::new("stale").unwrap()]);
        assert_eq!(index.total_size().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.db");
        {
            let db = Database::connect(&path).await.unwrap();
            db.migrate().await.unwrap();
            SqliteCacheIndex::new(db.pool().clone())
                .upsert(&record("kept", 3, Utc::now()))
                .await
                .unwrap();
            db.close().await;
        }

        let db = Database::connect(&path).await.unwrap();
        db.migrate().await.unwrap();
        let index = SqliteCacheIndex::new(db.pool().clone());
        assert!(index.contains(&TaskHash::new("kept").unwrap()).await.unwrap());
    }
}
