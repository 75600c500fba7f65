use super::ProgressRecord;
use crate::descriptor::VideoType;
use crate::error::ProgressError;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Keyed persistence for progress records (allows swapping the backing store in tests)
#[async_trait::async_trait]
pub trait ProgressStorage: Send + Sync {
    async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>, ProgressError>;
    async fn put(&self, video_id: &str, record: &ProgressRecord) -> Result<(), ProgressError>;
    async fn remove(&self, video_id: &str) -> Result<(), ProgressError>;
    async fn list(&self) -> Result<Vec<(String, ProgressRecord)>, ProgressError>;
}

/// In-process storage
#[derive(Default)]
pub struct MemoryProgressStorage {
    records: RwLock<HashMap<String, ProgressRecord>>,
}

impl MemoryProgressStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProgressStorage for MemoryProgressStorage {
    async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        Ok(self.records.read().await.get(video_id).cloned())
    }

    async fn put(&self, video_id: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        self.records
            .write()
            .await
            .insert(video_id.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, video_id: &str) -> Result<(), ProgressError> {
        self.records.write().await.remove(video_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, ProgressRecord)>, ProgressError> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}

/// One JSON document mapping video id -> record.
/// Writes go to a temp file that is renamed over the original.
pub struct JsonFileProgressStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileProgressStorage {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        info!("Using progress file {}", path.display());
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, ProgressRecord>, ProgressError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like `read_all`, but a file that no longer parses is moved aside so the write
    /// that follows starts a fresh document instead of failing forever
    async fn read_for_write(&self) -> Result<BTreeMap<String, ProgressRecord>, ProgressError> {
        match self.read_all().await {
            Err(ProgressError::Json(e)) => {
                let corrupt_path = self.path.with_extension("json.corrupt");
                warn!(
                    "Progress file {} is corrupt ({}), moving it to {}",
                    self.path.display(),
                    e,
                    corrupt_path.display()
                );
                fs::rename(&self.path, &corrupt_path).await?;
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    async fn write_all(&self, records: &BTreeMap<String, ProgressRecord>) -> Result<(), ProgressError> {
        let data = serde_json::to_vec_pretty(records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressStorage for JsonFileProgressStorage {
    async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(video_id))
    }

    async fn put(&self, video_id: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_for_write().await?;
        records.insert(video_id.to_string(), record.clone());
        self.write_all(&records).await
    }

    async fn remove(&self, video_id: &str) -> Result<(), ProgressError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_for_write().await?;
        if records.remove(video_id).is_some() {
            self.write_all(&records).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, ProgressRecord)>, ProgressError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_iter().collect())
    }
}

/// SQLite-backed storage, one row per video
#[derive(Debug, Clone)]
pub struct SqliteProgressStorage {
    pool: SqlitePool,
}

impl SqliteProgressStorage {
    /// Open (creating if needed) the database and its table
    pub async fn new(database_path: &str) -> Result<Self, ProgressError> {
        // Use sqlite:// with ?mode=rwc to create if it doesn't exist
        let database_url = format!("sqlite://{}?mode=rwc", database_path);
        info!("Connecting to {}", database_url);
        let pool = SqlitePool::connect(&database_url).await?;

        let storage = SqliteProgressStorage { pool };
        storage.create_tables().await?;
        Ok(storage)
    }

    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        // CURRENT_TIME is an SQLite keyword, hence position_seconds
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_progress (
                video_id TEXT PRIMARY KEY,
                position_seconds REAL NOT NULL,
                duration_seconds REAL NOT NULL,
                percentage REAL NOT NULL,
                video_type TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, sqlx::Error> {
        let video_type: String = row.try_get("video_type")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(ProgressRecord {
            current_time: row.try_get("position_seconds")?,
            duration: row.try_get("duration_seconds")?,
            percentage: row.try_get("percentage")?,
            video_type: VideoType::parse(&video_type).unwrap_or_else(|| {
                warn!("Unknown video type '{}' in progress table", video_type);
                VideoType::Lesson
            }),
            updated_at,
        })
    }
}

#[async_trait::async_trait]
impl ProgressStorage for SqliteProgressStorage {
    async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        let row = sqlx::query(
            "SELECT position_seconds, duration_seconds, percentage, video_type, updated_at \
             FROM video_progress WHERE video_id = ?",
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, video_id: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        sqlx::query(
            r#"
            INSERT INTO video_progress
                (video_id, position_seconds, duration_seconds, percentage, video_type, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                position_seconds = excluded.position_seconds,
                duration_seconds = excluded.duration_seconds,
                percentage = excluded.percentage,
                video_type = excluded.video_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(video_id)
        .bind(record.current_time)
        .bind(record.duration)
        .bind(record.percentage)
        .bind(record.video_type.as_str())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, video_id: &str) -> Result<(), ProgressError> {
        sqlx::query("DELETE FROM video_progress WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, ProgressRecord)>, ProgressError> {
        let rows = sqlx::query(
            "SELECT video_id, position_seconds, duration_seconds, percentage, video_type, updated_at \
             FROM video_progress ORDER BY video_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let video_id: String = row.try_get("video_id")?;
            records.push((video_id, Self::record_from_row(&row)?));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exercise(storage: &dyn ProgressStorage) {
        assert!(storage.load("v1").await.unwrap().is_none());

        let record = ProgressRecord::new(42.0, 100.0, VideoType::Lesson);
        storage.put("v1", &record).await.unwrap();
        storage
            .put("v2", &ProgressRecord::new(1.0, 10.0, VideoType::Intro))
            .await
            .unwrap();

        let loaded = storage.load("v1").await.unwrap().unwrap();
        assert_eq!(loaded.current_time, 42.0);
        assert_eq!(loaded.percentage, 42.0);
        assert_eq!(loaded.video_type, VideoType::Lesson);

        // Overwrite keeps one entry per id
        storage
            .put("v1", &ProgressRecord::new(50.0, 100.0, VideoType::Lesson))
            .await
            .unwrap();
        let listed = storage.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "v1");
        assert_eq!(listed[0].1.current_time, 50.0);

        storage.remove("v1").await.unwrap();
        assert!(storage.load("v1").await.unwrap().is_none());
        // Removing twice is fine
        storage.remove("v1").await.unwrap();
        assert!(storage.load("v2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_storage() {
        exercise(&MemoryProgressStorage::new()).await;
    }

    #[tokio::test]
    async fn test_json_file_storage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("progress.json");
        let storage = JsonFileProgressStorage::new(&path).await.unwrap();
        exercise(&storage).await;

        // A second instance sees what the first one wrote
        let reopened = JsonFileProgressStorage::new(&path).await.unwrap();
        assert!(reopened.load("v2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_json_file_storage_recovers_from_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("progress.json");
        fs::write(&path, b"{ not json").await.unwrap();
        let storage = JsonFileProgressStorage::new(&path).await.unwrap();

        assert!(matches!(
            storage.load("v1").await,
            Err(ProgressError::Json(_))
        ));

        storage
            .put("v1", &ProgressRecord::new(30.0, 120.0, VideoType::Lesson))
            .await
            .unwrap();
        let loaded = storage.load("v1").await.unwrap().unwrap();
        assert_eq!(loaded.current_time, 30.0);
        assert_eq!(loaded.percentage, 25.0);

        // The unreadable document is kept next to the new one
        let moved = fs::read(path.with_extension("json.corrupt")).await.unwrap();
        assert_eq!(moved, b"{ not json");

        // Clearing also works on a file that went bad again
        fs::write(&path, b"[1, 2").await.unwrap();
        storage.remove("v1").await.unwrap();
        assert!(storage.load("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("progress.db");
        let storage = SqliteProgressStorage::new(db_path.to_str().unwrap())
            .await
            .unwrap();
        exercise(&storage).await;
    }
}
