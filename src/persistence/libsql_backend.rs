//! libSQL progress store. One row per `(user_id, track)` holding the JSON
//! progress document.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::tutorial::Track;

use super::{ProgressDoc, ProgressPatch, ProgressStore, migrations};

/// Progress store backed by a single reused libSQL connection.
pub struct LibSqlProgressStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    // Serializes the read-modify-write in `save_progress`.
    write_lock: tokio::sync::Mutex<()>,
}

impl LibSqlProgressStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Progress database opened");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl ProgressStore for LibSqlProgressStore {
    async fn load_progress(
        &self,
        user_id: &str,
        track: Track,
    ) -> Result<Option<ProgressDoc>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT doc FROM tutorial_progress WHERE user_id = ?1 AND track = ?2",
                params![user_id, track.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_progress: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("load_progress row parse: {e}")))?;
                let doc = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(doc))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("load_progress: {e}"))),
        }
    }

    async fn save_progress(
        &self,
        user_id: &str,
        track: Track,
        patch: &ProgressPatch,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let now = Utc::now();
        let mut doc = self.load_progress(user_id, track).await?.unwrap_or_default();
        doc.apply(patch, now);
        let raw = serde_json::to_string(&doc).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO tutorial_progress (user_id, track, doc, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, track) DO UPDATE SET doc = ?3, updated_at = ?4",
                params![user_id, track.as_str(), raw, now.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save_progress: {e}")))?;

        debug!(user_id, track = %track, "Progress saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::TutorialRecord;

    fn step_patch(tutorial: &str, step: usize) -> ProgressPatch {
        ProgressPatch {
            active_tutorial: Some(Some(tutorial.to_string())),
            current_step_index: Some(step),
            ..ProgressPatch::default()
        }
    }

    #[tokio::test]
    async fn missing_doc_loads_as_none() {
        let store = LibSqlProgressStore::new_memory().await.unwrap();
        let doc = store.load_progress("u1", Track::Professional).await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = LibSqlProgressStore::new_memory().await.unwrap();
        store
            .save_progress("u1", Track::Professional, &step_patch("profileTabs", 2))
            .await
            .unwrap();

        let doc = store
            .load_progress("u1", Track::Professional)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.active_tutorial.as_deref(), Some("profileTabs"));
        assert_eq!(doc.current_step_index, 2);
        assert!(doc.updated_at.is_some());
    }

    #[tokio::test]
    async fn patches_merge_and_tracks_are_isolated() {
        let store = LibSqlProgressStore::new_memory().await.unwrap();
        let mut done = ProgressPatch::default();
        done.tutorials.insert(
            "dashboard".into(),
            TutorialRecord {
                completed: true,
                completed_at: None,
            },
        );
        store
            .save_progress("u1", Track::Professional, &done)
            .await
            .unwrap();
        store
            .save_progress("u1", Track::Professional, &step_patch("messages", 1))
            .await
            .unwrap();
        store
            .save_progress("u1", Track::Facility, &step_patch("facilityProfileTabs", 0))
            .await
            .unwrap();

        let professional = store
            .load_progress("u1", Track::Professional)
            .await
            .unwrap()
            .unwrap();
        assert!(professional.tutorials["dashboard"].completed);
        assert_eq!(professional.active_tutorial.as_deref(), Some("messages"));

        let facility = store
            .load_progress("u1", Track::Facility)
            .await
            .unwrap()
            .unwrap();
        assert!(facility.tutorials.is_empty());
        assert_eq!(facility.active_tutorial.as_deref(), Some("facilityProfileTabs"));
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("progress.db");
        {
            let store = LibSqlProgressStore::new_local(&path).await.unwrap();
            store
                .save_progress("u2", Track::Facility, &step_patch("dashboard", 3))
                .await
                .unwrap();
        }
        let store = LibSqlProgressStore::new_local(&path).await.unwrap();
        let doc = store.load_progress("u2", Track::Facility).await.unwrap().unwrap();
        assert_eq!(doc.current_step_index, 3);
    }
}
