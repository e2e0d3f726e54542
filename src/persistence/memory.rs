//! In-memory progress store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::tutorial::Track;

use super::{ProgressDoc, ProgressPatch, ProgressStore};

/// Progress store held in a map. Failure switches let tests exercise the
/// engine's error paths.
#[derive(Default)]
pub struct MemoryProgressStore {
    docs: RwLock<HashMap<(String, Track), ProgressDoc>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored document.
    pub async fn insert(&self, user_id: &str, track: Track, doc: ProgressDoc) {
        self.docs
            .write()
            .await
            .insert((user_id.to_string(), track), doc);
    }

    pub async fn doc(&self, user_id: &str, track: Track) -> Option<ProgressDoc> {
        self.docs
            .read()
            .await
            .get(&(user_id.to_string(), track))
            .cloned()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of save attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load_progress(
        &self,
        user_id: &str,
        track: Track,
    ) -> Result<Option<ProgressDoc>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("load disabled".into()));
        }
        Ok(self.doc(user_id, track).await)
    }

    async fn save_progress(
        &self,
        user_id: &str,
        track: Track,
        patch: &ProgressPatch,
    ) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save disabled".into()));
        }
        let mut docs = self.docs.write().await;
        docs.entry((user_id.to_string(), track))
            .or_default()
            .apply(patch, Utc::now());
        Ok(())
    }
}
