//! File-backed application store
//!
//! One JSON document per record. Writes go to `<id>.json.tmp`, are synced,
//! then renamed over `<id>.json`, so a reader sees either the old or the new
//! document. Read-modify-write cycles run under a per-record async lock.

use super::{ApplicationStore, FieldPatch};
use crate::error::StoreError;
use crate::types::{ApplicationId, ApplicationRecord, ConsentSet, NewApplication};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};

/// Durable store rooted at a directory
#[derive(Debug)]
pub struct FileApplicationStore {
    dir: PathBuf,
    locks: DashMap<ApplicationId, Arc<Mutex<()>>>,
}

impl FileApplicationStore {
    /// Open (creating if needed) a store directory
    ///
    /// # Errors
    /// `Persistence` if the directory cannot be created
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StoreError::persistence)?;
        tracing::info!(dir = %dir.display(), "opened file application store");
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    /// Directory holding the record documents
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ApplicationId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lease(&self, id: ApplicationId) -> LockLease<'_> {
        LockLease {
            locks: &self.locks,
            id,
            lock: Arc::clone(self.locks.entry(id).or_default().value()),
        }
    }

    async fn read(&self, id: ApplicationId) -> Result<ApplicationRecord, StoreError> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
            Err(err) => return Err(StoreError::persistence(err)),
        };
        serde_json::from_slice(&bytes).map_err(StoreError::persistence)
    }

    async fn write(&self, record: &ApplicationRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record).map_err(StoreError::persistence)?;

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(StoreError::persistence)?;
        file.write_all(&bytes)
            .await
            .map_err(StoreError::persistence)?;
        file.sync_all().await.map_err(StoreError::persistence)?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(StoreError::persistence)
    }

    async fn modify<T>(
        &self,
        id: ApplicationId,
        f: impl FnOnce(&mut ApplicationRecord) -> Result<T, StoreError> + Send,
    ) -> Result<(T, ApplicationRecord), StoreError> {
        let lease = self.lease(id);
        let _guard = lease.lock().await;

        let mut record = self.read(id).await?;
        let before = record.clone();
        let outcome = f(&mut record)?;
        if record != before {
            self.write(&record).await?;
        }
        Ok((outcome, record))
    }
}

/// Holds one record's lock entry; the entry is dropped from the map once
/// no other lease shares it
struct LockLease<'a> {
    locks: &'a DashMap<ApplicationId, Arc<Mutex<()>>>,
    id: ApplicationId,
    lock: Arc<Mutex<()>>,
}

impl LockLease<'_> {
    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        // Two holders left: the map and this lease
        self.locks.remove_if(&self.id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

#[async_trait]
impl ApplicationStore for FileApplicationStore {
    async fn create(&self, new: NewApplication) -> Result<ApplicationRecord, StoreError> {
        let record = ApplicationRecord::new(new, Utc::now());
        let lease = self.lease(record.id);
        let _guard = lease.lock().await;
        self.write(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: ApplicationId) -> Result<ApplicationRecord, StoreError> {
        self.read(id).await
    }

    async fn apply_update(
        &self,
        id: ApplicationId,
        patch: FieldPatch,
    ) -> Result<ApplicationRecord, StoreError> {
        let ((), record) = self
            .modify(id, |record| patch.apply_to(record, Utc::now()))
            .await?;
        Ok(record)
    }

    async fn complete(
        &self,
        id: ApplicationId,
        consents: ConsentSet,
    ) -> Result<ApplicationRecord, StoreError> {
        let ((), record) = self
            .modify(id, |record| record.complete_with(consents, Utc::now()))
            .await?;
        Ok(record)
    }

    async fn mark_notified(&self, id: ApplicationId) -> Result<bool, StoreError> {
        let (flipped, _) = self
            .modify(id, |record| Ok(record.mark_notified(Utc::now())))
            .await?;
        Ok(flipped)
    }
}
