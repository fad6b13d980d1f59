//! In-memory application store

use super::{ApplicationStore, FieldPatch};
use crate::error::StoreError;
use crate::types::{ApplicationId, ApplicationRecord, ConsentSet, NewApplication};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Process-local store
///
/// Each record sits behind its own mutex, so writes to one identifier are
/// serialized while different identifiers proceed independently. The map
/// itself is only touched to look up or insert the record handle.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    records: DashMap<ApplicationId, Arc<Mutex<ApplicationRecord>>>,
}

impl InMemoryApplicationStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn handle(&self, id: ApplicationId) -> Result<Arc<Mutex<ApplicationRecord>>, StoreError> {
        self.records
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::NotFound(id))
    }

    fn with_record<T>(
        &self,
        id: ApplicationId,
        f: impl FnOnce(&mut ApplicationRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let handle = self.handle(id)?;
        let mut record = handle.lock();
        f(&mut record)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn create(&self, new: NewApplication) -> Result<ApplicationRecord, StoreError> {
        let record = ApplicationRecord::new(new, Utc::now());
        self.records
            .insert(record.id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn get(&self, id: ApplicationId) -> Result<ApplicationRecord, StoreError> {
        self.with_record(id, |record| Ok(record.clone()))
    }

    async fn apply_update(
        &self,
        id: ApplicationId,
        patch: FieldPatch,
    ) -> Result<ApplicationRecord, StoreError> {
        self.with_record(id, |record| {
            patch.apply_to(record, Utc::now())?;
            Ok(record.clone())
        })
    }

    async fn complete(
        &self,
        id: ApplicationId,
        consents: ConsentSet,
    ) -> Result<ApplicationRecord, StoreError> {
        self.with_record(id, |record| {
            record.complete_with(consents, Utc::now())?;
            Ok(record.clone())
        })
    }

    async fn mark_notified(&self, id: ApplicationId) -> Result<bool, StoreError> {
        self.with_record(id, |record| Ok(record.mark_notified(Utc::now())))
    }
}
