//! Application Store
//!
//! The system of record. Implementations must serialize writes to one
//! application identifier and must not make writes to different identifiers
//! contend with each other.

mod file;
mod memory;
mod patch;

pub use file::FileApplicationStore;
pub use memory::InMemoryApplicationStore;
pub use patch::{FieldPatch, FieldUpdate, UpdatableField, MAX_TEXT_LEN};

use crate::error::StoreError;
use crate::types::{ApplicationId, ApplicationRecord, ConsentSet, NewApplication};
use async_trait::async_trait;

/// Persistence for application records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Insert a new partial record at step 1 and return it
    async fn create(&self, new: NewApplication) -> Result<ApplicationRecord, StoreError>;

    /// Fetch a record
    async fn get(&self, id: ApplicationId) -> Result<ApplicationRecord, StoreError>;

    /// Apply a whitelisted patch atomically and return the updated record
    async fn apply_update(
        &self,
        id: ApplicationId,
        patch: FieldPatch,
    ) -> Result<ApplicationRecord, StoreError>;

    /// Transition partial -> complete, writing consent and the consent timestamp
    ///
    /// Fails with `AlreadyComplete` and writes nothing if already terminal.
    async fn complete(
        &self,
        id: ApplicationId,
        consents: ConsentSet,
    ) -> Result<ApplicationRecord, StoreError>;

    /// Conditionally set the notification flag
    ///
    /// Returns `true` only for the single call that flipped it false -> true.
    /// Concurrent calls for one identifier are linearized.
    async fn mark_notified(&self, id: ApplicationId) -> Result<bool, StoreError>;
}
