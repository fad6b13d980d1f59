//! Field Update Arbiter
//!
//! The per-step "save progress" operation. The target record always comes
//! from the verified token; the payload cannot name another identifier.

use crate::error::IntakeError;
use crate::gate::SessionGate;
use crate::store::{ApplicationStore, FieldPatch};
use crate::telemetry;
use crate::types::{ApplicationRecord, FINAL_STEP};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Highest step the update path may commit; the last step is finalization
pub const LAST_UPDATE_STEP: i64 = FINAL_STEP as i64 - 1;

/// Authorizes and applies per-step updates
#[derive(Clone)]
pub struct FieldUpdateArbiter {
    gate: Arc<SessionGate>,
    store: Arc<dyn ApplicationStore>,
}

impl FieldUpdateArbiter {
    /// Create an arbiter over a gate and a store
    #[must_use]
    pub fn new(gate: Arc<SessionGate>, store: Arc<dyn ApplicationStore>) -> Self {
        Self { gate, store }
    }

    /// Save one wizard step
    ///
    /// # Errors
    /// - `Unauthorized` if the token fails verification (checked first)
    /// - `InvalidStepNumber` unless `1 <= step_number <= 4`
    /// - `NoValidFields` / `InvalidFieldValue` from the whitelist
    /// - `AlreadyComplete` if the record is finalized
    /// - `NotFound` / `Persistence` from the store
    pub async fn update(
        &self,
        token: &str,
        step_number: i64,
        proposed: &Map<String, Value>,
    ) -> Result<ApplicationRecord, IntakeError> {
        let session = self.gate.authorize(token)?;
        let step = u8::try_from(step_number)
            .ok()
            .filter(|step| (1..=LAST_UPDATE_STEP).contains(&i64::from(*step)))
            .ok_or(IntakeError::InvalidStepNumber(step_number))?;

        let patch = FieldPatch::from_proposed(proposed)?.with_current_step(step);
        let fields = patch.len();
        let record = self
            .store
            .apply_update(session.application_id, patch)
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    application_id = %session.application_id,
                    step,
                    error = %err,
                    "step update rejected by store"
                );
            })?;

        metrics::counter!(telemetry::UPDATES_APPLIED).increment(1);
        tracing::info!(
            application_id = %record.id,
            step,
            fields,
            "application step saved"
        );
        Ok(record)
    }
}
