//! Completion Finalizer
//!
//! Two separable transitions per record:
//!
//! ```text
//! partial --finalize--> complete/not-notified --notify--> complete/notified
//! ```
//!
//! Finalize is authorized by the session token. Notify is authorized by the
//! session marker and is linearized by [`ApplicationStore::mark_notified`]:
//! the flag is set before anything is dispatched, so a crash or a failed
//! send can lose a notification but never duplicate one.

use crate::config::MailSettings;
use crate::error::{IntakeError, StoreError};
use crate::gate::SessionGate;
use crate::notify::{compose, DocumentRenderer, Notifier};
use crate::store::ApplicationStore;
use crate::telemetry;
use crate::types::{ApplicationId, ApplicationRecord, ConsentSet};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on one render-and-send attempt
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a finalize call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// This call performed the transition
    Completed(ApplicationRecord),
    /// The record was already complete; nothing was written
    AlreadyComplete(ApplicationRecord),
}

impl FinalizeOutcome {
    /// The record as it now stands
    #[must_use]
    pub const fn record(&self) -> &ApplicationRecord {
        match self {
            Self::Completed(record) | Self::AlreadyComplete(record) => record,
        }
    }

    /// Take the record
    #[must_use]
    pub fn into_record(self) -> ApplicationRecord {
        match self {
            Self::Completed(record) | Self::AlreadyComplete(record) => record,
        }
    }
}

/// Inbound notify call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRequest {
    /// Target application
    pub application_id: ApplicationId,
    /// Marker presented by the caller
    pub session_marker: String,
    /// Client analytics correlation id; logged only
    pub event_correlation_id: Option<String>,
}

/// Outcome of the check-then-set step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyClaim {
    /// This caller owns the single dispatch
    Claimed(ApplicationRecord),
    /// Someone already claimed it
    AlreadyNotified,
}

/// What happened to a claimed dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// Notifier accepted the message
    Delivered {
        /// Provider message id, when reported
        message_id: Option<String>,
    },
    /// Renderer failed; nothing was sent
    RenderFailed(String),
    /// Notifier failed or timed out
    DeliveryFailed(String),
}

impl DispatchReport {
    /// Check if the message went out
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Result of a notify call run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// This call claimed the flag and attempted dispatch
    Dispatched(DispatchReport),
    /// Flag was already set; no side effect
    AlreadyNotified,
}

/// Orchestrates finalization and the single confirmation dispatch
#[derive(Clone)]
pub struct CompletionFinalizer {
    gate: Arc<SessionGate>,
    store: Arc<dyn ApplicationStore>,
    renderer: Arc<dyn DocumentRenderer>,
    notifier: Option<Arc<dyn Notifier>>,
    mail: MailSettings,
}

impl CompletionFinalizer {
    /// Create a finalizer; `notifier` may be absent, which disables notify
    #[must_use]
    pub fn new(
        gate: Arc<SessionGate>,
        store: Arc<dyn ApplicationStore>,
        renderer: Arc<dyn DocumentRenderer>,
        notifier: Option<Arc<dyn Notifier>>,
        mail: MailSettings,
    ) -> Self {
        Self {
            gate,
            store,
            renderer,
            notifier,
            mail,
        }
    }

    /// Record consent and mark the application complete
    ///
    /// # Errors
    /// - `Unauthorized` if the token fails verification
    /// - `ConsentRequired` if a mandatory consent is not `true`
    /// - `NotFound` / `Persistence` from the store
    pub async fn finalize(
        &self,
        token: &str,
        consents: ConsentSet,
    ) -> Result<FinalizeOutcome, IntakeError> {
        let session = self.gate.authorize(token)?;
        consents.ensure_required()?;

        match self.store.complete(session.application_id, consents).await {
            Ok(record) => {
                metrics::counter!(telemetry::APPLICATIONS_COMPLETED).increment(1);
                tracing::info!(application_id = %record.id, "application finalized");
                Ok(FinalizeOutcome::Completed(record))
            }
            Err(StoreError::AlreadyComplete) => {
                tracing::info!(
                    application_id = %session.application_id,
                    "finalize repeated on complete application"
                );
                let record = self.store.get(session.application_id).await?;
                Ok(FinalizeOutcome::AlreadyComplete(record))
            }
            Err(err) => {
                tracing::error!(
                    application_id = %session.application_id,
                    error = %err,
                    "finalize failed"
                );
                Err(err.into())
            }
        }
    }

    /// Authorize a notify call and atomically claim the dispatch
    ///
    /// # Errors
    /// - `ServerConfiguration` if no notifier or recipients are configured;
    ///   checked before the flag is touched
    /// - `Unauthorized` if no marker was presented
    /// - `Forbidden` for an unknown id, marker mismatch, or partial record
    /// - `Persistence` if the flag cannot be written; nothing is dispatched
    pub async fn claim_notification(
        &self,
        request: &NotifyRequest,
    ) -> Result<NotifyClaim, IntakeError> {
        if self.notifier.is_none() || self.mail.recipients.is_empty() {
            tracing::error!("notify called without a configured notifier");
            return Err(IntakeError::ServerConfiguration(
                "notifier not configured".to_string(),
            ));
        }

        let id = request.application_id;
        if request.session_marker.trim().is_empty() {
            return Err(reject(id, "missing session marker", IntakeError::Unauthorized));
        }

        let record = match self.store.get(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(reject(id, "unknown application", IntakeError::Forbidden));
            }
            Err(err) => return Err(err.into()),
        };
        if !record.session_marker.matches(&request.session_marker) {
            return Err(reject(id, "session marker mismatch", IntakeError::Forbidden));
        }
        if !record.is_complete() {
            return Err(reject(id, "application not complete", IntakeError::Forbidden));
        }

        if let Some(event_id) = &request.event_correlation_id {
            tracing::debug!(application_id = %id, event_id = %event_id, "notify correlation");
        }

        if record.abandonment_email_sent {
            tracing::info!(application_id = %id, "confirmation already sent");
            return Ok(NotifyClaim::AlreadyNotified);
        }

        match self.store.mark_notified(id).await {
            Ok(true) => {
                let mut record = record;
                record.abandonment_email_sent = true;
                Ok(NotifyClaim::Claimed(record))
            }
            Ok(false) => {
                tracing::info!(application_id = %id, "confirmation claimed concurrently");
                Ok(NotifyClaim::AlreadyNotified)
            }
            Err(err) => {
                tracing::error!(
                    application_id = %id,
                    error = %err,
                    "failed to set notification flag; not dispatching"
                );
                Err(err.into())
            }
        }
    }

    /// Render and send the confirmation for a claimed record
    ///
    /// Failures are logged and counted, never retried; the flag stays set.
    pub async fn dispatch(&self, record: &ApplicationRecord) -> DispatchReport {
        let report = match tokio::time::timeout(DISPATCH_TIMEOUT, self.render_and_send(record)).await
        {
            Ok(report) => report,
            Err(_) => DispatchReport::DeliveryFailed("dispatch timed out".to_string()),
        };

        match &report {
            DispatchReport::Delivered { message_id } => {
                metrics::counter!(telemetry::NOTIFICATIONS_DISPATCHED).increment(1);
                tracing::info!(
                    application_id = %record.id,
                    message_id = message_id.as_deref().unwrap_or("-"),
                    "confirmation sent"
                );
            }
            DispatchReport::RenderFailed(reason) | DispatchReport::DeliveryFailed(reason) => {
                metrics::counter!(telemetry::NOTIFICATIONS_FAILED).increment(1);
                tracing::error!(
                    application_id = %record.id,
                    reason = %reason,
                    "confirmation not sent; flag remains set"
                );
            }
        }
        report
    }

    /// Claim and dispatch in one call
    ///
    /// # Errors
    /// See [`CompletionFinalizer::claim_notification`]
    pub async fn notify(&self, request: &NotifyRequest) -> Result<NotifyOutcome, IntakeError> {
        match self.claim_notification(request).await? {
            NotifyClaim::Claimed(record) => {
                Ok(NotifyOutcome::Dispatched(self.dispatch(&record).await))
            }
            NotifyClaim::AlreadyNotified => Ok(NotifyOutcome::AlreadyNotified),
        }
    }

    async fn render_and_send(&self, record: &ApplicationRecord) -> DispatchReport {
        let Some(notifier) = &self.notifier else {
            return DispatchReport::DeliveryFailed("notifier not configured".to_string());
        };
        let attachment = match self.renderer.render(record).await {
            Ok(attachment) => attachment,
            Err(err) => return DispatchReport::RenderFailed(err.to_string()),
        };
        let message = compose::confirmation_email(record, attachment, &self.mail);
        match notifier.send(message).await {
            Ok(receipt) => DispatchReport::Delivered {
                message_id: receipt.message_id,
            },
            Err(err) => DispatchReport::DeliveryFailed(err.to_string()),
        }
    }
}

fn reject(id: ApplicationId, reason: &'static str, err: IntakeError) -> IntakeError {
    tracing::warn!(application_id = %id, reason, "notify rejected");
    metrics::counter!(telemetry::AUTH_REJECTIONS, "reason" => reason).increment(1);
    err
}
