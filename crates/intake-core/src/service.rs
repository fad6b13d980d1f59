//! Intake service facade
//!
//! Wires the codec, gate, store, arbiter, and finalizer together and exposes
//! the four boundary operations: create, update, finalize, notify.

use crate::arbiter::FieldUpdateArbiter;
use crate::config::{IntakeConfig, StoreBackend};
use crate::credential::CredentialCodec;
use crate::error::IntakeError;
use crate::finalizer::{
    CompletionFinalizer, DispatchReport, FinalizeOutcome, NotifyClaim, NotifyOutcome,
    NotifyRequest,
};
use crate::gate::SessionGate;
use crate::notify::{DocumentRenderer, Notifier, SendGridNotifier, SummaryRenderer};
use crate::store::{ApplicationStore, FileApplicationStore, InMemoryApplicationStore, MAX_TEXT_LEN};
use crate::telemetry;
use crate::types::{
    ApplicationId, ApplicationRecord, ConsentSet, LicenceStatus, NewApplication, Source,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const USER_AGENT_LIMIT: usize = 512;

/// Raw step-1 input, as received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateApplication {
    /// `valid` | `in_progress`
    pub licence_status: Option<String>,
    /// `online` | `agent` | `referral` | `other`
    pub source: Option<String>,
    /// Broker agent attribution
    pub agent_id: Option<String>,
    /// Client user-agent
    pub user_agent: Option<String>,
}

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedApplication {
    /// Session token bound to the new record
    pub token: String,
    /// New record identifier
    pub application_id: ApplicationId,
    /// Marker to present to notify
    pub session_marker: String,
    /// Token expiry, seconds since the Unix epoch
    pub expires_at: i64,
}

/// Result of a notify call whose dispatch runs detached
#[derive(Debug)]
pub enum BackgroundNotify {
    /// Flag claimed; dispatch running
    Spawned(JoinHandle<DispatchReport>),
    /// Flag was already set; nothing spawned
    AlreadyNotified,
}

/// The intake pipeline
#[derive(Clone)]
pub struct IntakeService {
    gate: Arc<SessionGate>,
    store: Arc<dyn ApplicationStore>,
    arbiter: FieldUpdateArbiter,
    finalizer: CompletionFinalizer,
}

impl IntakeService {
    /// Assemble a service from explicit collaborators
    ///
    /// # Errors
    /// `ServerConfiguration` if the signing secret is absent or too short
    pub fn new(
        config: &IntakeConfig,
        store: Arc<dyn ApplicationStore>,
        renderer: Arc<dyn DocumentRenderer>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Result<Self, IntakeError> {
        let secret = config.signing_secret.clone().ok_or_else(|| {
            IntakeError::ServerConfiguration(format!(
                "{} is not set",
                crate::config::SIGNING_SECRET_ENV
            ))
        })?;
        let codec = CredentialCodec::new(secret)?
            .with_ttl(config.token_ttl_secs)
            .with_leeway(config.clock_skew_leeway_secs);
        if config.clock_skew_leeway_secs > 0 {
            tracing::info!(
                leeway_secs = config.clock_skew_leeway_secs,
                "accepting tokens past expiry within leeway"
            );
        }

        let gate = Arc::new(SessionGate::new(codec));
        let arbiter = FieldUpdateArbiter::new(Arc::clone(&gate), Arc::clone(&store));
        let finalizer = CompletionFinalizer::new(
            Arc::clone(&gate),
            Arc::clone(&store),
            renderer,
            notifier,
            config.mail.clone(),
        );
        Ok(Self {
            gate,
            store,
            arbiter,
            finalizer,
        })
    }

    /// Assemble a service from configuration alone
    ///
    /// # Errors
    /// - `ServerConfiguration` for a missing signing secret or unusable notifier
    /// - `Persistence` if the file store cannot be opened
    pub async fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let store: Arc<dyn ApplicationStore> = match &config.store {
            StoreBackend::Memory => Arc::new(InMemoryApplicationStore::new()),
            StoreBackend::File { dir } => Arc::new(FileApplicationStore::open(dir).await?),
        };

        let notifier: Option<Arc<dyn Notifier>> = match &config.sendgrid_api_key {
            Some(key) => {
                let notifier =
                    SendGridNotifier::with_endpoint(key.clone(), &config.mail.sendgrid_endpoint)
                        .map_err(|e| IntakeError::ServerConfiguration(e.to_string()))?;
                Some(Arc::new(notifier))
            }
            None => {
                tracing::warn!(
                    "{} is not set; notify will fail until it is configured",
                    crate::config::SENDGRID_API_KEY_ENV
                );
                None
            }
        };

        Self::new(config, store, Arc::new(SummaryRenderer::new()), notifier)
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// Session gate
    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Create a record from step-1 input and issue its session token
    ///
    /// # Errors
    /// - `MissingField` / `InvalidEnumValue` / `InvalidFieldValue` for bad input
    /// - `Persistence` from the store
    pub async fn create(&self, input: CreateApplication) -> Result<CreatedApplication, IntakeError> {
        let licence_status: LicenceStatus =
            required(input.licence_status.as_deref(), "licenceStatus")?.parse()?;
        let source: Source = required(input.source.as_deref(), "source")?.parse()?;
        let agent_id = optional_text(input.agent_id, "agentId")?;
        let user_agent = input.user_agent.map(|ua| ua.chars().take(USER_AGENT_LIMIT).collect());

        let record = self
            .store
            .create(NewApplication {
                licence_status,
                source,
                agent_id,
                user_agent,
            })
            .await
            .inspect_err(|err| tracing::error!(error = %err, "failed to create application"))?;

        let codec = self.gate.codec();
        let claims = codec.claims_for(
            record.id,
            record.session_marker.clone(),
            record.agent_id.clone(),
            Utc::now(),
        );
        let token = codec.issue(&claims);

        metrics::counter!(telemetry::APPLICATIONS_CREATED, "source" => source.as_str())
            .increment(1);
        tracing::info!(
            application_id = %record.id,
            source = %source,
            licence = %licence_status,
            has_agent = record.agent_id.is_some(),
            "application created"
        );

        Ok(CreatedApplication {
            token,
            application_id: record.id,
            session_marker: record.session_marker.as_str().to_string(),
            expires_at: claims.exp,
        })
    }

    /// Save one wizard step
    ///
    /// # Errors
    /// See [`FieldUpdateArbiter::update`]
    pub async fn update(
        &self,
        token: &str,
        step_number: i64,
        proposed: &Map<String, Value>,
    ) -> Result<ApplicationRecord, IntakeError> {
        self.arbiter.update(token, step_number, proposed).await
    }

    /// Record consent and complete the application
    ///
    /// # Errors
    /// See [`CompletionFinalizer::finalize`]
    pub async fn finalize(
        &self,
        token: &str,
        consents: ConsentSet,
    ) -> Result<FinalizeOutcome, IntakeError> {
        self.finalizer.finalize(token, consents).await
    }

    /// Claim and dispatch the confirmation, waiting for the send
    ///
    /// # Errors
    /// See [`CompletionFinalizer::claim_notification`]
    pub async fn notify(&self, request: &NotifyRequest) -> Result<NotifyOutcome, IntakeError> {
        self.finalizer.notify(request).await
    }

    /// Claim and dispatch on a spawned task, returning once the claim settles
    ///
    /// The claim runs off the caller's future, so dropping the caller (client
    /// disconnect, request timeout) after the flag is set cannot strand the
    /// dispatch.
    ///
    /// # Errors
    /// See [`CompletionFinalizer::claim_notification`]; `Persistence` if the
    /// claim task panicked
    pub async fn notify_in_background(
        &self,
        request: &NotifyRequest,
    ) -> Result<BackgroundNotify, IntakeError> {
        let (reply, claimed) = oneshot::channel();
        let finalizer = self.finalizer.clone();
        let request = request.clone();

        tokio::spawn(async move {
            let claim = finalizer.claim_notification(&request).await;
            let outcome = match claim {
                Ok(NotifyClaim::Claimed(record)) => Ok(BackgroundNotify::Spawned(tokio::spawn(
                    async move { finalizer.dispatch(&record).await },
                ))),
                Ok(NotifyClaim::AlreadyNotified) => Ok(BackgroundNotify::AlreadyNotified),
                Err(err) => Err(err),
            };
            if let Err(Ok(BackgroundNotify::Spawned(_))) = reply.send(outcome) {
                tracing::info!(
                    application_id = %request.application_id,
                    "notify caller went away; dispatch continues"
                );
            }
        });

        claimed.await.map_err(|_| {
            tracing::error!("notify claim task ended without a result");
            IntakeError::Persistence("notify claim task failed".to_string())
        })?
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, IntakeError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(IntakeError::MissingField(field))
}

fn optional_text(value: Option<String>, field: &'static str) -> Result<Option<String>, IntakeError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(IntakeError::InvalidFieldValue {
            field,
            reason: format!("longer than {MAX_TEXT_LEN} characters"),
        });
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApplicationStatus;

    fn service() -> IntakeService {
        let config = IntakeConfig::new().with_signing_secret("service-test-secret-0123456789abcdef");
        IntakeService::new(
            &config,
            Arc::new(InMemoryApplicationStore::new()),
            Arc::new(SummaryRenderer::new()),
            None,
        )
        .unwrap()
    }

    fn input(licence: Option<&str>, source: Option<&str>) -> CreateApplication {
        CreateApplication {
            licence_status: licence.map(String::from),
            source: source.map(String::from),
            ..CreateApplication::default()
        }
    }

    #[test]
    fn missing_secret_refuses_to_build() {
        let result = IntakeService::new(
            &IntakeConfig::new(),
            Arc::new(InMemoryApplicationStore::new()),
            Arc::new(SummaryRenderer::new()),
            None,
        );
        assert!(matches!(result, Err(IntakeError::ServerConfiguration(_))));
    }

    #[tokio::test]
    async fn create_issues_bound_token() {
        let service = service();
        let created = service
            .create(CreateApplication {
                agent_id: Some("  AG-9 ".into()),
                ..input(Some("valid"), Some("agent"))
            })
            .await
            .unwrap();

        let session = service.gate().authorize(&created.token).unwrap();
        assert_eq!(session.application_id, created.application_id);
        assert_eq!(session.session_marker.as_str(), created.session_marker);
        assert_eq!(session.agent_id.as_deref(), Some("AG-9"));

        let record = service.store().get(created.application_id).await.unwrap();
        assert_eq!(record.status, ApplicationStatus::Partial);
        assert_eq!(record.current_step, 1);
    }

    #[tokio::test]
    async fn create_validates_step_one() {
        let service = service();
        assert_eq!(
            service.create(input(None, Some("online"))).await,
            Err(IntakeError::MissingField("licenceStatus"))
        );
        assert_eq!(
            service.create(input(Some("valid"), Some("  "))).await,
            Err(IntakeError::MissingField("source"))
        );
        assert!(matches!(
            service.create(input(Some("revoked"), Some("online"))).await,
            Err(IntakeError::InvalidEnumValue { field: "firearm_licence_status", .. })
        ));
        assert!(matches!(
            service.create(input(Some("valid"), Some("billboard"))).await,
            Err(IntakeError::InvalidEnumValue { field: "source", .. })
        ));
    }

    #[tokio::test]
    async fn notify_without_notifier_is_configuration_error() {
        let service = service();
        let request = NotifyRequest {
            application_id: ApplicationId::new(),
            session_marker: "marker".into(),
            event_correlation_id: None,
        };
        assert!(matches!(
            service.notify_in_background(&request).await,
            Err(IntakeError::ServerConfiguration(_))
        ));
    }
}
