//! Testing utilities for the intake workspace
//!
//! Shared fixtures, notifier doubles, and canned wizard payloads.

#![allow(missing_docs)]

use async_trait::async_trait;
use intake_core::{
    ApplicationId, ApplicationRecord, ApplicationStore, ConsentSet, CreateApplication,
    DeliveryReceipt, EmailMessage, FieldPatch, InMemoryApplicationStore, IntakeConfig,
    IntakeService, MailSettings, NewApplication, Notifier, NotifierError, StoreError,
    SummaryRenderer,
};
use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SIGNING_SECRET: &str = "intake-test-signing-secret-0123456789abcdef";
pub const TEST_RECIPIENT: &str = "broker@example.com";

/// Notifier that records every message it is asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each send for `delay` before accepting it
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn send_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: EmailMessage) -> Result<DeliveryReceipt, NotifierError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().push(message);
        Ok(DeliveryReceipt {
            message_id: Some(format!("test-message-{n}")),
        })
    }
}

/// Notifier whose provider always refuses
#[derive(Debug, Default)]
pub struct FailingNotifier {
    calls: AtomicUsize,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _message: EmailMessage) -> Result<DeliveryReceipt, NotifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifierError::Rejected {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// In-memory store that stalls chosen operations
///
/// `create` sleeps before writing; `mark_notified` sleeps after the flag has
/// been written, so a caller can be dropped between the write and the reply.
#[derive(Debug, Default)]
pub struct DelayedStore {
    inner: InMemoryApplicationStore,
    create_delay: Option<Duration>,
    flag_delay: Option<Duration>,
}

impl DelayedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_flag_delay(mut self, delay: Duration) -> Self {
        self.flag_delay = Some(delay);
        self
    }
}

#[async_trait]
impl ApplicationStore for DelayedStore {
    async fn create(&self, new: NewApplication) -> Result<ApplicationRecord, StoreError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.create(new).await
    }

    async fn get(&self, id: ApplicationId) -> Result<ApplicationRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn apply_update(
        &self,
        id: ApplicationId,
        patch: FieldPatch,
    ) -> Result<ApplicationRecord, StoreError> {
        self.inner.apply_update(id, patch).await
    }

    async fn complete(
        &self,
        id: ApplicationId,
        consents: ConsentSet,
    ) -> Result<ApplicationRecord, StoreError> {
        self.inner.complete(id, consents).await
    }

    async fn mark_notified(&self, id: ApplicationId) -> Result<bool, StoreError> {
        let flipped = self.inner.mark_notified(id).await?;
        if let Some(delay) = self.flag_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(flipped)
    }
}

#[derive(Debug, Default)]
struct Tally(AtomicU64);

impl CounterFn for Tally {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::SeqCst);
    }
}

/// Recorder that sums counters by name, ignoring labels
#[derive(Debug, Clone, Default)]
pub struct CountingRecorder {
    counters: Arc<Mutex<HashMap<String, Arc<Tally>>>>,
}

impl CountingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total recorded for `name` so far
    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .get(name)
            .map_or(0, |tally| tally.0.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let tally = Arc::clone(
            self.counters
                .lock()
                .entry(key.name().to_string())
                .or_default(),
        );
        Counter::from_arc(tally)
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Config with a valid signing secret and one recipient
pub fn test_config() -> IntakeConfig {
    IntakeConfig::new()
        .with_signing_secret(TEST_SIGNING_SECRET)
        .with_mail(MailSettings {
            recipients: vec![TEST_RECIPIENT.to_string()],
            ..MailSettings::default()
        })
}

/// A service over a fresh in-memory store
pub struct TestHarness {
    pub service: IntakeService,
    pub store: Arc<InMemoryApplicationStore>,
}

/// Build a service wired to the given notifier
pub fn setup_service_with(config: &IntakeConfig, notifier: Option<Arc<dyn Notifier>>) -> TestHarness {
    let store = Arc::new(InMemoryApplicationStore::new());
    let service = IntakeService::new(
        config,
        store.clone(),
        Arc::new(SummaryRenderer::new()),
        notifier,
    )
    .expect("test config is valid");
    TestHarness { service, store }
}

/// Build a service with a recording notifier
pub fn setup_service() -> (TestHarness, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let harness = setup_service_with(&test_config(), Some(notifier.clone()));
    (harness, notifier)
}

/// Step-1 input: valid licence, online source
pub fn eligibility() -> CreateApplication {
    CreateApplication {
        licence_status: Some("valid".to_string()),
        source: Some("online".to_string()),
        agent_id: None,
        user_agent: Some("intake-tests/1.0".to_string()),
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Step 2
pub fn personal_details() -> Map<String, Value> {
    object(json!({
        "first_name": "Jane",
        "last_name": "Doe",
        "sa_id_number": "9001015009087",
        "mobile": "0821234567",
        "email": "jane@example.com",
        "street_address": "1 Main Road",
        "suburb": "Gardens",
        "city": "Cape Town",
        "province": "Western Cape"
    }))
}

/// Step 3
pub fn cover_selection() -> Map<String, Value> {
    object(json!({ "cover_option": "option_b" }))
}

/// Step 4
pub fn banking_details() -> Map<String, Value> {
    object(json!({
        "account_holder": "J Doe",
        "bank_name": "Example Bank",
        "account_type": "cheque",
        "account_number": "123456789",
        "preferred_debit_date": 1
    }))
}
