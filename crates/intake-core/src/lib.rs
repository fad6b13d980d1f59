//! Intake Core - insurance application submission pipeline
//!
//! The pieces behind a multi-step application wizard:
//! - Issues a signed, time-bound session token when an application starts
//! - Applies whitelisted per-step updates to the record the token is bound to
//! - Finalizes the application and records consent
//! - Dispatches the broker confirmation at most once
//!
//! # Example
//!
//! ```rust,ignore
//! use intake_core::prelude::*;
//!
//! # async fn example() -> Result<(), IntakeError> {
//! let config = IntakeConfig::new().with_env_secrets();
//! let service = IntakeService::from_config(&config).await?;
//!
//! let created = service
//!     .create(CreateApplication {
//!         licence_status: Some("valid".into()),
//!         source: Some("online".into()),
//!         ..CreateApplication::default()
//!     })
//!     .await?;
//! println!("application {}", created.application_id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod arbiter;
pub mod config;
pub mod cover;
pub mod credential;
pub mod error;
pub mod finalizer;
pub mod gate;
pub mod notify;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-exports for convenience
pub use arbiter::FieldUpdateArbiter;
pub use config::{ConfigError, IntakeConfig, MailSettings, StoreBackend};
pub use credential::{CredentialCodec, CredentialError, SessionClaims};
pub use error::{ErrorKind, IntakeError, StoreError};
pub use finalizer::{
    CompletionFinalizer, DispatchReport, FinalizeOutcome, NotifyClaim, NotifyOutcome,
    NotifyRequest,
};
pub use gate::{AuthorizedSession, SessionGate};
pub use notify::{
    Attachment, DeliveryReceipt, DocumentRenderer, EmailMessage, Mailbox, Notifier,
    NotifierError, RenderError, SendGridNotifier, SummaryRenderer,
};
pub use service::{BackgroundNotify, CreateApplication, CreatedApplication, IntakeService};
pub use store::{
    ApplicationStore, FieldPatch, FileApplicationStore, InMemoryApplicationStore, UpdatableField,
};
pub use types::{
    AccountType, ApplicationId, ApplicationRecord, ApplicationStatus, ConsentSet, CoverOption,
    LicenceStatus, NewApplication, SessionMarker, Source,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Intake Core
    pub use crate::{
        ApplicationId, ApplicationRecord, ApplicationStore, ConsentSet, CreateApplication,
        FinalizeOutcome, IntakeConfig, IntakeError, IntakeService, NotifyOutcome, NotifyRequest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
