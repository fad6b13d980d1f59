//! Error types for the intake pipeline
//!
//! Three layers, each with its own enum:
//! - [`StoreError`] for the application store and its field whitelist
//! - [`crate::credential::CredentialError`] for token construction/verification
//! - [`IntakeError`] for everything that reaches a caller of [`crate::IntakeService`]
//!
//! Store errors propagate into [`IntakeError`] unchanged in kind. Credential
//! errors never do: the session gate collapses them into
//! [`IntakeError::Unauthorized`] and logs the specific reason.

use crate::types::ApplicationId;

/// Errors raised by an [`crate::store::ApplicationStore`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record with this identifier
    #[error("application not found: {0}")]
    NotFound(ApplicationId),

    /// Proposed update contained no whitelisted field
    #[error("no valid fields to update")]
    NoValidFields,

    /// A whitelisted field carried a value of the wrong shape
    #[error("invalid value for {field}: {reason}")]
    InvalidFieldValue {
        /// Wire name of the offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Record is already complete; consent and status are frozen
    #[error("application already complete")]
    AlreadyComplete,

    /// Storage layer failure
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Wrap any displayable storage failure
    #[inline]
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Main intake error type, the taxonomy seen by callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// A required input field is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An enumerated input field carried an unknown value
    #[error("invalid value for {field}: {value:?}")]
    InvalidEnumValue {
        /// Wire name of the field
        field: &'static str,
        /// Value as received (truncated)
        value: String,
    },

    /// An application identifier failed to parse
    #[error("malformed application identifier")]
    MalformedIdentifier(String),

    /// Step number outside the range an update may target
    #[error("invalid step number: {0}")]
    InvalidStepNumber(i64),

    /// A whitelisted field carried a value of the wrong shape
    #[error("invalid value for {field}: {reason}")]
    InvalidFieldValue {
        /// Wire name of the field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// Update payload held nothing on the whitelist
    #[error("no valid fields to update")]
    NoValidFields,

    /// A mandatory consent was not given
    #[error("consent required: {0}")]
    ConsentRequired(&'static str),

    /// Credential missing, malformed, expired, or badly signed
    #[error("unauthorized")]
    Unauthorized,

    /// Session marker mismatch, unknown application, or application not ready
    #[error("forbidden")]
    Forbidden,

    /// Application already finalized
    #[error("application already complete")]
    AlreadyComplete,

    /// Confirmation already dispatched
    #[error("notification already sent")]
    AlreadyNotified,

    /// Record missing from the store
    #[error("application not found: {0}")]
    NotFound(ApplicationId),

    /// Storage layer failure
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Secrets or collaborators required for this operation are not configured
    #[error("server configuration error: {0}")]
    ServerConfiguration(String),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent something unusable; never retried server-side
    Input,
    /// Credential or session marker rejected
    Authorization,
    /// Idempotency/state signal, treated as success by callers
    State,
    /// Store failure
    Persistence,
    /// Process is misconfigured
    Configuration,
}

impl IntakeError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_)
            | Self::InvalidEnumValue { .. }
            | Self::MalformedIdentifier(_)
            | Self::InvalidStepNumber(_)
            | Self::InvalidFieldValue { .. }
            | Self::NoValidFields
            | Self::ConsentRequired(_) => ErrorKind::Input,
            Self::Unauthorized | Self::Forbidden => ErrorKind::Authorization,
            Self::AlreadyComplete | Self::AlreadyNotified => ErrorKind::State,
            Self::NotFound(_) | Self::Persistence(_) => ErrorKind::Persistence,
            Self::ServerConfiguration(_) => ErrorKind::Configuration,
        }
    }

    /// Check if the caller may safely resubmit the same request
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence | ErrorKind::State)
    }

    /// Check if this error means "already done" rather than failure
    #[inline]
    #[must_use]
    pub const fn is_idempotent_success(&self) -> bool {
        matches!(self.kind(), ErrorKind::State)
    }
}

impl From<StoreError> for IntakeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::NoValidFields => Self::NoValidFields,
            StoreError::InvalidFieldValue { field, reason } => {
                Self::InvalidFieldValue { field, reason }
            }
            StoreError::AlreadyComplete => Self::AlreadyComplete,
            StoreError::Persistence(msg) => Self::Persistence(msg),
        }
    }
}
