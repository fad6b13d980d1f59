//! Core types for the intake pipeline
//!
//! Defines the application record and the values it is built from:
//! - Identifiers and session markers
//! - Wire enumerations (licence status, source, cover, account type)
//! - Consent set captured at finalization
//! - Record lifecycle transitions (partial -> complete -> notified)

use crate::error::{IntakeError, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// First wizard step; committed by application creation
pub const FIRST_STEP: u8 = 1;

/// Final wizard step; reached only through finalization
pub const FINAL_STEP: u8 = 5;

/// Longest accepted enum value echoed back in errors
const ECHO_LIMIT: usize = 64;

/// Unique application identifier (UUID v4, assigned once at creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    /// Generate new application ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short upper-case reference quoted to brokers and in subjects
    #[must_use]
    pub fn reference(&self) -> String {
        let mut text = self.0.to_string();
        text.truncate(8);
        text.to_ascii_uppercase()
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApplicationId {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IntakeError::MalformedIdentifier(truncate_echo(s)))
    }
}

/// Opaque per-application session marker
///
/// Generated at creation, stored on the record, and embedded in the session
/// token. The notify path compares it in constant time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMarker(String);

impl SessionMarker {
    /// Generate a fresh random marker
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Marker as presented to the client
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a caller-supplied marker
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl fmt::Debug for SessionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionMarker(..)")
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, field = $field:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every accepted value, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire name of the field carrying this value
            pub const FIELD: &'static str = $field;

            /// Wire spelling of this value
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = IntakeError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(IntakeError::InvalidEnumValue {
                        field: $field,
                        value: truncate_echo(other),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Applicant's firearm licence standing at step 1
    LicenceStatus, field = "firearm_licence_status" {
        /// Licence held
        Valid => "valid",
        /// Licence application pending
        InProgress => "in_progress",
    }
}

wire_enum! {
    /// How the applicant found the product
    Source, field = "source" {
        /// Self-service online
        Online => "online",
        /// Through a broker agent
        Agent => "agent",
        /// Personal referral
        Referral => "referral",
        /// Anything else
        Other => "other",
    }
}

wire_enum! {
    /// Application lifecycle status
    ApplicationStatus, field = "status" {
        /// Wizard in progress
        Partial => "partial",
        /// Finalized; terminal
        Complete => "complete",
    }
}

wire_enum! {
    /// Selected cover plan
    CoverOption, field = "cover_option" {
        /// Essential cover
        OptionA => "option_a",
        /// Comprehensive cover
        OptionB => "option_b",
    }
}

wire_enum! {
    /// Bank account type for the debit order
    AccountType, field = "account_type" {
        /// Cheque / current account
        Cheque => "cheque",
        /// Savings account
        Savings => "savings",
        /// Transmission account
        Transmission => "transmission",
    }
}

/// Step-1 input that creates a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    /// Licence standing
    pub licence_status: LicenceStatus,
    /// Acquisition source
    pub source: Source,
    /// Optional broker agent attribution
    pub agent_id: Option<String>,
    /// Optional client user-agent string
    pub user_agent: Option<String>,
}

/// Consents captured by finalization
///
/// Accepts both the column spelling and the wizard's camelCase spelling.
/// Missing keys read as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentSet {
    /// Debit order authorisation (required)
    #[serde(default, alias = "debitOrderConsent")]
    pub debit_order_consent: bool,
    /// Declaration of truth (required)
    #[serde(default, alias = "declarationConsent")]
    pub declaration_consent: bool,
    /// POPIA processing consent (required)
    #[serde(default, alias = "popiaConsent")]
    pub popia_consent: bool,
    /// Terms and conditions
    #[serde(default, alias = "termsConsent")]
    pub terms_consent: bool,
    /// Electronic signature
    #[serde(default, alias = "electronicSignatureConsent")]
    pub electronic_signature_consent: bool,
}

impl ConsentSet {
    /// All consents granted
    #[must_use]
    pub const fn all_granted() -> Self {
        Self {
            debit_order_consent: true,
            declaration_consent: true,
            popia_consent: true,
            terms_consent: true,
            electronic_signature_consent: true,
        }
    }

    /// Ensure every mandatory authorisation was given
    ///
    /// # Errors
    /// `ConsentRequired` naming the first missing consent
    pub fn ensure_required(&self) -> Result<(), IntakeError> {
        if !self.debit_order_consent {
            return Err(IntakeError::ConsentRequired("debit_order_consent"));
        }
        if !self.declaration_consent {
            return Err(IntakeError::ConsentRequired("declaration_consent"));
        }
        if !self.popia_consent {
            return Err(IntakeError::ConsentRequired("popia_consent"));
        }
        Ok(())
    }
}

/// The sole persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Immutable identifier
    pub id: ApplicationId,
    /// Marker the notify path authenticates against
    pub session_marker: SessionMarker,

    // Eligibility
    /// Licence standing
    pub firearm_licence_status: LicenceStatus,
    /// Acquisition source
    pub source: Source,
    /// Broker agent attribution
    pub agent_id: Option<String>,
    /// Client user-agent at creation
    pub user_agent: Option<String>,

    // Personal details
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sa_id_number: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub street_address: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,

    // Cover selection
    pub cover_option: Option<CoverOption>,

    // Banking
    pub account_holder: Option<String>,
    pub bank_name: Option<String>,
    pub account_type: Option<AccountType>,
    pub account_number: Option<String>,
    pub preferred_debit_date: Option<u8>,

    // Consent
    pub debit_order_consent: bool,
    pub declaration_consent: bool,
    pub popia_consent: bool,
    pub terms_consent: bool,
    pub electronic_signature_consent: bool,
    pub consent_timestamp: Option<DateTime<Utc>>,

    // Progress
    /// Last committed wizard step
    pub current_step: u8,
    /// Lifecycle status
    pub status: ApplicationStatus,
    /// Idempotency flag guarding the confirmation email
    pub abandonment_email_sent: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Build the step-1 record with a fresh identifier and session marker
    #[must_use]
    pub fn new(new: NewApplication, now: DateTime<Utc>) -> Self {
        Self {
            id: ApplicationId::new(),
            session_marker: SessionMarker::generate(),
            firearm_licence_status: new.licence_status,
            source: new.source,
            agent_id: new.agent_id,
            user_agent: new.user_agent,
            first_name: None,
            last_name: None,
            sa_id_number: None,
            mobile: None,
            email: None,
            street_address: None,
            suburb: None,
            city: None,
            province: None,
            cover_option: None,
            account_holder: None,
            bank_name: None,
            account_type: None,
            account_number: None,
            preferred_debit_date: None,
            debit_order_consent: false,
            declaration_consent: false,
            popia_consent: false,
            terms_consent: false,
            electronic_signature_consent: false,
            consent_timestamp: None,
            current_step: FIRST_STEP,
            status: ApplicationStatus::Partial,
            abandonment_email_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the record reached its terminal status
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ApplicationStatus::Complete
    }

    /// Transition partial -> complete, recording consent
    ///
    /// # Errors
    /// `AlreadyComplete` if the record is already terminal; nothing changes
    pub fn complete_with(
        &mut self,
        consents: ConsentSet,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.is_complete() {
            return Err(StoreError::AlreadyComplete);
        }
        self.debit_order_consent = consents.debit_order_consent;
        self.declaration_consent = consents.declaration_consent;
        self.popia_consent = consents.popia_consent;
        self.terms_consent = consents.terms_consent;
        self.electronic_signature_consent = consents.electronic_signature_consent;
        self.consent_timestamp = Some(now);
        self.status = ApplicationStatus::Complete;
        self.current_step = FINAL_STEP;
        self.updated_at = now;
        Ok(())
    }

    /// Flip the notification flag false -> true
    ///
    /// Returns whether this call changed it. Callers must run this inside the
    /// store's per-record critical section for the result to be meaningful.
    pub fn mark_notified(&mut self, now: DateTime<Utc>) -> bool {
        if self.abandonment_email_sent {
            return false;
        }
        self.abandonment_email_sent = true;
        self.updated_at = now;
        true
    }

    /// Applicant's display name, empty parts skipped
    #[must_use]
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn truncate_echo(value: &str) -> String {
    value.chars().take(ECHO_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApplicationRecord {
        ApplicationRecord::new(
            NewApplication {
                licence_status: LicenceStatus::Valid,
                source: Source::Online,
                agent_id: None,
                user_agent: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn new_record_starts_partial_at_step_one() {
        let record = sample();
        assert_eq!(record.status, ApplicationStatus::Partial);
        assert_eq!(record.current_step, FIRST_STEP);
        assert!(!record.abandonment_email_sent);
        assert!(record.consent_timestamp.is_none());
    }

    #[test]
    fn wire_enums_parse_their_spellings() {
        assert_eq!("in_progress".parse::<LicenceStatus>(), Ok(LicenceStatus::InProgress));
        assert_eq!("referral".parse::<Source>(), Ok(Source::Referral));
        assert_eq!("option_b".parse::<CoverOption>(), Ok(CoverOption::OptionB));
        assert!(matches!(
            "expired".parse::<LicenceStatus>(),
            Err(IntakeError::InvalidEnumValue { field: "firearm_licence_status", .. })
        ));
    }

    #[test]
    fn completion_is_terminal() {
        let mut record = sample();
        let now = Utc::now();
        record.complete_with(ConsentSet::all_granted(), now).unwrap();
        assert!(record.is_complete());
        assert_eq!(record.current_step, FINAL_STEP);
        assert_eq!(record.consent_timestamp, Some(now));

        let before = record.clone();
        let again = record.complete_with(ConsentSet::default(), Utc::now());
        assert_eq!(again, Err(StoreError::AlreadyComplete));
        assert_eq!(record, before);
    }

    #[test]
    fn notification_flag_flips_once() {
        let mut record = sample();
        assert!(record.mark_notified(Utc::now()));
        assert!(!record.mark_notified(Utc::now()));
        assert!(record.abandonment_email_sent);
    }

    #[test]
    fn missing_consent_is_named() {
        let consents = ConsentSet {
            debit_order_consent: true,
            declaration_consent: true,
            ..ConsentSet::default()
        };
        assert_eq!(
            consents.ensure_required(),
            Err(IntakeError::ConsentRequired("popia_consent"))
        );
        assert!(ConsentSet::all_granted().ensure_required().is_ok());
    }

    #[test]
    fn consent_accepts_camel_case() {
        let consents: ConsentSet = serde_json::from_str(
            r#"{"debitOrderConsent":true,"declaration_consent":true,"popiaConsent":true}"#,
        )
        .unwrap();
        assert!(consents.ensure_required().is_ok());
        assert!(!consents.terms_consent);
    }

    #[test]
    fn session_marker_comparison() {
        let marker = SessionMarker::generate();
        assert!(marker.matches(marker.as_str()));
        assert!(!marker.matches("not-the-marker"));
        assert!(!marker.matches(""));
    }

    #[test]
    fn reference_is_eight_upper_case_chars() {
        let id: ApplicationId = "3f2b9c1e-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(id.reference(), "3F2B9C1E");
        assert!(matches!(
            "not-a-uuid".parse::<ApplicationId>(),
            Err(IntakeError::MalformedIdentifier(_))
        ));
    }
}
