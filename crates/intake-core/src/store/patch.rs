//! Update whitelist and typed field values
//!
//! A proposed update arrives as an untrusted JSON object. [`FieldPatch`]
//! keeps only whitelisted keys, converts each value to its column type, and
//! fails the whole patch if any kept value has the wrong shape. Nothing
//! outside [`UpdatableField`] can ever be written through this path.

use crate::error::StoreError;
use crate::types::{AccountType, ApplicationRecord, CoverOption};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// Longest accepted free-text value
pub const MAX_TEXT_LEN: usize = 255;

/// Fields the update path may write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatableField {
    FirstName,
    LastName,
    SaIdNumber,
    Mobile,
    Email,
    StreetAddress,
    Suburb,
    City,
    Province,
    CoverOption,
    AccountHolder,
    BankName,
    AccountType,
    AccountNumber,
    PreferredDebitDate,
}

impl UpdatableField {
    /// The whole whitelist
    pub const ALL: [Self; 15] = [
        Self::FirstName,
        Self::LastName,
        Self::SaIdNumber,
        Self::Mobile,
        Self::Email,
        Self::StreetAddress,
        Self::Suburb,
        Self::City,
        Self::Province,
        Self::CoverOption,
        Self::AccountHolder,
        Self::BankName,
        Self::AccountType,
        Self::AccountNumber,
        Self::PreferredDebitDate,
    ];

    /// Column name as sent by the wizard
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::SaIdNumber => "sa_id_number",
            Self::Mobile => "mobile",
            Self::Email => "email",
            Self::StreetAddress => "street_address",
            Self::Suburb => "suburb",
            Self::City => "city",
            Self::Province => "province",
            Self::CoverOption => "cover_option",
            Self::AccountHolder => "account_holder",
            Self::BankName => "bank_name",
            Self::AccountType => "account_type",
            Self::AccountNumber => "account_number",
            Self::PreferredDebitDate => "preferred_debit_date",
        }
    }

    /// Look up a wire name; `None` for anything off the whitelist
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.wire_name() == name)
    }

    fn parse(self, value: &Value) -> Result<FieldUpdate, StoreError> {
        Ok(match self {
            Self::FirstName => FieldUpdate::FirstName(text(self, value)?),
            Self::LastName => FieldUpdate::LastName(text(self, value)?),
            Self::SaIdNumber => FieldUpdate::SaIdNumber(text(self, value)?),
            Self::Mobile => FieldUpdate::Mobile(text(self, value)?),
            Self::Email => FieldUpdate::Email(text(self, value)?),
            Self::StreetAddress => FieldUpdate::StreetAddress(text(self, value)?),
            Self::Suburb => FieldUpdate::Suburb(text(self, value)?),
            Self::City => FieldUpdate::City(text(self, value)?),
            Self::Province => FieldUpdate::Province(text(self, value)?),
            Self::CoverOption => FieldUpdate::CoverOption(choice(self, value)?),
            Self::AccountHolder => FieldUpdate::AccountHolder(text(self, value)?),
            Self::BankName => FieldUpdate::BankName(text(self, value)?),
            Self::AccountType => FieldUpdate::AccountType(choice(self, value)?),
            Self::AccountNumber => FieldUpdate::AccountNumber(text(self, value)?),
            Self::PreferredDebitDate => FieldUpdate::PreferredDebitDate(debit_day(self, value)?),
        })
    }
}

impl fmt::Display for UpdatableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One typed assignment; `None` clears the column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    FirstName(Option<String>),
    LastName(Option<String>),
    SaIdNumber(Option<String>),
    Mobile(Option<String>),
    Email(Option<String>),
    StreetAddress(Option<String>),
    Suburb(Option<String>),
    City(Option<String>),
    Province(Option<String>),
    CoverOption(Option<CoverOption>),
    AccountHolder(Option<String>),
    BankName(Option<String>),
    AccountType(Option<AccountType>),
    AccountNumber(Option<String>),
    PreferredDebitDate(Option<u8>),
}

impl FieldUpdate {
    fn apply(self, record: &mut ApplicationRecord) {
        match self {
            Self::FirstName(v) => record.first_name = v,
            Self::LastName(v) => record.last_name = v,
            Self::SaIdNumber(v) => record.sa_id_number = v,
            Self::Mobile(v) => record.mobile = v,
            Self::Email(v) => record.email = v,
            Self::StreetAddress(v) => record.street_address = v,
            Self::Suburb(v) => record.suburb = v,
            Self::City(v) => record.city = v,
            Self::Province(v) => record.province = v,
            Self::CoverOption(v) => record.cover_option = v,
            Self::AccountHolder(v) => record.account_holder = v,
            Self::BankName(v) => record.bank_name = v,
            Self::AccountType(v) => record.account_type = v,
            Self::AccountNumber(v) => record.account_number = v,
            Self::PreferredDebitDate(v) => record.preferred_debit_date = v,
        }
    }
}

/// A validated, whitelist-only partial update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPatch {
    updates: Vec<FieldUpdate>,
    current_step: Option<u8>,
}

impl FieldPatch {
    /// Filter and type-check a proposed update
    ///
    /// Unknown keys are dropped. Key order does not matter.
    ///
    /// # Errors
    /// - `NoValidFields` if no key survives the whitelist
    /// - `InvalidFieldValue` if any surviving value has the wrong shape
    pub fn from_proposed(proposed: &Map<String, Value>) -> Result<Self, StoreError> {
        let mut updates = Vec::with_capacity(proposed.len());
        for (key, value) in proposed {
            match UpdatableField::from_wire(key) {
                Some(field) => updates.push(field.parse(value)?),
                None => tracing::debug!(field = %truncated(key), "dropping non-whitelisted field"),
            }
        }
        if updates.is_empty() {
            return Err(StoreError::NoValidFields);
        }
        Ok(Self {
            updates,
            current_step: None,
        })
    }

    /// Also record the wizard step this update commits
    #[must_use]
    pub const fn with_current_step(mut self, step: u8) -> Self {
        self.current_step = Some(step);
        self
    }

    /// Number of whitelisted assignments
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Always false for a constructed patch
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Assignments in this patch
    #[must_use]
    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }

    /// Apply to a record in place
    ///
    /// # Errors
    /// `AlreadyComplete` if the record is terminal; nothing is written
    pub fn apply_to(
        &self,
        record: &mut ApplicationRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if record.is_complete() {
            return Err(StoreError::AlreadyComplete);
        }
        for update in self.updates.iter().cloned() {
            update.apply(record);
        }
        if let Some(step) = self.current_step {
            record.current_step = step;
        }
        record.updated_at = now;
        Ok(())
    }
}

fn invalid(field: UpdatableField, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidFieldValue {
        field: field.wire_name(),
        reason: reason.into(),
    }
}

fn text(field: UpdatableField, value: &Value) -> Result<Option<String>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.chars().count() > MAX_TEXT_LEN => {
            Err(invalid(field, format!("longer than {MAX_TEXT_LEN} characters")))
        }
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(invalid(field, "expected a string")),
    }
}

fn choice<T>(field: UpdatableField, value: &Value) -> Result<Option<T>, StoreError>
where
    T: std::str::FromStr,
{
    match value {
        Value::Null => Ok(None),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| invalid(field, "not a recognised option")),
        _ => Err(invalid(field, "expected a string")),
    }
}

fn debit_day(field: UpdatableField, value: &Value) -> Result<Option<u8>, StoreError> {
    let day = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match day {
        Some(day @ 1..=31) => Ok(u8::try_from(day).ok()),
        _ => Err(invalid(field, "expected a day of the month 1-31")),
    }
}

fn truncated(key: &str) -> String {
    key.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LicenceStatus, NewApplication, Source};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    fn record() -> ApplicationRecord {
        ApplicationRecord::new(
            NewApplication {
                licence_status: LicenceStatus::Valid,
                source: Source::Agent,
                agent_id: Some("agent-1".into()),
                user_agent: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn whitelist_round_trips_through_wire_names() {
        for field in UpdatableField::ALL {
            assert_eq!(UpdatableField::from_wire(field.wire_name()), Some(field));
        }
        assert_eq!(UpdatableField::from_wire("status"), None);
        assert_eq!(UpdatableField::from_wire("abandonment_email_sent"), None);
        assert_eq!(UpdatableField::from_wire("popia_consent"), None);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let patch = FieldPatch::from_proposed(&object(json!({
            "account_number": "123",
            "admin_override": true,
            "status": "complete"
        })))
        .unwrap();
        assert_eq!(
            patch.updates(),
            &[FieldUpdate::AccountNumber(Some("123".into()))]
        );
    }

    #[test]
    fn nothing_whitelisted_is_an_error() {
        let result = FieldPatch::from_proposed(&object(json!({ "status": "complete" })));
        assert_eq!(result, Err(StoreError::NoValidFields));
        assert_eq!(
            FieldPatch::from_proposed(&Map::new()),
            Err(StoreError::NoValidFields)
        );
    }

    #[test]
    fn typed_values_are_checked() {
        let result = FieldPatch::from_proposed(&object(json!({
            "first_name": "Jane",
            "cover_option": "option_z"
        })));
        assert!(matches!(
            result,
            Err(StoreError::InvalidFieldValue { field: "cover_option", .. })
        ));

        let result = FieldPatch::from_proposed(&object(json!({ "preferred_debit_date": 32 })));
        assert!(matches!(
            result,
            Err(StoreError::InvalidFieldValue { field: "preferred_debit_date", .. })
        ));

        let result = FieldPatch::from_proposed(&object(json!({ "mobile": 821234567 })));
        assert!(matches!(
            result,
            Err(StoreError::InvalidFieldValue { field: "mobile", .. })
        ));
    }

    #[test]
    fn debit_day_accepts_numeric_strings() {
        let patch =
            FieldPatch::from_proposed(&object(json!({ "preferred_debit_date": "25" }))).unwrap();
        assert_eq!(patch.updates(), &[FieldUpdate::PreferredDebitDate(Some(25))]);
    }

    #[test]
    fn null_clears_and_step_is_recorded() {
        let mut record = record();
        record.email = Some("old@example.com".into());

        let patch = FieldPatch::from_proposed(&object(json!({
            "email": null,
            "cover_option": "option_a"
        })))
        .unwrap()
        .with_current_step(3);
        patch.apply_to(&mut record, Utc::now()).unwrap();

        assert_eq!(record.email, None);
        assert_eq!(record.cover_option, Some(CoverOption::OptionA));
        assert_eq!(record.current_step, 3);
    }

    #[test]
    fn complete_record_is_frozen() {
        let mut record = record();
        record
            .complete_with(crate::types::ConsentSet::all_granted(), Utc::now())
            .unwrap();
        let before = record.clone();

        let patch = FieldPatch::from_proposed(&object(json!({ "first_name": "Eve" }))).unwrap();
        assert_eq!(
            patch.apply_to(&mut record, Utc::now()),
            Err(StoreError::AlreadyComplete)
        );
        assert_eq!(record, before);
    }
}
