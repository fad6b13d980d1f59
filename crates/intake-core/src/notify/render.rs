//! Plain-text application summary

use super::{Attachment, DocumentRenderer, RenderError};
use crate::cover::{format_rand, CoverPlan};
use crate::types::ApplicationRecord;
use async_trait::async_trait;
use std::fmt::Write as _;

/// Renders a finalized record as a plain-text summary attachment
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryRenderer;

impl SummaryRenderer {
    /// Create a renderer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn summary(record: &ApplicationRecord) -> String {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let mut out = String::with_capacity(1024);

        let _ = writeln!(out, "APPLICATION SUMMARY");
        let _ = writeln!(out, "Reference: {}", record.id.reference());
        let _ = writeln!(out, "Application ID: {}", record.id);
        let _ = writeln!(out, "Submitted: {}", record.created_at.to_rfc3339());
        let _ = writeln!(out);

        let _ = writeln!(out, "[Eligibility]");
        let _ = writeln!(out, "Firearm licence: {}", record.firearm_licence_status);
        let _ = writeln!(out, "Source: {}", record.source);
        if let Some(agent) = &record.agent_id {
            let _ = writeln!(out, "Agent ID: {agent}");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[Personal Details]");
        let _ = writeln!(out, "Name: {}", record.full_name());
        let _ = writeln!(out, "SA ID number: {}", text(&record.sa_id_number));
        let _ = writeln!(out, "Mobile: {}", text(&record.mobile));
        let _ = writeln!(out, "Email: {}", text(&record.email));
        let _ = writeln!(
            out,
            "Address: {}, {}, {}, {}",
            text(&record.street_address),
            text(&record.suburb),
            text(&record.city),
            text(&record.province)
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "[Cover]");
        if let Some(plan) = record.cover_option.map(CoverPlan::for_option) {
            let _ = writeln!(out, "Plan: {}", plan.name);
            let _ = writeln!(out, "Monthly premium: {}", format_rand(plan.monthly_premium));
            let _ = writeln!(out, "Legal expense limit: {}", format_rand(plan.legal_expense_limit));
            let _ = writeln!(out, "Liability limit: {}", format_rand(plan.liability_limit));
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[Banking]");
        let _ = writeln!(out, "Account holder: {}", text(&record.account_holder));
        let _ = writeln!(out, "Bank: {}", text(&record.bank_name));
        if let Some(kind) = record.account_type {
            let _ = writeln!(out, "Account type: {kind}");
        }
        let _ = writeln!(out, "Account number: {}", text(&record.account_number));
        if let Some(day) = record.preferred_debit_date {
            let _ = writeln!(out, "Debit day: {day}");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[Consent]");
        let yes_no = |given: bool| if given { "yes" } else { "no" };
        let _ = writeln!(out, "Debit order: {}", yes_no(record.debit_order_consent));
        let _ = writeln!(out, "Declaration: {}", yes_no(record.declaration_consent));
        let _ = writeln!(out, "POPIA: {}", yes_no(record.popia_consent));
        let _ = writeln!(out, "Terms: {}", yes_no(record.terms_consent));
        let _ = writeln!(
            out,
            "Electronic signature: {}",
            yes_no(record.electronic_signature_consent)
        );
        if let Some(at) = record.consent_timestamp {
            let _ = writeln!(out, "Consent recorded: {}", at.to_rfc3339());
        }
        out
    }
}

#[async_trait]
impl DocumentRenderer for SummaryRenderer {
    async fn render(&self, record: &ApplicationRecord) -> Result<Attachment, RenderError> {
        if !record.is_complete() {
            return Err(RenderError::MissingField("consent"));
        }
        Ok(Attachment {
            filename: format!("Application-{}.txt", record.id.reference()),
            content_type: "text/plain".to_string(),
            content: Self::summary(record).into_bytes(),
        })
    }
}
