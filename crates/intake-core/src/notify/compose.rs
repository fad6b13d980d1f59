//! Confirmation email composition
//!
//! Every applicant-controlled value passes through [`escape_html`] before it
//! reaches the body.

use super::{Attachment, EmailMessage, Mailbox};
use crate::config::MailSettings;
use crate::cover::{format_rand, CoverPlan};
use crate::types::ApplicationRecord;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

const BRAND: &str = "Acorn Brokers";
const FOOTER: &str = "Acorn Brokers (Pty) Ltd | FSP 47433";

/// Escape text for inclusion in HTML
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// English ordinal suffix for a day of the month
#[must_use]
pub const fn ordinal_suffix(day: u8) -> &'static str {
    match (day % 10, day % 100) {
        (1, n) if n != 11 => "st",
        (2, n) if n != 12 => "nd",
        (3, n) if n != 13 => "rd",
        _ => "th",
    }
}

/// Subject line: `New Application Received - <first> <last> - Ref: <REF>`
#[must_use]
pub fn subject(record: &ApplicationRecord) -> String {
    let name: String = record
        .full_name()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    format!(
        "New Application Received - {name} - Ref: {}",
        record.id.reference()
    )
}

/// HTML body summarising the application
#[must_use]
pub fn html_body(record: &ApplicationRecord) -> String {
    let field = |value: &Option<String>| escape_html(value.as_deref().unwrap_or(""));

    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>New Application Received</title></head>\n\
         <body style=\"font-family: Arial, sans-serif;\">\n\
         <h1>{BRAND}</h1>\n<p>New Application Received</p>\n\
         <p><strong>Reference Number:</strong> {reference}<br>\
         <strong>Submitted:</strong> {submitted}</p>\n",
        reference = record.id.reference(),
        submitted = format_timestamp(record.created_at),
    );

    section(&mut html, "Personal Details");
    row(&mut html, "Full Name", &escape_html(&record.full_name()));
    row(&mut html, "SA ID Number", &field(&record.sa_id_number));
    row(&mut html, "Mobile", &field(&record.mobile));
    row(&mut html, "Email", &field(&record.email));
    row(
        &mut html,
        "Address",
        &format!(
            "{}, {}<br>{}, {}",
            field(&record.street_address),
            field(&record.suburb),
            field(&record.city),
            field(&record.province)
        ),
    );
    html.push_str("</table>\n");

    section(&mut html, "Cover Selection");
    match record.cover_option.map(CoverPlan::for_option) {
        Some(plan) => {
            row(&mut html, "Plan", plan.name);
            row(&mut html, "Monthly Premium", &format_rand(plan.monthly_premium));
            row(&mut html, "Legal Expense Limit", &format_rand(plan.legal_expense_limit));
            row(&mut html, "Liability Limit", &format_rand(plan.liability_limit));
        }
        None => row(&mut html, "Plan", "Not selected"),
    }
    html.push_str("</table>\n");

    section(&mut html, "Banking Details");
    row(&mut html, "Account Holder", &field(&record.account_holder));
    row(&mut html, "Bank", &field(&record.bank_name));
    row(
        &mut html,
        "Account Type",
        &record
            .account_type
            .map(|t| capitalize(t.as_str()))
            .unwrap_or_default(),
    );
    row(&mut html, "Account Number", &field(&record.account_number));
    row(
        &mut html,
        "Debit Date",
        &record
            .preferred_debit_date
            .map(|day| format!("{day}{} of each month", ordinal_suffix(day)))
            .unwrap_or_default(),
    );
    html.push_str("</table>\n");

    section(&mut html, "Consent Confirmations");
    for (given, label) in [
        (record.debit_order_consent, "Debit Order Authorisation"),
        (record.declaration_consent, "Declaration"),
        (record.popia_consent, "POPIA Consent"),
        (record.terms_consent, "Terms and Conditions"),
        (record.electronic_signature_consent, "Electronic Signature"),
    ] {
        if given {
            let _ = writeln!(html, "<tr><td>&#9989; {label}</td></tr>");
        }
    }
    if let Some(at) = record.consent_timestamp {
        let _ = writeln!(html, "<tr><td>Consent recorded: {}</td></tr>", format_timestamp(at));
    }
    html.push_str("</table>\n");

    section(&mut html, "Attribution");
    row(&mut html, "Source", record.source.as_str());
    if let Some(agent) = record.agent_id.as_deref().filter(|a| !a.is_empty()) {
        row(&mut html, "Agent ID", &escape_html(agent));
    }
    html.push_str("</table>\n");

    let _ = write!(
        html,
        "<p style=\"font-size: 12px;\">{FOOTER}</p>\n\
         <p style=\"font-size: 11px;\">This is an automated notification. The application summary is attached.</p>\n\
         </body>\n</html>\n"
    );
    html
}

/// Compose the broker confirmation for a finalized record
#[must_use]
pub fn confirmation_email(
    record: &ApplicationRecord,
    attachment: Attachment,
    settings: &MailSettings,
) -> EmailMessage {
    EmailMessage {
        to: settings.recipients.clone(),
        from: Mailbox {
            email: settings.from_email.clone(),
            name: settings.from_name.clone(),
        },
        subject: subject(record),
        html: html_body(record),
        attachments: vec![attachment],
    }
}

fn section(html: &mut String, title: &str) {
    let _ = writeln!(html, "<h2>{title}</h2>\n<table width=\"100%\" cellpadding=\"5\">");
}

fn row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(html, "<tr><td width=\"35%\">{label}:</td><td>{value}</td></tr>");
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%d %B %Y, %H:%M UTC").to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AccountType, ConsentSet, CoverOption, LicenceStatus, NewApplication, Source,
    };

    fn finalized() -> ApplicationRecord {
        let mut record = ApplicationRecord::new(
            NewApplication {
                licence_status: LicenceStatus::Valid,
                source: Source::Agent,
                agent_id: Some("AG<01>".into()),
                user_agent: None,
            },
            Utc::now(),
        );
        record.first_name = Some("Jane".into());
        record.last_name = Some("O'Neil <script>".into());
        record.cover_option = Some(CoverOption::OptionA);
        record.account_type = Some(AccountType::Savings);
        record.preferred_debit_date = Some(22);
        record
            .complete_with(ConsentSet::all_granted(), Utc::now())
            .unwrap();
        record
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn ordinals() {
        let cases = [(1, "st"), (2, "nd"), (3, "rd"), (4, "th"), (11, "th"), (12, "th"),
            (13, "th"), (21, "st"), (22, "nd"), (23, "rd"), (31, "st")];
        for (day, suffix) in cases {
            assert_eq!(ordinal_suffix(day), suffix, "day {day}");
        }
    }

    #[test]
    fn subject_carries_reference() {
        let record = finalized();
        let subject = subject(&record);
        assert!(subject.starts_with("New Application Received - Jane O'Neil <script> - Ref: "));
        assert!(subject.ends_with(&record.id.reference()));
    }

    #[test]
    fn body_never_contains_raw_applicant_markup() {
        let html = html_body(&finalized());
        assert!(!html.contains("<script>"));
        assert!(html.contains("O&#039;Neil &lt;script&gt;"));
        assert!(html.contains("AG&lt;01&gt;"));
        assert!(html.contains("Essential Cover"));
        assert!(html.contains("R135"));
        assert!(html.contains("R100 000"));
        assert!(html.contains("22nd of each month"));
        assert!(html.contains("Savings"));
    }
}
