//! Confirmation notification
//!
//! Two collaborator seams sit behind traits:
//! - [`DocumentRenderer`] turns a finalized record into an attachment
//! - [`Notifier`] delivers an [`EmailMessage`]
//!
//! [`compose`] builds the message itself; [`SummaryRenderer`] and
//! [`SendGridNotifier`] are the shipped implementations.

pub mod compose;
mod render;
mod sendgrid;

pub use render::SummaryRenderer;
pub use sendgrid::{SendGridNotifier, DEFAULT_SENDGRID_ENDPOINT};

use crate::types::ApplicationRecord;
use async_trait::async_trait;

/// Sender identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Address
    pub email: String,
    /// Display name
    pub name: String,
}

/// Binary attachment
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to recipients
    pub filename: String,
    /// MIME type
    pub content_type: String,
    /// Raw bytes
    pub content: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// A fully composed email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipients
    pub to: Vec<String>,
    /// Sender
    pub from: Mailbox,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Attachments
    pub attachments: Vec<Attachment>,
}

/// Proof of acceptance by the mail provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message identifier, when reported
    pub message_id: Option<String>,
}

/// Delivery failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    /// Request never got a response
    #[error("notifier transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("notifier rejected message with status {status}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body (truncated)
        body: String,
    },
}

/// Rendering failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Record lacks a value the document needs
    #[error("record missing {0}")]
    MissingField(&'static str),

    /// Renderer failed internally
    #[error("render failed: {0}")]
    Failed(String),
}

/// Produces the attachment sent with the confirmation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render a finalized record
    async fn render(&self, record: &ApplicationRecord) -> Result<Attachment, RenderError>;
}

/// Delivers composed email
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message
    async fn send(&self, message: EmailMessage) -> Result<DeliveryReceipt, NotifierError>;
}
