//! Metric names
//!
//! Counters are emitted through the `metrics` facade; installing a recorder
//! is left to the embedding process.

/// Applications created
pub const APPLICATIONS_CREATED: &str = "intake_applications_created_total";
/// Step updates applied
pub const UPDATES_APPLIED: &str = "intake_updates_applied_total";
/// Applications finalized
pub const APPLICATIONS_COMPLETED: &str = "intake_applications_completed_total";
/// Confirmation emails accepted by the notifier
pub const NOTIFICATIONS_DISPATCHED: &str = "intake_notifications_dispatched_total";
/// Confirmation emails that failed to render or send
pub const NOTIFICATIONS_FAILED: &str = "intake_notifications_failed_total";
/// Requests rejected by the session gate or notify authorization
pub const AUTH_REJECTIONS: &str = "intake_auth_rejections_total";
