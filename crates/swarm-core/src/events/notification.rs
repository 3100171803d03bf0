//! Notification severity.

use serde::{Deserialize, Serialize};

/// How a client should present a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Informational.
    Info,
    /// A job finished successfully.
    Success,
    /// Something needs attention but nothing failed.
    Warning,
    /// A job failed.
    Error,
}
