//! User-facing notifications raised by list operations

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: Option<String>,
    pub message: String,
    /// Modal dialog the user must acknowledge
    pub blocking: bool,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            title: None,
            message: message.into(),
            blocking: false,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Warning,
            ..Self::info(message)
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Danger,
            ..Self::info(message)
        }
    }

    /// Blocking error dialog
    pub fn dialog(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Danger,
            title: Some(title.into()),
            message: message.into(),
            blocking: true,
        }
    }
}

/// Queue of notifications waiting to be shown
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<Notification>,
}

impl NotificationQueue {
    pub fn push(&mut self, notification: Notification) {
        match notification.kind {
            NotificationKind::Danger => tracing::warn!(message = %notification.message, "Error notification"),
            _ => tracing::debug!(message = %notification.message, "Notification"),
        }
        self.pending.push(notification);
    }

    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    pub fn has_blocking(&self) -> bool {
        self.pending.iter().any(|n| n.blocking)
    }

    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}
