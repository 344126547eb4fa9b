//! Hooks into the UI collaborator.
//!
//! The sync engine never renders anything; when it mutates state the UI
//! must reflect, it calls through this trait and the embedder decides how
//! to present it.

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Error,
}

/// The UI collaborator contract.
pub trait UiBridge: Send + Sync {
    /// Show a message to the user.
    fn notify(&self, message: &str, severity: Severity);

    /// The currently open group changed underneath the UI; redraw it.
    fn refresh_group_view(&self);

    /// The set of groups changed; redraw the group list if it is showing.
    fn refresh_group_list(&self);
}

/// A UI bridge that does nothing. Used by tests and headless embedders.
#[derive(Debug, Default)]
pub struct NullUi;

impl UiBridge for NullUi {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::debug!(?severity, message, "notification dropped (no UI)");
    }

    fn refresh_group_view(&self) {}

    fn refresh_group_list(&self) {}
}
