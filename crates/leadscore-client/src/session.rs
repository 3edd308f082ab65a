//! Session lifecycle notifications.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

/// Broadcast whenever the authenticated session changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login, signup or restored session now holds a credential.
    Authenticated,
    /// The access token was renewed.
    Refreshed,
    /// Renewal failed or was impossible; the credential has been cleared and
    /// the user must log in again. Sent once per teardown.
    Expired,
    /// The user logged out.
    LoggedOut,
}

/// Fan-out channel for [`SessionEvent`]s. Emitting with no subscribers is not
/// an error.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        tracing::debug!(?event, "session event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
