//! Session lifecycle states and the observable status snapshot.

use chrono::{DateTime, Utc};

/// Lifecycle state of an [`crate::session::HttpSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    Ready,
    InUse,
    LoggingOut,
    Error,
    LockedOut,
    Shutdown,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SessionState::LoggedOut => "Logged Out",
            SessionState::LoggingIn => "Logging In",
            SessionState::Ready => "Ready",
            SessionState::InUse => "In Use",
            SessionState::LoggingOut => "Logging Out",
            SessionState::Error => "Error",
            SessionState::LockedOut => "Locked Out",
            SessionState::Shutdown => "Shutdown",
        };
        f.write_str(text)
    }
}

/// Observable snapshot of a session, published on every change.
///
/// Obtain a live feed through
/// [`crate::session::HttpSession::subscribe`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionStatus {
    pub name: String,
    pub state: SessionState,
    /// Set while logged in, from the moment login succeeded.
    pub uptime_since: Option<DateTime<Utc>>,
    /// Time of the most recent login failure or lockout.
    pub last_error: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Callers that have requested the session and not yet released
    /// (or been rejected).
    pub in_queue: usize,
    pub is_logged_in: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_vocabulary() {
        assert_eq!(SessionState::LoggedOut.to_string(), "Logged Out");
        assert_eq!(SessionState::LoggingIn.to_string(), "Logging In");
        assert_eq!(SessionState::InUse.to_string(), "In Use");
        assert_eq!(SessionState::LockedOut.to_string(), "Locked Out");
    }
}
