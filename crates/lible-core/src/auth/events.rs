//! Notifications published by the session layer.
//!
//! Front ends subscribe to these to show "session expiring" warnings and to
//! route the user back to the login prompt.

use std::fmt;

use chrono::{DateTime, Utc};

/// Why a session was ended without the user asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    TokenExpired,
    TokenMissing,
    TokenMalformed,
    RefreshFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TokenExpired => "access token expired",
            Self::TokenMissing => "no access token stored",
            Self::TokenMalformed => "access token could not be read",
            Self::RefreshFailed => "token refresh failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    LoggedOut,
    /// Non-fatal; may repeat on every monitor tick inside the warning window.
    ExpiringSoon { expires_at: DateTime<Utc> },
    Expired { reason: TerminationReason },
    /// The front end should return to its login entry point.
    LoginRequired,
}
