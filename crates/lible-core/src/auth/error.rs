use thiserror::Error;

use super::store::StoreError;
use super::token::TokenError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Malformed access token: {0}")]
    MalformedToken(#[from] TokenError),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// A refresh finished after the session it belonged to was torn down.
    #[error("Session ended while the request was in flight")]
    SessionEnded,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Token storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Whether the session must be torn down because of this error.
    /// A refresh that could not be obtained or not be stored leaves no
    /// usable token behind.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, AuthError::RefreshFailed(_) | AuthError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(AuthError::RefreshFailed("revoked".into()).is_fatal_to_session());
        assert!(AuthError::Storage(StoreError::NotPersisted("lible_token".into())).is_fatal_to_session());

        assert!(!AuthError::SessionEnded.is_fatal_to_session());
        assert!(!AuthError::InvalidCredentials.is_fatal_to_session());
        assert!(!AuthError::Network("timeout".into()).is_fatal_to_session());
    }

    #[test]
    fn test_malformed_token_converts() {
        let err: AuthError = crate::auth::expiry_of("not-a-jwt").unwrap_err().into();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }
}
