//! Access token inspection.
//!
//! Reads the `exp` claim out of a JWT-shaped token without checking the
//! signature. The backend remains the authority on validity; this is only
//! used to decide when the local session should end.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::events::TerminationReason;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("expected 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("payload segment is not valid base64url")]
    InvalidBase64,

    #[error("payload is not a JSON object")]
    InvalidJson,

    #[error("payload has no numeric exp claim")]
    MissingExpiry,

    #[error("exp claim {0} is out of range")]
    ExpiryOutOfRange(i64),
}

/// Decode the absolute expiry instant of `token`.
pub fn expiry_of(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::SegmentCount(segments.len()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| TokenError::InvalidBase64)?;

    let claims: JsonValue =
        serde_json::from_slice(&payload).map_err(|_| TokenError::InvalidJson)?;
    let claims = claims.as_object().ok_or(TokenError::InvalidJson)?;

    let exp = claims
        .get("exp")
        .and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        })
        .ok_or(TokenError::MissingExpiry)?;

    DateTime::from_timestamp(exp, 0).ok_or(TokenError::ExpiryOutOfRange(exp))
}

/// Where a token stands relative to its expiry at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Valid { expires_at: DateTime<Utc> },
    ExpiringSoon { expires_at: DateTime<Utc> },
    Expired(TerminationReason),
}

/// Classify `token` at `now`. Absent and undecodable tokens count as expired.
pub fn expiry_status(
    token: Option<&str>,
    now: DateTime<Utc>,
    warning_window: Duration,
) -> ExpiryStatus {
    let Some(token) = token else {
        return ExpiryStatus::Expired(TerminationReason::TokenMissing);
    };
    let expires_at = match expiry_of(token) {
        Ok(at) => at,
        Err(_) => return ExpiryStatus::Expired(TerminationReason::TokenMalformed),
    };

    if now >= expires_at {
        ExpiryStatus::Expired(TerminationReason::TokenExpired)
    } else if now >= expires_at - warning_window {
        ExpiryStatus::ExpiringSoon { expires_at }
    } else {
        ExpiryStatus::Valid { expires_at }
    }
}
