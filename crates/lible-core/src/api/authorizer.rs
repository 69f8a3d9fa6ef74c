//! Bearer token attachment with a single refresh-and-retry on 401.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::{SessionCore, TerminationReason};

use super::{ApiError, ApiRequest, ApiResponse, Transport};

/// [`Transport`] wrapper that authorizes every request with the session's
/// current access token.
///
/// A 401 triggers at most one token refresh per request. If the refresh
/// fails the session is terminated and the caller sees the original 401,
/// never the refresh error.
pub struct RequestAuthorizer {
    inner: Arc<dyn Transport>,
    core: Arc<SessionCore>,
}

impl RequestAuthorizer {
    pub(crate) fn new(inner: Arc<dyn Transport>, core: Arc<SessionCore>) -> Self {
        Self { inner, core }
    }
}

#[async_trait]
impl Transport for RequestAuthorizer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retried = false;

        loop {
            let token = self.core.access_token();
            let attempt = request.clone().bearer(token.clone());
            let response = self.inner.send(attempt).await?;

            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            if retried {
                warn!(path = %request.path, "Still unauthorized after token refresh");
                return Ok(response);
            }
            retried = true;

            debug!(path = %request.path, "Unauthorized, refreshing access token");
            match self.core.refresh_after_unauthorized(token.as_deref()).await {
                Ok(()) => continue,
                Err(e) if e.is_fatal_to_session() => {
                    warn!(error = %e, "Token refresh failed, ending session");
                    self.core.terminate(TerminationReason::RefreshFailed);
                    return Ok(response);
                }
                Err(e) => {
                    debug!(error = %e, "Refresh abandoned");
                    return Ok(response);
                }
            }
        }
    }
}
