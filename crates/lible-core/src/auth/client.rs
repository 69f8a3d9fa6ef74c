//! Calls to the backend's `/auth` endpoints.
//!
//! Each operation is exactly one round trip and none of them retry. This
//! client does not touch the token store; the session layer decides what to
//! persist.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::models::User;

use super::AuthError;

/// Longest slice of an error body kept in `AuthError::Server`
const MAX_MESSAGE_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: Option<User>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token")]
    token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

impl TokenResponse {
    fn into_pair(self) -> (TokenPair, Option<User>) {
        let pair = TokenPair {
            access_token: self.token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        };
        (pair, self.user)
    }
}

pub struct AuthClient {
    transport: Arc<dyn Transport>,
    prefix: String,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>, prefix: &str) -> Self {
        Self {
            transport,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn path(&self, endpoint: &str) -> String {
        format!("{}/{}", self.prefix, endpoint)
    }

    fn server_error(response: &ApiResponse) -> AuthError {
        let message: String = response.text().chars().take(MAX_MESSAGE_LENGTH).collect();
        AuthError::Server {
            status: response.status.as_u16(),
            message,
        }
    }

    fn network_error(e: ApiError) -> AuthError {
        AuthError::Network(e.to_string())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let request = ApiRequest::post(self.path("login"))
            .json(&LoginRequest { username, password })
            .map_err(Self::network_error)?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(Self::network_error)?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(Self::server_error(&response));
        }

        let parsed: TokenResponse = response.json().map_err(|e| AuthError::Server {
            status: response.status.as_u16(),
            message: e.to_string(),
        })?;
        let (tokens, user) = parsed.into_pair();
        debug!(
            token_len = tokens.access_token.len(),
            has_refresh = tokens.refresh_token.is_some(),
            "Login accepted"
        );
        Ok(LoginOutcome { tokens, user })
    }

    /// Tell the backend the session is over. Callers treat failure as advisory.
    pub async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError> {
        let request = ApiRequest::post(self.path("logout")).bearer(access_token.map(str::to_string));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(Self::network_error)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(Self::server_error(&response))
        }
    }

    /// Exchange a refresh token. Every failure, network included, is a
    /// `RefreshFailed`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let request = ApiRequest::post(self.path("refresh"))
            .json(&RefreshRequest { refresh_token })
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::RefreshFailed(format!(
                "backend answered {}",
                response.status
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        Ok(parsed.into_pair().0)
    }

    /// Whether the backend still accepts `access_token`. Never fails.
    pub async fn check_auth(&self, access_token: &str) -> bool {
        let request = ApiRequest::get(self.path("check")).bearer(Some(access_token.to_string()));
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                debug!(status = response.status.as_u16(), "Stored token rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Auth check failed");
                false
            }
        }
    }

    pub async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        let request = ApiRequest::get(self.path("me")).bearer(Some(access_token.to_string()));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(Self::network_error)?;
        if !response.is_success() {
            return Err(Self::server_error(&response));
        }
        response.json().map_err(|e| AuthError::Server {
            status: response.status.as_u16(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{json_response, StubTransport};

    fn client(stub: &Arc<StubTransport>) -> AuthClient {
        AuthClient::new(stub.clone(), "/auth/")
    }

    #[tokio::test]
    async fn test_login_parses_tokens_and_user() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.path, "/auth/login");
            Ok(json_response(
                200,
                r#"{"token":"a.b.c","refreshToken":"r1","user":{"id":1,"username":"alice","language":"et","is_local_auth":true}}"#,
            ))
        });
        let outcome = client(&stub).login("alice", "secret").await.unwrap();
        assert_eq!(outcome.tokens.access_token, "a.b.c");
        assert_eq!(outcome.tokens.refresh_token.as_deref(), Some("r1"));
        assert_eq!(outcome.user.map(|u| u.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_login_unauthorized_is_invalid_credentials() {
        let stub = StubTransport::new(|_| Ok(json_response(401, r#"{"detail":"bad"}"#)));
        let err = client(&stub).login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_other_failures() {
        let stub = StubTransport::new(|_| Ok(json_response(503, "down")));
        let err = client(&stub).login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Server { status: 503, .. }));

        let stub = StubTransport::new(|_| Err(ApiError::NetworkError("refused".into())));
        let err = client(&stub).login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
    }

    #[tokio::test]
    async fn test_refresh_failures_are_all_refresh_failed() {
        let stub = StubTransport::new(|_| Ok(json_response(500, "boom")));
        assert!(matches!(
            client(&stub).refresh("r1").await,
            Err(AuthError::RefreshFailed(_))
        ));

        let stub = StubTransport::new(|_| Err(ApiError::NetworkError("reset".into())));
        assert!(matches!(
            client(&stub).refresh("r1").await,
            Err(AuthError::RefreshFailed(_))
        ));

        let stub = StubTransport::new(|_| Ok(json_response(200, "{}")));
        assert!(matches!(
            client(&stub).refresh("r1").await,
            Err(AuthError::RefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_token() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.path, "/auth/refresh");
            match &req.body {
                crate::api::RequestBody::Json(v) => assert_eq!(v["refreshToken"], "r1"),
                other => panic!("unexpected body {other:?}"),
            }
            Ok(json_response(200, r#"{"token":"new.tok.en"}"#))
        });
        let pair = client(&stub).refresh("r1").await.unwrap();
        assert_eq!(pair.access_token, "new.tok.en");
        assert_eq!(pair.refresh_token, None);
    }

    #[tokio::test]
    async fn test_check_auth_never_errors() {
        let stub = StubTransport::new(|req| {
            assert_eq!(req.bearer.as_deref(), Some("tok"));
            Ok(json_response(200, "{}"))
        });
        assert!(client(&stub).check_auth("tok").await);

        let stub = StubTransport::new(|_| Ok(json_response(401, "")));
        assert!(!client(&stub).check_auth("tok").await);

        let stub = StubTransport::new(|_| Err(ApiError::NetworkError("offline".into())));
        assert!(!client(&stub).check_auth("tok").await);
    }
}
