//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::{broadcast, Notify};

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::auth::SessionEvent;

/// A JWT-shaped token whose payload is `payload` verbatim.
pub fn token_with_payload(payload: &str) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.as_bytes())
    )
}

pub fn token_expiring_at(exp: i64) -> String {
    token_with_payload(&format!(r#"{{"sub":"alice","exp":{}}}"#, exp))
}

pub fn json_response(status: u16, body: &str) -> ApiResponse {
    let status = StatusCode::from_u16(status).expect("valid status code");
    ApiResponse::new(status, body)
}

/// Everything received so far, without waiting.
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// Scripted backend. Records every request and answers through `handler`
/// after yielding once, so concurrent callers interleave like real I/O.
pub struct StubTransport {
    handler: Handler,
    calls: Mutex<Vec<ApiRequest>>,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
}

impl StubTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
        })
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|r| r.path == path).count()
    }

    /// Requests to `path` wait until the returned `Notify` is signalled.
    pub fn hold(&self, path: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.holds.lock().insert(path.to_string(), gate.clone());
        gate
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.calls.lock().push(request.clone());
        let gate = self.holds.lock().get(&request.path).cloned();
        match gate {
            Some(gate) => gate.notified().await,
            None => tokio::task::yield_now().await,
        }
        (self.handler)(&request)
    }
}
