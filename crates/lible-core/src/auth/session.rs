//! Session lifecycle management.
//!
//! `SessionController` is the single owner of authentication state. It is
//! built once at startup and handed to whatever needs it; the request
//! authorizer and the session monitor share its inner [`SessionCore`].
//!
//! Every state change happens under one short lock that is never held across
//! an `.await`. A generation counter is bumped whenever a session starts or
//! ends, so a token refresh that completes after a logout can tell that its
//! result no longer belongs to anyone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, ApiRequest, HttpTransport, RequestAuthorizer, Transport};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::models::User;

use super::client::{AuthClient, TokenPair};
use super::events::{SessionEvent, TerminationReason};
use super::monitor::{MonitorHandle, SessionMonitor};
use super::store::{open_token_store, StoreError, TokenStore};
use super::token::expiry_of;
use super::AuthError;

/// Buffer size for the session event channel.
/// Slow subscribers lag rather than block the session.
const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub token_key: String,
    pub refresh_token_key: String,
    pub auth_prefix: String,
    pub monitor_interval: Duration,
    pub warning_window: chrono::Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Config::default().session_options()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    generation: u64,
}

pub(crate) struct SessionCore {
    pub(crate) options: SessionOptions,
    pub(crate) client: AuthClient,
    pub(crate) clock: Arc<dyn Clock>,
    store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    // Serializes refreshes so concurrent 401s share one
    refresh_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl SessionCore {
    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, key, "Failed to read token store");
                None
            }
        }
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.read(&self.options.token_key)
    }

    fn refresh_token(&self) -> Option<String> {
        self.read(&self.options.refresh_token_key)
    }

    fn write_tokens(&self, tokens: &TokenPair, replace_refresh: bool) -> Result<(), StoreError> {
        self.store.set(&self.options.token_key, &tokens.access_token)?;
        match tokens.refresh_token {
            Some(ref refresh) => self.store.set(&self.options.refresh_token_key, refresh)?,
            None if replace_refresh => self.store.clear(&self.options.refresh_token_key)?,
            None => {}
        }
        Ok(())
    }

    fn clear_tokens(&self) {
        for key in [&self.options.token_key, &self.options.refresh_token_key] {
            if let Err(e) = self.store.clear(key) {
                warn!(error = %e, key = %key, "Failed to clear token");
            }
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Persist fresh login tokens and start a new session generation.
    fn establish(self: &Arc<Self>, tokens: &TokenPair) -> Result<(), AuthError> {
        {
            let mut state = self.state.lock();
            if let Err(e) = self.write_tokens(tokens, true) {
                self.clear_tokens();
                return Err(e.into());
            }
            state.authenticated = true;
            state.generation += 1;
        }
        self.start_monitor();
        Ok(())
    }

    /// Accept the tokens already in the store as a live session.
    fn activate(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.authenticated = true;
            state.generation += 1;
        }
        self.start_monitor();
    }

    /// End the session without notifying anyone. Returns the access token
    /// that was current, for the server-side logout call.
    fn teardown(&self) -> Option<String> {
        let token = {
            let mut state = self.state.lock();
            state.authenticated = false;
            state.generation += 1;
            let token = self.access_token();
            self.clear_tokens();
            token
        };
        self.stop_monitor();
        token
    }

    /// Forced end of session: clear tokens, stop the monitor, and tell the
    /// front end to go back to login.
    ///
    /// Safe to call any number of times; only the call that actually ends a
    /// session emits events. Returns whether this call did so.
    pub(crate) fn terminate(&self, reason: TerminationReason) -> bool {
        let ended_session = {
            let mut state = self.state.lock();
            let had_token = self.access_token().is_some();
            let was_authenticated = std::mem::replace(&mut state.authenticated, false);
            state.generation += 1;
            self.clear_tokens();
            was_authenticated || had_token
        };
        self.stop_monitor();

        if ended_session {
            info!(%reason, "Session terminated");
            self.emit(SessionEvent::Expired { reason });
            self.emit(SessionEvent::LoginRequired);
        } else {
            debug!(%reason, "Session already ended");
        }
        ended_session
    }

    /// Obtain a new access token after a request sent with `sent_with` was
    /// rejected.
    ///
    /// If another request already rotated the token while this one waited
    /// for the gate, returns immediately so the caller retries with the new
    /// token.
    pub(crate) async fn refresh_after_unauthorized(
        self: &Arc<Self>,
        sent_with: Option<&str>,
    ) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let generation = self.generation();
        let current = self.access_token();
        if current.is_some() && current.as_deref() != sent_with {
            debug!("Access token already rotated, skipping refresh");
            return Ok(());
        }

        let refresh_token = self
            .refresh_token()
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token stored".to_string()))?;
        let tokens = self.client.refresh(&refresh_token).await?;

        let newly_authenticated = {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!("Discarding refresh that completed after session teardown");
                return Err(AuthError::SessionEnded);
            }
            self.write_tokens(&tokens, false)?;
            !std::mem::replace(&mut state.authenticated, true)
        };
        if newly_authenticated {
            self.start_monitor();
        }

        info!(token_len = tokens.access_token.len(), "Access token refreshed");
        Ok(())
    }

    fn start_monitor(self: &Arc<Self>) {
        let handle = SessionMonitor::new(Arc::clone(self)).spawn(self.options.monitor_interval);
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.stop();
        }
    }

    fn stop_monitor(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.stop();
        }
    }
}

/// Owns the authentication session and exposes it to the rest of the app.
pub struct SessionController {
    core: Arc<SessionCore>,
    transport: Arc<dyn Transport>,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = SessionCore {
            client: AuthClient::new(Arc::clone(&transport), &options.auth_prefix),
            options,
            clock,
            store,
            state: Mutex::new(SessionState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
            events,
            monitor: Mutex::new(None),
        };
        Self {
            core: Arc::new(core),
            transport,
        }
    }

    /// Build a controller talking HTTP to the configured backend.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.api_base_url, config.request_timeout())
            .context("Failed to create HTTP client")?;
        let store = open_token_store(config.token_store, &config.cache_dir()?);
        Ok(Self::new(
            config.session_options(),
            store,
            Arc::new(transport),
            Arc::new(SystemClock),
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        self.core.is_authenticated()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.events.subscribe()
    }

    pub fn has_stored_token(&self) -> bool {
        self.core.access_token().is_some()
    }

    /// Expiry of the stored access token.
    pub fn token_expiry(&self) -> Result<DateTime<Utc>, AuthError> {
        let token = self.core.access_token().ok_or(AuthError::NotAuthenticated)?;
        Ok(expiry_of(&token)?)
    }

    /// Log in and start a session. The token store is left untouched on
    /// failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        info!(username, "Logging in");
        let outcome = match self.core.client.login(username, password).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };
        self.core.establish(&outcome.tokens)?;

        let user = match outcome.user {
            Some(user) => Some(user),
            None => match self.core.client.current_user(&outcome.tokens.access_token).await {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Could not load user profile after login");
                    None
                }
            },
        };

        self.core.emit(SessionEvent::LoggedIn {
            username: username.to_string(),
        });
        info!("Login successful");
        Ok(user)
    }

    /// End the session. Local state is always cleared, whatever the server
    /// says.
    pub async fn logout(&self) {
        info!("Logging out");
        let token = self.core.teardown();

        if let Some(token) = token {
            if let Err(e) = self.core.client.logout(Some(&token)).await {
                warn!(error = %e, "Server logout failed, local session cleared anyway");
            }
        }

        // A refresh may have slipped in while the logout call was in flight
        self.core.clear_tokens();
        self.core.emit(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    /// Startup validation of a stored token. Clears the store if the backend
    /// rejects it or cannot be reached.
    pub async fn check_auth(&self) -> bool {
        let Some(token) = self.core.access_token() else {
            debug!("No stored token, skipping auth check");
            return false;
        };

        if self.core.client.check_auth(&token).await {
            self.core.activate();
            info!("Stored session is valid");
            true
        } else {
            info!("Stored session rejected, clearing tokens");
            self.core.teardown();
            false
        }
    }

    /// Profile of the logged-in user. Sent through the authorizer like any
    /// resource call, so a stale access token is refreshed first.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        if self.core.access_token().is_none() {
            return Err(ApiError::Unauthorized);
        }
        let request = ApiRequest::get(self.core.client.path("me"));
        self.authorizer().send(request).await?.into_result()?.json()
    }

    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor::new(Arc::clone(&self.core))
    }

    pub fn authorizer(&self) -> RequestAuthorizer {
        RequestAuthorizer::new(Arc::clone(&self.transport), Arc::clone(&self.core))
    }

    /// Resource client whose requests carry the session's bearer token.
    pub fn api(&self) -> ApiClient {
        ApiClient::new(Arc::new(self.authorizer()))
    }
}
