//! Periodic access token expiry check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::events::{SessionEvent, TerminationReason};
use super::session::SessionCore;
use super::token::{expiry_status, ExpiryStatus};

/// Result of a single monitor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// No active session; nothing was checked.
    Idle,
    Healthy { expires_at: DateTime<Utc> },
    ExpiringSoon { expires_at: DateTime<Utc> },
    Terminated(TerminationReason),
}

pub struct SessionMonitor {
    core: Arc<SessionCore>,
}

impl SessionMonitor {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Run one check against the stored access token.
    pub fn tick(&self) -> MonitorOutcome {
        if !self.core.is_authenticated() {
            return MonitorOutcome::Idle;
        }

        let now = self.core.clock.now();
        let token = self.core.access_token();
        match expiry_status(token.as_deref(), now, self.core.options.warning_window) {
            ExpiryStatus::Valid { expires_at } => MonitorOutcome::Healthy { expires_at },
            ExpiryStatus::ExpiringSoon { expires_at } => {
                let remaining = (expires_at - now).num_seconds();
                info!(remaining_secs = remaining, "Session expiring soon");
                self.core.emit(SessionEvent::ExpiringSoon { expires_at });
                MonitorOutcome::ExpiringSoon { expires_at }
            }
            ExpiryStatus::Expired(reason) => {
                self.core.terminate(reason);
                MonitorOutcome::Terminated(reason)
            }
        }
    }

    /// Run [`tick`](Self::tick) every `period`, starting one period from now.
    ///
    /// The task holds only a weak reference to the session and exits once
    /// the session it was started for is gone.
    pub(crate) fn spawn(self, period: Duration) -> MonitorHandle {
        let generation = self.core.generation();
        let core = Arc::downgrade(&self.core);
        drop(self);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(core) = core.upgrade() else { break };
                if core.generation() != generation {
                    break;
                }
                match SessionMonitor::new(core).tick() {
                    MonitorOutcome::Idle | MonitorOutcome::Terminated(_) => break,
                    MonitorOutcome::Healthy { .. } | MonitorOutcome::ExpiringSoon { .. } => {}
                }
            }
            debug!(generation, "Session monitor stopped");
        });

        MonitorHandle { task }
    }
}

/// Running monitor task. Dropping the handle stops the task.
pub(crate) struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn stop(self) {
        self.task.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, SessionController, SessionOptions, TokenStore};
    use crate::clock::ManualClock;
    use crate::test_support::{drain_events, json_response, token_expiring_at, StubTransport};

    const TOKEN_KEY: &str = "lible_token";

    struct Harness {
        controller: SessionController,
        store: Arc<MemoryTokenStore>,
        clock: Arc<ManualClock>,
        start: DateTime<Utc>,
    }

    /// Logged-in session whose token expires an hour after `start`.
    async fn logged_in() -> Harness {
        let start = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        let token = token_expiring_at(start.timestamp() + 3600);
        let body = format!(r#"{{"token":"{}","refreshToken":"r1","user":null}}"#, token);
        let stub = StubTransport::new(move |req| match req.path.as_str() {
            "/auth/login" => Ok(json_response(200, &body)),
            _ => Ok(json_response(
                200,
                r#"{"id":1,"username":"alice","language":"et","is_local_auth":true}"#,
            )),
        });
        let store = Arc::new(MemoryTokenStore::default());
        let clock = Arc::new(ManualClock::new(start));
        let controller =
            SessionController::new(SessionOptions::default(), store.clone(), stub, clock.clone());
        controller.login("alice", "secret").await.unwrap();
        Harness {
            controller,
            store,
            clock,
            start,
        }
    }

    #[tokio::test]
    async fn test_hour_long_token_minute_by_minute() {
        let h = logged_in().await;
        let mut events = h.controller.subscribe();
        let monitor = h.controller.monitor();

        let mut outcomes = Vec::new();
        for minute in 0..=65 {
            h.clock.set(h.start + chrono::Duration::minutes(minute));
            outcomes.push(monitor.tick());
        }

        // Ticks 1..=55 are quiet
        assert!(outcomes[..55]
            .iter()
            .all(|o| matches!(o, MonitorOutcome::Healthy { .. })));
        // Tick 56 warns and the session stays up until tick 61
        assert!(outcomes[55..60]
            .iter()
            .all(|o| matches!(o, MonitorOutcome::ExpiringSoon { .. })));
        assert_eq!(
            outcomes[60],
            MonitorOutcome::Terminated(TerminationReason::TokenExpired)
        );
        assert!(outcomes[61..].iter().all(|o| *o == MonitorOutcome::Idle));

        let events = drain_events(&mut events);
        let warnings = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ExpiringSoon { .. }))
            .count();
        assert_eq!(warnings, 5);
        assert_eq!(
            events[5..],
            [
                SessionEvent::Expired { reason: TerminationReason::TokenExpired },
                SessionEvent::LoginRequired,
            ]
        );
        assert!(!h.controller.is_authenticated());
        assert_eq!(h.store.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_warning_keeps_session() {
        let h = logged_in().await;
        h.clock.set(h.start + chrono::Duration::minutes(58));
        assert!(matches!(
            h.controller.monitor().tick(),
            MonitorOutcome::ExpiringSoon { .. }
        ));
        assert!(h.controller.is_authenticated());
        assert!(h.store.get(TOKEN_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_and_malformed_tokens_fail_closed() {
        let h = logged_in().await;
        h.store.clear(TOKEN_KEY).unwrap();
        assert_eq!(
            h.controller.monitor().tick(),
            MonitorOutcome::Terminated(TerminationReason::TokenMissing)
        );

        let h = logged_in().await;
        h.store.set(TOKEN_KEY, "not-a-jwt").unwrap();
        assert_eq!(
            h.controller.monitor().tick(),
            MonitorOutcome::Terminated(TerminationReason::TokenMalformed)
        );
        assert!(!h.controller.is_authenticated());
    }

    #[tokio::test]
    async fn test_idle_without_session() {
        let stub = StubTransport::new(|_| panic!("no request expected"));
        let controller = SessionController::new(
            SessionOptions::default(),
            Arc::new(MemoryTokenStore::default()),
            stub,
            Arc::new(ManualClock::new(Utc::now())),
        );
        let mut events = controller.subscribe();
        assert_eq!(controller.monitor().tick(), MonitorOutcome::Idle);
        assert!(drain_events(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_ends_expired_session() {
        let h = logged_in().await;
        let mut events = h.controller.subscribe();
        h.clock.set(h.start + chrono::Duration::minutes(61));

        // First check runs one interval after login
        time::sleep(Duration::from_secs(59)).await;
        assert!(h.controller.is_authenticated());

        time::sleep(Duration::from_secs(2)).await;
        assert!(!h.controller.is_authenticated());
        assert_eq!(
            drain_events(&mut events),
            vec![
                SessionEvent::Expired { reason: TerminationReason::TokenExpired },
                SessionEvent::LoginRequired,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_logout() {
        let h = logged_in().await;
        h.controller.logout().await;
        let mut events = h.controller.subscribe();

        h.clock.set(h.start + chrono::Duration::hours(2));
        time::sleep(Duration::from_secs(300)).await;
        assert!(drain_events(&mut events).is_empty());
    }
}
