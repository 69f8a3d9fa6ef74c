//! Authentication session lifecycle.
//!
//! - [`store`]: durable key-value storage for the access and refresh tokens
//! - [`token`]: reading the expiry out of an access token
//! - [`client`]: the backend's `/auth` endpoints
//! - [`monitor`]: periodic expiry check that ends stale sessions
//! - [`session`]: the controller tying the above together
//!
//! The request authorizer that refreshes tokens on 401 lives in
//! [`crate::api`] but shares the session core defined here.

pub mod client;
pub mod error;
pub mod events;
pub mod monitor;
pub mod session;
pub mod store;
pub mod token;

pub use client::{AuthClient, LoginOutcome, TokenPair};
pub use error::AuthError;
pub use events::{SessionEvent, TerminationReason};
pub use monitor::{MonitorOutcome, SessionMonitor};
pub use session::{SessionController, SessionOptions};
pub(crate) use session::SessionCore;
pub use store::{
    open_token_store, FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore,
};
pub use token::{expiry_of, expiry_status, ExpiryStatus, TokenError};
