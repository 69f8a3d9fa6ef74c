//! Client core for the Lible school bell console.
//!
//! Owns the authentication session (token storage, expiry monitoring,
//! refresh-and-retry of rejected requests) and a typed client for the
//! timetable, template, sound and holiday resources.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, SessionController, SessionEvent, TerminationReason};
pub use config::Config;
