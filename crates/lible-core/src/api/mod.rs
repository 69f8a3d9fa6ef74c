//! REST API layer for the bell-schedule backend.
//!
//! Requests are described as [`ApiRequest`] values and sent through a
//! [`Transport`]. [`HttpTransport`] does the actual HTTP;
//! [`RequestAuthorizer`] wraps it to attach the session's bearer token and
//! refresh it once on 401. [`ApiClient`] offers typed calls for each
//! resource on top of either.

pub mod authorizer;
pub mod client;
pub mod error;
pub mod transport;

pub use authorizer::RequestAuthorizer;
pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{
    ApiRequest, ApiResponse, FilePart, HttpTransport, MultipartForm, RequestBody, Transport,
};
