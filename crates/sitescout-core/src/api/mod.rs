//! REST API client module for the site-selection backend.
//!
//! This module provides the `ApiClient` for login, registration and the
//! authenticated profile, history and recommendation endpoints.
//!
//! Every authenticated request carries the session token as a bearer
//! credential; the token itself comes from the `SessionController`.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
