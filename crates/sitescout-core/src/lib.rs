//! Core library for sitescout.
//!
//! This crate holds everything the front ends share:
//! - `auth`: token storage, identity decoding, the session controller and the route guard
//! - `api`: the REST client for the site-selection backend
//! - `models`: request/response types exchanged with the backend
//! - `routes`: the application's route table
//! - `config`: persisted application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod routes;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, GuardDecision, SessionController, SessionState};
pub use config::Config;
pub use routes::Route;
