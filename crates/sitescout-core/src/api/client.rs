//! API client for the site-selection backend.
//!
//! This module provides the `ApiClient` struct for logging in, registering,
//! and making authenticated requests for profile, history and recommendations.

use std::time::Duration;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::models::{AuthResponse, JobHistory, Profile, ProjectRequirements, RecommendationResponse, Registration};

// ============================================================================
// Constants
// ============================================================================

/// Backend address used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// HTTP request timeout in seconds.
/// Recommendation requests run model inference server-side, so allow some slack.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Length of a backend job id (24 hex chars)
const JOB_ID_LENGTH: usize = 24;

/// API client for the site-selection backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Validate that a string looks like a backend job id (24 hex chars).
    pub fn is_valid_job_id(s: &str) -> bool {
        s.len() == JOB_ID_LENGTH && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    // ===== Authentication =====

    /// Exchange username and password for an access token
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/login"))
            .header(header::ACCEPT, "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;

        if let Some(ref kind) = auth.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                warn!(token_type = %kind, "Unexpected token type in login response");
            }
        }
        debug!(username = username, "Authentication request succeeded");
        Ok(auth)
    }

    /// Create an account. The response body is not needed.
    pub async fn create_account(&self, registration: &Registration) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(registration)
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Request plumbing =====

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send_with_retry<T, F>(&self, path: &str, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<reqwest::RequestBuilder, ApiError>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response.json().await.map_err(|e| {
                        ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(path = path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        self.send_with_retry(path, || Ok(self.client.get(&url).headers(self.auth_headers()?)))
            .await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        self.send_with_retry(path, || {
            Ok(self.client.post(&url).headers(self.auth_headers()?).json(body))
        })
        .await
    }

    // ===== Data Fetching Methods =====

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        self.get("/profile").await
    }

    /// Fetch past analyses, newest first
    pub async fn fetch_history(&self) -> Result<Vec<JobHistory>, ApiError> {
        self.get("/history").await
    }

    /// Fetch the recommendations for a past analysis
    pub async fn fetch_history_detail(&self, job_id: &str) -> Result<RecommendationResponse, ApiError> {
        if !Self::is_valid_job_id(job_id) {
            return Err(ApiError::InvalidRequest(format!("invalid job id: {}", job_id)));
        }
        self.get(&format!("/history/{}", job_id)).await
    }

    /// Run a new analysis
    pub async fn recommend_sites(&self, requirements: &ProjectRequirements) -> Result<RecommendationResponse, ApiError> {
        self.post("/recommend-sites", requirements).await
    }
}
