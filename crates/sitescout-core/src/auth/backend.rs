use std::future::Future;

use crate::api::{ApiClient, ApiError};
use crate::models::{AuthResponse, Credentials, Registration};

/// The network half of login and registration.
///
/// `ApiClient` is the production implementation; the session controller only
/// sees this trait so it can be driven without a server.
pub trait AuthBackend: Send + Sync {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthResponse, ApiError>> + Send;

    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl AuthBackend for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.authenticate(&credentials.username, &credentials.password)
            .await
    }

    async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.create_account(registration).await
    }
}
