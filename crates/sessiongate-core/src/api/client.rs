//! Client for the backend's `auth/*` endpoints.
//!
//! Authenticated calls read their `Authorization` header from the
//! `CredentialStore` at call time, so an expired or cleared session is
//! never sent.

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::models::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest, User};
use super::ApiError;
use crate::auth::CredentialStore;

// ============================================================================
// Constants
// ============================================================================

/// Default backend API root.
pub const DEFAULT_API_BASE_URL: &str = "https://portfoliomanager.flowbiz.ai/api";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Authorization header for the current session. No usable session
    /// means the request is refused here rather than sent anonymously.
    pub fn auth_headers(store: &CredentialStore) -> Result<header::HeaderMap, ApiError> {
        let value = store.bearer_header_value().ok_or(ApiError::Unauthorized)?;
        let mut headers = header::HeaderMap::new();
        let mut value = header::HeaderValue::from_str(&value)
            .map_err(|_| ApiError::InvalidResponse("token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// Send a request, backing off on 429, and decode the JSON body.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| ApiError::InvalidResponse(format!("{} request cannot be retried", what)))?;
            let response = attempt.send().await?;
            let status = response.status();

            if status.is_success() {
                debug!(request = what, %status, "Request succeeded");
                return response
                    .json()
                    .await
                    .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", what, e)));
            }

            if status.as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(request = what, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_status(status, &body);
            debug!(request = what, %status, error = %err, "Request failed");
            return Err(err);
        }
    }

    // ===== Anonymous =====

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            email,
            password,
            full_name,
        };
        let request = self.client.post(self.url("auth/register")).json(&body);
        self.execute(request, "register").await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest { email, password };
        let request = self.client.post(self.url("auth/login")).json(&body);
        self.execute(request, "login").await
    }

    // ===== Authenticated =====

    /// Invalidate the token server-side. Callers clear the local session
    /// whatever the outcome.
    pub async fn logout(&self, store: &CredentialStore) -> Result<MessageResponse, ApiError> {
        let request = self
            .client
            .post(self.url("auth/logout"))
            .headers(Self::auth_headers(store)?);
        self.execute(request, "logout").await
    }

    pub async fn current_user(&self, store: &CredentialStore) -> Result<User, ApiError> {
        let request = self
            .client
            .get(self.url("auth/me"))
            .headers(Self::auth_headers(store)?);
        self.execute(request, "current user").await
    }

    pub async fn update_profile(
        &self,
        store: &CredentialStore,
        full_name: Option<&str>,
    ) -> Result<User, ApiError> {
        let mut request = self
            .client
            .put(self.url("auth/me"))
            .headers(Self::auth_headers(store)?);
        if let Some(name) = full_name {
            request = request.query(&[("full_name", name)]);
        }
        self.execute(request, "update profile").await
    }

    pub async fn change_password(
        &self,
        store: &CredentialStore,
        old_password: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let request = self
            .client
            .post(self.url("auth/change-password"))
            .headers(Self::auth_headers(store)?)
            .query(&[("old_password", old_password), ("new_password", new_password)]);
        self.execute(request, "change password").await
    }

    pub async fn delete_account(
        &self,
        store: &CredentialStore,
        password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let request = self
            .client
            .delete(self.url("auth/me"))
            .headers(Self::auth_headers(store)?)
            .query(&[("password", password)]);
        self.execute(request, "delete account").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionRecord;
    use crate::storage::MemoryBackend;

    #[test]
    fn test_url_joining() {
        let client = AuthClient::new("https://example.test/api/").unwrap();
        assert_eq!(client.base_url(), "https://example.test/api");
        assert_eq!(client.url("auth/login"), "https://example.test/api/auth/login");
        assert_eq!(client.url("/auth/me"), "https://example.test/api/auth/me");
    }

    #[test]
    fn test_auth_headers_from_store() {
        let store = CredentialStore::new(MemoryBackend::new());
        assert!(matches!(
            AuthClient::auth_headers(&store),
            Err(ApiError::Unauthorized)
        ));

        store
            .save(&SessionRecord::new("abc", "u1", "a@b.ch", None, 0))
            .unwrap();
        let headers = AuthClient::auth_headers(&store).unwrap();
        let value = headers.get(header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
        assert!(value.is_sensitive());
    }

    #[tokio::test]
    async fn test_no_session_refused_without_network() {
        // Unroutable base URL: reaching the network would fail differently.
        let client = AuthClient::new("http://127.0.0.1:9").unwrap();
        let store = CredentialStore::new(MemoryBackend::new());
        let err = client.current_user(&store).await.unwrap_err();
        assert!(err.is_unauthorized());
        let err = client.delete_account(&store, "pw").await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
