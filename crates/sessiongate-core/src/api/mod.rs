//! REST client for the backend's authentication endpoints.
//!
//! The backend issues a JWT on login/registration which the
//! `CredentialStore` persists; every authenticated call sends it back as a
//! bearer token. A 401 from any endpoint surfaces as
//! `ApiError::Unauthorized`, which `SessionManager::handle_api_error`
//! turns into a full logout.

pub mod client;
pub mod error;
pub mod models;

pub use client::{AuthClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use models::{AuthResponse, MessageResponse, User};
