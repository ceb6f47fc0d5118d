//! Sessiongate core - client-side session lifecycle.
//!
//! A saved network session (bearer token, cached identity, expiry) lives in
//! the `CredentialStore`; a separate in-memory `SessionGate` records whether
//! this process has passed a local presence check since launch. The
//! `SessionManager` ties both to login, logout, 401 responses and process
//! teardown.

pub mod api;
pub mod auth;
pub mod config;
pub mod storage;

pub use api::{ApiError, AuthClient};
pub use auth::{
    CredentialStore, Gate, PresenceCheck, PresenceOutcome, PresenceRequest, Route, SessionError,
    SessionGate, SessionManager, SessionRecord,
};
pub use config::Config;
