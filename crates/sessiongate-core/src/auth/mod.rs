//! Authentication module for managing the saved session and the unlock gate.
//!
//! This module provides:
//! - `CredentialStore`: persisted token + identity with lazy expiry eviction
//! - `SessionGate`: process-lifetime flag set after a local presence check
//! - `SessionManager`: wires both to login, logout and lifecycle events
//! - `expiry`: pure expiry predicates and the clock abstraction
//!
//! The gate is never written to disk, so every new process starts locked.

pub mod credentials;
pub mod error;
pub mod expiry;
pub mod gate;
pub mod presence;
pub mod record;
pub mod session;

pub use credentials::CredentialStore;
pub use error::{SessionError, StorageError};
pub use expiry::{Clock, ManualClock, SystemClock, DEFAULT_EXPIRING_WINDOW};
pub use gate::{Gate, GateState, SessionGate};
pub use presence::{LocalPin, PresenceCapability, PresenceCheck, PresenceOutcome, PresenceRequest};
pub use record::SessionRecord;
pub use session::{LockPolicy, Route, SessionManager};
