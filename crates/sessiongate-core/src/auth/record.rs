use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::SessionError;
use super::expiry;

/// Persisted bundle of bearer token, cached identity and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Epoch millis; 0 means no known expiry.
    #[serde(default)]
    pub expires_at: i64,
}

impl SessionRecord {
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        email: impl Into<String>,
        display_name: Option<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            email: email.into(),
            display_name,
            expires_at,
        }
    }

    /// Reject records that were only partially written.
    pub fn validate(&self) -> Result<(), SessionError> {
        let missing = if self.token.is_empty() {
            "token"
        } else if self.user_id.is_empty() {
            "userId"
        } else if self.email.is_empty() {
            "email"
        } else {
            return Ok(());
        };
        Err(SessionError::MalformedRecord(format!("missing {}", missing)))
    }

    pub fn has_expiry(&self) -> bool {
        self.expires_at != 0
    }

    pub fn is_expired(&self, now: i64) -> bool {
        expiry::is_expired(self.expires_at, now)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        if self.has_expiry() {
            DateTime::from_timestamp_millis(self.expires_at)
        } else {
            None
        }
    }

    pub fn time_until_expiry(&self, now: i64) -> Option<Duration> {
        self.has_expiry()
            .then(|| Duration::milliseconds(self.expires_at.saturating_sub(now)))
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: i64) -> Option<i64> {
        self.time_until_expiry(now).map(|d| d.num_minutes().max(0))
    }

    pub fn bearer_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Name to show in the UI, falling back to the email address.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email)
    }
}
