use serde::{de, Deserialize, Deserializer, Serialize};

use crate::auth::expiry;
use crate::auth::SessionRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// Some deployments send numeric user ids.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
}

/// Body returned by login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl AuthResponse {
    pub fn to_record(&self, now: i64) -> SessionRecord {
        SessionRecord::new(
            self.token.clone(),
            self.user.id.clone(),
            self.user.email.clone(),
            self.user.full_name.clone(),
            match self.expires_at.as_deref() {
                Some(text) => expiry::parse_expiry(text, now),
                None => expiry::fallback_expiry(now),
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_parses() {
        let body = r#"{
            "token": "eyJ.abc",
            "user": {"id": "7", "email": "a@b.ch", "full_name": null,
                     "created_at": "2024-01-01T00:00:00", "email_verified": true},
            "expires_at": "2024-01-08T00:00:00"
        }"#;
        let response: AuthResponse = serde_json::from_str(body).unwrap();
        let record = response.to_record(0);
        assert_eq!(record.token, "eyJ.abc");
        assert_eq!(record.user_id, "7");
        assert!(record.display_name.is_none());
        assert_eq!(record.expires_at, 1_704_672_000_000);
    }

    #[test]
    fn test_auth_response_without_expiry_gets_fallback() {
        let now = 1_700_000_000_000;
        let response: AuthResponse =
            serde_json::from_str(r#"{"token":"jwt","user":{"id":"1","email":"a@b.ch"}}"#).unwrap();
        assert!(response.expires_at.is_none());

        let record = response.to_record(now);
        assert_eq!(record.expires_at, now + 7 * 24 * 3_600_000);
        assert!(record.validate().is_ok());
        assert!(!record.is_expired(now));
    }

    #[test]
    fn test_auth_response_null_expiry_gets_fallback() {
        let response: AuthResponse = serde_json::from_str(
            r#"{"token":"jwt","user":{"id":"1","email":"a@b.ch"},"expires_at":null}"#,
        )
        .unwrap();
        assert_eq!(response.to_record(0).expires_at, 7 * 24 * 3_600_000);
    }

    #[test]
    fn test_user_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id":"1","email":"x@y.z"}"#).unwrap();
        assert!(!user.email_verified);
        assert!(user.full_name.is_none());
    }

    #[test]
    fn test_numeric_user_id() {
        let user: User = serde_json::from_str(r#"{"id":12,"email":"x@y.z"}"#).unwrap();
        assert_eq!(user.id, "12");
        assert!(serde_json::from_str::<User>(r#"{"id":true,"email":"x@y.z"}"#).is_err());
    }
}
