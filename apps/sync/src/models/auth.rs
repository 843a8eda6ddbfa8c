use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const ID_TOKEN_KEY: &str = "idToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const TOKEN_TIMESTAMP_KEY: &str = "tokenTimestamp";

/// All keys of the auth-token namespace, in the order they are written.
pub const AUTH_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    ID_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
    TOKEN_TIMESTAMP_KEY,
];

/// Session tokens issued by the web app's identity provider.
/// Each field lives under its own store key rather than as one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub user: Value,
    #[serde(rename = "tokenTimestamp", with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn new(access_token: String, id_token: String, refresh_token: String, user: Value) -> Self {
        Self {
            access_token,
            id_token,
            refresh_token,
            user,
            issued_at: Utc::now(),
        }
    }

    /// Splits the tokens into `(key, value)` pairs for the store.
    pub fn to_entries(&self) -> Vec<(&'static str, Value)> {
        vec![
            (ACCESS_TOKEN_KEY, Value::String(self.access_token.clone())),
            (ID_TOKEN_KEY, Value::String(self.id_token.clone())),
            (REFRESH_TOKEN_KEY, Value::String(self.refresh_token.clone())),
            (USER_KEY, self.user.clone()),
            (
                TOKEN_TIMESTAMP_KEY,
                Value::from(self.issued_at.timestamp_millis()),
            ),
        ]
    }

    /// Reassembles tokens from stored values. Returns `None` unless every
    /// token string and the timestamp are present.
    pub fn from_entries(
        access_token: Option<Value>,
        id_token: Option<Value>,
        refresh_token: Option<Value>,
        user: Option<Value>,
        timestamp: Option<Value>,
    ) -> Option<Self> {
        let as_string = |v: Option<Value>| match v {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let millis = timestamp.as_ref().and_then(Value::as_i64)?;
        Some(Self {
            access_token: as_string(access_token)?,
            id_token: as_string(id_token)?,
            refresh_token: as_string(refresh_token)?,
            user: user.unwrap_or(Value::Null),
            issued_at: DateTime::from_timestamp_millis(millis)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_cover_every_auth_key() {
        let tokens = AuthTokens::new(
            "access".into(),
            "id".into(),
            "refresh".into(),
            json!({ "email": "a@example.com" }),
        );
        let keys: Vec<_> = tokens.to_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, AUTH_KEYS.to_vec());
    }

    #[test]
    fn test_from_entries_requires_token_strings() {
        let missing_refresh = AuthTokens::from_entries(
            Some(json!("access")),
            Some(json!("id")),
            None,
            Some(json!({})),
            Some(json!(1_700_000_000_000_i64)),
        );
        assert!(missing_refresh.is_none());

        let complete = AuthTokens::from_entries(
            Some(json!("access")),
            Some(json!("id")),
            Some(json!("refresh")),
            None,
            Some(json!(1_700_000_000_000_i64)),
        )
        .unwrap();
        assert_eq!(complete.access_token, "access");
        assert_eq!(complete.user, Value::Null);
        assert_eq!(complete.issued_at.timestamp_millis(), 1_700_000_000_000);
    }
}
