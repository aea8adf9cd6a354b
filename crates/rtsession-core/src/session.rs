//! Server-issued session tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed header segment for issued tokens.
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token parse error.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is empty")]
    Empty,
    #[error("Token must have three segments, found {0}")]
    Malformed(usize),
    #[error("Token claims are not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Token claims are not valid JSON: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Claims carried in the middle token segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    uid: String,
    #[serde(default)]
    han: String,
    exp: i64,
}

/// Authenticated session issued by the backend.
///
/// Consumers only ever see clones; the session manager owns the live one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    user_id: String,
    handle: String,
    /// Expiry timestamp (Unix epoch seconds).
    expires_at: i64,
}

impl Session {
    /// Rebuild a session from a serialised token.
    ///
    /// # Errors
    /// Returns error if the token is not a `header.claims.signature` triple
    /// with base64url JSON claims.
    pub fn restore(token: &str) -> Result<Self, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::Malformed(segments.len()));
        }

        let raw = BASE64.decode(segments[1])?;
        let claims: Claims = serde_json::from_slice(&raw)?;

        Ok(Self {
            token: token.to_string(),
            user_id: claims.uid,
            handle: claims.han,
            expires_at: claims.exp,
        })
    }

    /// Issue a session with a freshly encoded token.
    ///
    /// The signature segment is not verified client side, so an opaque
    /// placeholder is written.
    #[must_use]
    pub fn issue(user_id: impl Into<String>, handle: impl Into<String>, expires_at: i64) -> Self {
        let claims = Claims {
            uid: user_id.into(),
            han: handle.into(),
            exp: expires_at,
        };
        // Serialising a struct of strings and an integer cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let token = format!(
            "{}.{}.{}",
            BASE64.encode(TOKEN_HEADER),
            BASE64.encode(payload),
            BASE64.encode(claims.uid.as_bytes()),
        );

        Self {
            token,
            user_id: claims.uid,
            handle: claims.han,
            expires_at,
        }
    }

    /// Raw token, suitable for persisting.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether the session is expired at `now` (Unix epoch seconds).
    #[must_use]
    pub const fn has_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Current time in Unix epoch seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
