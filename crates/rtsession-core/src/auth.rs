//! Authentication requests sent on login and registration.

use serde::{Deserialize, Serialize};

/// Credentials used to log in or register with the backend.
///
/// The same request is reused for the register fallback and cached by the
/// session manager for re-authentication after expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthRequest {
    /// Device-bound identity.
    Device {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    /// Application-defined identity.
    Custom {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    /// Email and password.
    Email {
        email: String,
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
}

impl AuthRequest {
    /// Authenticate with a device id.
    #[must_use]
    pub fn device(id: impl Into<String>) -> Self {
        Self::Device {
            id: id.into(),
            username: None,
        }
    }

    /// Authenticate with a custom id.
    #[must_use]
    pub fn custom(id: impl Into<String>) -> Self {
        Self::Custom {
            id: id.into(),
            username: None,
        }
    }

    /// Authenticate with email and password.
    #[must_use]
    pub fn email(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Email {
            email: email.into(),
            password: password.into(),
            username: None,
        }
    }

    /// Set the username requested on registration.
    #[must_use]
    pub fn with_username(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Device { username, .. }
            | Self::Custom { username, .. }
            | Self::Email { username, .. } => *username = Some(name.into()),
        }
        self
    }

    /// Identity key the backend looks the account up by.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Device { id, .. } | Self::Custom { id, .. } => id,
            Self::Email { email, .. } => email,
        }
    }

    /// Requested username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Device { username, .. }
            | Self::Custom { username, .. }
            | Self::Email { username, .. } => username.as_deref(),
        }
    }

    /// Short name of the credential kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Device { .. } => "device",
            Self::Custom { .. } => "custom",
            Self::Email { .. } => "email",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let req = AuthRequest::device("dev-1").with_username("mycustomusername");
        assert_eq!(req.id(), "dev-1");
        assert_eq!(req.username(), Some("mycustomusername"));
        assert_eq!(req.kind(), "device");

        let req = AuthRequest::email("a@b.c", "secret");
        assert_eq!(req.id(), "a@b.c");
        assert_eq!(req.username(), None);
        assert_eq!(req.kind(), "email");
    }

    #[test]
    fn test_serialization_tag() {
        let json = serde_json::to_string(&AuthRequest::custom("c-1")).unwrap();
        assert!(json.contains(r#""type":"custom""#));
        assert!(!json.contains("username"));
    }
}
