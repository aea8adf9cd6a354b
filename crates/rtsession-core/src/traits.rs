//! Collaborator traits for the realtime backend and token persistence.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AuthRequest, Session,
    message::{Request, Response, TopicMessage, UserPresence},
};

/// Backend error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unclassified failure.
    Unknown,
    /// No account exists for the supplied credentials.
    UserNotFound,
    /// Credentials rejected.
    Unauthorized,
    /// Account already exists (registration).
    UserExists,
    /// Malformed request.
    BadInput,
    /// Socket could not be established or was lost.
    Connection,
    /// Operation requires a connected session.
    NotConnected,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::UserNotFound => "user_not_found",
            Self::Unauthorized => "unauthorized",
            Self::UserExists => "user_exists",
            Self::BadInput => "bad_input",
            Self::Connection => "connection",
            Self::NotConnected => "not_connected",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("code '{code}' with '{message}'")]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_user_not_found(&self) -> bool {
        self.code == ErrorCode::UserNotFound
    }
}

/// Event pushed by the backend outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Socket closed, intentionally or not.
    Disconnected,
    /// Asynchronous error on the socket.
    Error(BackendError),
    /// Users joined or left a topic.
    Presence {
        topic: String,
        joins: Vec<UserPresence>,
        leaves: Vec<UserPresence>,
    },
    /// Chat message on a joined topic.
    Message(TopicMessage),
}

/// Trait for the realtime backend client.
///
/// Implementations deliver [`BackendEvent`]s on a channel handed to the
/// session manager; the methods here are the request/response round-trips.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Open the realtime socket for an authenticated session.
    async fn connect(&self, session: &Session) -> Result<(), BackendError>;

    /// Authenticate an existing account.
    async fn login(&self, request: &AuthRequest) -> Result<Session, BackendError>;

    /// Create an account and authenticate it.
    async fn register(&self, request: &AuthRequest) -> Result<Session, BackendError>;

    /// Close the socket. The backend still emits `BackendEvent::Disconnected`.
    async fn disconnect(&self);

    /// Send a request over the open socket.
    async fn send(&self, request: Request) -> Result<Response, BackendError>;
}

/// Token store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt store: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Internal(String),
}

/// Trait for small key/value persistence of tokens and ids.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Read a value.
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
