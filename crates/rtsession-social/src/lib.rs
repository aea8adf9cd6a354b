//! Chat rooms and social graph operations over a realtime session.
//!
//! Provides:
//! - `ChatRoom` - Topic chat driven by session events
//! - `SocialDirectory` - Self info and friends list cache

pub mod chat;
pub mod friends;

pub use chat::ChatRoom;
pub use friends::SocialDirectory;

use rtsession_core::BackendError;

/// Social operation error.
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Room not joined")]
    NotJoined,
    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

/// Log a backend error the way every social call reports it.
fn log_error(err: &BackendError) {
    tracing::error!(code = %err.code, message = %err.message, "Error occurred");
}
