//! Core abstractions for realtime client sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` - Server-issued token with identity and expiry
//! - `DispatchQueue` - Hand-off from network tasks to the host loop
//! - `EventHub` - Broadcast of session lifecycle events
//! - `ClientConfig` - Connection and reconnect settings
//! - Backend and token store traits

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod event;
#[cfg(feature = "loopback")]
pub mod loopback;
pub mod message;
pub mod session;
pub mod traits;

pub use auth::AuthRequest;
pub use config::ClientConfig;
pub use dispatch::{DispatchQueue, PendingAction};
pub use event::{EventHub, SessionEvent, TerminalReason};
pub use session::Session;
pub use traits::{Backend, BackendError, BackendEvent, ErrorCode, TokenStore};
