//! Session lifecycle and token storage for realtime clients.
//!
//! Provides:
//! - `SessionManager` - Connect, restore and reconnect one session
//! - `ReconnectPolicy` - Linear backoff with a hard attempt cap
//! - Token store implementations (memory, file)

pub mod device;
pub mod manager;
pub mod reconnect;
pub mod storage;

pub use manager::{SessionError, SessionManager};
pub use reconnect::{DisconnectOutcome, ReconnectPolicy};
