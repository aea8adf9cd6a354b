//! Chat demo against the in-process loopback backend.
//!
//! Run with: cargo run -p chat-demo
//!
//! Connects with a persisted device id, joins the default room, posts auto
//! messages, then drops the connection to show the reconnect path before
//! disconnecting for good.

use std::{sync::Arc, time::Duration};

use rtsession_core::{AuthRequest, ClientConfig, SessionEvent, loopback::LoopbackBackend};
use rtsession_manager::{SessionManager, storage::MemoryTokenStore};
use rtsession_social::{ChatRoom, SocialDirectory, chat::DEFAULT_ROOM};
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Host loop frame time.
const TICK: Duration = Duration::from_millis(16);

/// How long to chat before simulating a network drop.
const CHAT_BEFORE_DROP: Duration = Duration::from_secs(5);

/// How long to chat after the reconnect before leaving.
const CHAT_AFTER_RECONNECT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    tracing::info!(endpoint = %config.endpoint(), "Starting chat demo");

    let (backend, backend_events) = LoopbackBackend::new();
    let backend = Arc::new(backend);
    backend.add_account("friend-device", "friend");

    let manager = SessionManager::new(Arc::clone(&backend), MemoryTokenStore::new(), config);
    let pump = manager.attach(backend_events);

    let room = ChatRoom::new(Arc::clone(&backend), DEFAULT_ROOM);
    let follower = room.follow(manager.subscribe());
    let directory = SocialDirectory::new(Arc::clone(&backend));
    let mut lifecycle = manager.subscribe();

    let device_id = manager.device_id().await?;
    manager
        .connect(AuthRequest::device(device_id).with_username("mycustomusername"))
        .await?;

    let mut ticker = tokio::time::interval(TICK);
    let mut connections = 0;
    let mut connected_at = Instant::now();
    let mut dropped = false;

    loop {
        ticker.tick().await;
        manager.drain_queue();

        while let Ok(event) = lifecycle.try_recv() {
            match event {
                SessionEvent::Connected { session } => {
                    connections += 1;
                    connected_at = Instant::now();
                    tracing::info!(handle = session.handle(), connections, "Connected");

                    let info = directory.self_fetch().await?;
                    tracing::info!(id = %info.id, handle = %info.handle, "Self info");
                }
                SessionEvent::Reconnecting { attempt, delay_ms } => {
                    tracing::info!(attempt, delay_ms, "Reconnecting");
                }
                SessionEvent::Disconnected { reason } => {
                    tracing::info!(?reason, "Session ended");
                    for message in room.messages() {
                        tracing::info!(user_id = %message.user_id, "{}", message.content);
                    }
                    pump.abort();
                    follower.abort();
                    return Ok(());
                }
                SessionEvent::Error { error } => {
                    tracing::warn!(code = %error.code, "{}", error.message);
                }
                SessionEvent::Presence { .. } | SessionEvent::Message { .. } => {}
            }
        }

        if connections == 0 {
            continue;
        }

        if room.is_joined() && !room.is_auto_messaging() && !dropped {
            room.toggle_auto_messages();
        }

        let elapsed = connected_at.elapsed();
        if connections == 1 && !dropped && elapsed >= CHAT_BEFORE_DROP {
            tracing::info!("Simulating network drop");
            dropped = true;
            backend.drop_connection();
        } else if connections > 1 && elapsed >= CHAT_AFTER_RECONNECT {
            manager.disconnect().await;
            // Keep draining until the terminal notification arrives.
            connections = 0;
        }
    }
}
