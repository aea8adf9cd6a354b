//! Topic chat room driven by session events.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rtsession_core::{
    Backend, SessionEvent,
    message::{Request, Response, TopicMessage, UserPresence},
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::{Instant, interval_at},
};
use uuid::Uuid;

use crate::{SocialError, log_error};

/// Room joined when none is given.
pub const DEFAULT_ROOM: &str = "Topic1";

/// Sent once the room is joined.
pub const GREETING: &str = "Hello!";

/// Period of the auto-message ticker.
pub const AUTO_MESSAGE_PERIOD: Duration = Duration::from_millis(2000);

/// Content of each auto message.
pub const AUTO_MESSAGE_CONTENT: &str = "Sent automated message.";

const JOINED_TEXT: &str = "Joined the room.";
const LEFT_TEXT: &str = "Left the room.";

#[derive(Default)]
struct ChatState {
    topic: Option<String>,
    messages: Vec<TopicMessage>,
    auto_task: Option<JoinHandle<()>>,
}

struct Inner<B> {
    backend: Arc<B>,
    room: String,
    state: Mutex<ChatState>,
}

/// Chat room bound to one topic.
///
/// Cloning yields another handle to the same room.
pub struct ChatRoom<B: Backend> {
    inner: Arc<Inner<B>>,
}

impl<B: Backend> Clone for ChatRoom<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl<B: Backend> ChatRoom<B> {
    #[must_use]
    pub fn new(backend: Arc<B>, room: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                room: room.into(),
                state: Mutex::new(ChatState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn room(&self) -> &str {
        &self.inner.room
    }

    /// Topic id assigned on join.
    #[must_use]
    pub fn topic(&self) -> Option<String> {
        self.lock().topic.clone()
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.lock().topic.is_some()
    }

    /// Join the room.
    ///
    /// # Errors
    /// Returns error if the backend rejects the join.
    pub async fn join(&self) -> Result<UserPresence, SocialError> {
        let response = self
            .inner
            .backend
            .send(Request::TopicJoin {
                room: self.inner.room.clone(),
            })
            .await
            .map_err(|e| {
                log_error(&e);
                SocialError::Backend(e)
            })?;

        let Response::TopicJoined { topic, presence } = response else {
            return Err(SocialError::UnexpectedResponse("topic_join"));
        };
        tracing::info!(user_id = %presence.user_id, room = %self.inner.room, "User joined room");
        self.lock().topic = Some(topic);
        Ok(presence)
    }

    /// Post a message to the joined room. Returns the message id.
    ///
    /// # Errors
    /// Returns error if the room is not joined or the backend rejects the send.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<String, SocialError> {
        let topic = self.topic().ok_or(SocialError::NotJoined)?;
        let response = self
            .inner
            .backend
            .send(Request::TopicMessageSend {
                topic,
                content: content.into(),
            })
            .await
            .map_err(|e| {
                log_error(&e);
                SocialError::Backend(e)
            })?;

        match response {
            Response::MessageAck { message_id } => Ok(message_id),
            _ => Err(SocialError::UnexpectedResponse("topic_message_send")),
        }
    }

    /// Join the room and greet it.
    ///
    /// # Errors
    /// Returns error if the join or the greeting fails.
    pub async fn enter(&self) -> Result<(), SocialError> {
        self.join().await?;
        self.send_text(GREETING).await?;
        Ok(())
    }

    /// Record an incoming message.
    pub fn push_message(&self, message: TopicMessage) {
        self.lock().messages.push(message);
    }

    /// Record presence changes as synthetic chat lines.
    pub fn push_presence(&self, joins: &[UserPresence], leaves: &[UserPresence]) {
        let topic = self.topic().unwrap_or_else(|| self.inner.room.clone());
        let now = now_millis();
        let lines = joins
            .iter()
            .map(|p| (p, JOINED_TEXT))
            .chain(leaves.iter().map(|p| (p, LEFT_TEXT)))
            .map(|(presence, text)| TopicMessage {
                topic: topic.clone(),
                message_id: Uuid::new_v4().to_string(),
                user_id: presence.user_id.clone(),
                created_at: now,
                content: text.to_string(),
            });

        self.lock().messages.extend(lines);
    }

    /// Messages, newest first.
    #[must_use]
    pub fn messages(&self) -> Vec<TopicMessage> {
        let mut messages = self.lock().messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages
    }

    pub fn clear_messages(&self) {
        self.lock().messages.clear();
    }

    #[must_use]
    pub fn is_auto_messaging(&self) -> bool {
        self.lock().auto_task.is_some()
    }

    /// Post [`AUTO_MESSAGE_CONTENT`] every `period` until stopped.
    ///
    /// Returns false if the ticker was already running.
    pub fn start_auto_messages(&self, period: Duration) -> bool {
        let mut state = self.lock();
        if state.auto_task.is_some() {
            return false;
        }

        let room = self.clone();
        state.auto_task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                // Failures are already logged.
                let _ = room.send_text(AUTO_MESSAGE_CONTENT).await;
            }
        }));
        true
    }

    /// Stop the auto-message ticker. Returns false if it was not running.
    pub fn stop_auto_messages(&self) -> bool {
        let task = self.lock().auto_task.take();
        task.is_some_and(|task| {
            task.abort();
            true
        })
    }

    /// Flip the auto-message ticker. Returns whether it is now running.
    pub fn toggle_auto_messages(&self) -> bool {
        if self.stop_auto_messages() {
            false
        } else {
            self.start_auto_messages(AUTO_MESSAGE_PERIOD)
        }
    }

    /// Forget the joined topic and stop the ticker.
    pub fn on_connection_lost(&self) {
        self.stop_auto_messages();
        self.lock().topic = None;
    }

    /// Apply one session event.
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { session } => {
                tracing::info!(user_id = session.user_id(), "New session connected");
                if let Err(e) = self.enter().await {
                    tracing::warn!("Failed to enter room: {e}");
                }
            }
            SessionEvent::Disconnected { .. } | SessionEvent::Reconnecting { .. } => {
                self.on_connection_lost();
            }
            SessionEvent::Message { message } => self.push_message(message),
            SessionEvent::Presence { joins, leaves, .. } => self.push_presence(&joins, &leaves),
            SessionEvent::Error { .. } => {}
        }
    }

    /// Spawn a task applying every event from `events`.
    pub fn follow(&self, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let room = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => room.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Chat room lagged behind session events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use rtsession_core::{AuthRequest, BackendEvent, Session, loopback::LoopbackBackend};
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    async fn connected() -> (Arc<LoopbackBackend>, mpsc::UnboundedReceiver<BackendEvent>, Session) {
        let (backend, events) = LoopbackBackend::new();
        let session = assert_ok!(backend.register(&AuthRequest::device("dev-1")).await);
        assert_ok!(backend.connect(&session).await);
        (Arc::new(backend), events, session)
    }

    fn presence(user_id: &str) -> UserPresence {
        UserPresence {
            user_id: user_id.into(),
            session_id: "s".into(),
            handle: user_id.into(),
        }
    }

    #[tokio::test]
    async fn test_send_requires_join() {
        let (backend, _events, _) = connected().await;
        let room = ChatRoom::new(backend, DEFAULT_ROOM);

        assert!(matches!(
            assert_err!(room.send_text("early").await),
            SocialError::NotJoined
        ));

        assert_ok!(room.join().await);
        assert_eq!(room.topic().as_deref(), Some(DEFAULT_ROOM));
        assert_ok!(room.send_text("now").await);
    }

    #[tokio::test]
    async fn test_connected_event_joins_and_greets() {
        let (backend, mut events, session) = connected().await;
        let room = ChatRoom::new(Arc::clone(&backend), DEFAULT_ROOM);

        room.handle_event(SessionEvent::Connected { session }).await;
        assert!(room.is_joined());

        // Presence for our own join, then the echoed greeting.
        assert!(matches!(events.recv().await, Some(BackendEvent::Presence { .. })));
        match events.recv().await {
            Some(BackendEvent::Message(message)) => {
                assert_eq!(message.content, GREETING);
                room.handle_event(SessionEvent::Message { message }).await;
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(room.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_presence_lines_and_ordering() {
        let (backend, _events, _) = connected().await;
        let room = ChatRoom::new(backend, DEFAULT_ROOM);

        room.push_message(TopicMessage {
            topic: DEFAULT_ROOM.into(),
            message_id: "old".into(),
            user_id: "u-0".into(),
            created_at: 1,
            content: "first".into(),
        });
        room.push_presence(&[presence("u-1")], &[presence("u-2")]);

        let messages = room.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].message_id, "old");
        let texts: Vec<_> = messages[..2].iter().map(|m| m.content.as_str()).collect();
        assert!(texts.contains(&"Joined the room."));
        assert!(texts.contains(&"Left the room."));

        room.clear_messages();
        assert!(room.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_messages_tick_until_connection_lost() {
        let (backend, _events, _) = connected().await;
        let room = ChatRoom::new(Arc::clone(&backend), DEFAULT_ROOM);
        assert_ok!(room.join().await);
        let sends_after_join = backend.calls().send;

        assert!(room.toggle_auto_messages());
        assert!(!room.start_auto_messages(AUTO_MESSAGE_PERIOD));

        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(backend.calls().send, sends_after_join + 2);

        room.handle_event(SessionEvent::Reconnecting {
            attempt: 1,
            delay_ms: 600,
        })
        .await;
        assert!(!room.is_auto_messaging());
        assert!(!room.is_joined());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.calls().send, sends_after_join + 2);
    }

    #[tokio::test]
    async fn test_follow_applies_broadcast_events() {
        let (backend, _events, _) = connected().await;
        let room = ChatRoom::new(backend, DEFAULT_ROOM);
        let (tx, rx) = broadcast::channel(8);
        let task = room.follow(rx);

        tx.send(SessionEvent::Presence {
            topic: DEFAULT_ROOM.into(),
            joins: vec![presence("u-1")],
            leaves: Vec::new(),
        })
        .unwrap();
        drop(tx);

        assert_ok!(task.await);
        assert_eq!(room.messages().len(), 1);
    }
}
