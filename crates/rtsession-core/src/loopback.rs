//! In-process backend for tests and demos (feature-gated).
//!
//! Accounts, topics and friends live in memory. Every joined topic echoes
//! posted messages back as [`BackendEvent::Message`], so a single client
//! sees its own traffic.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    AuthRequest, Backend, BackendError, BackendEvent, ErrorCode, Session,
    message::{Friend, FriendState, Request, Response, SelfInfo, TopicMessage, UserPresence},
    session,
};

/// Default lifetime of issued tokens (one hour).
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Number of calls made to each backend operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub connect: usize,
    pub login: usize,
    pub register: usize,
    pub disconnect: usize,
    pub send: usize,
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    handle: String,
    device_id: Option<String>,
}

#[derive(Debug)]
struct State {
    /// Keyed by the auth request id.
    accounts: HashMap<String, Account>,
    friends: HashMap<String, Vec<Friend>>,
    connected: Option<Session>,
    session_id: String,
    joined: HashSet<String>,
    token_ttl_secs: i64,
    failing_connects: u32,
    login_error: Option<BackendError>,
    calls: CallCounts,
}

/// Backend that keeps everything in process memory.
#[derive(Clone)]
pub struct LoopbackBackend {
    state: Arc<Mutex<State>>,
    events: mpsc::UnboundedSender<BackendEvent>,
}

impl LoopbackBackend {
    /// Create a backend and the receiver its events are delivered on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let backend = Self {
            state: Arc::new(Mutex::new(State {
                accounts: HashMap::new(),
                friends: HashMap::new(),
                connected: None,
                session_id: String::new(),
                joined: HashSet::new(),
                token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
                failing_connects: 0,
                login_error: None,
                calls: CallCounts::default(),
            })),
            events,
        };
        (backend, rx)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-register an account. Returns its user id.
    pub fn add_account(&self, auth_id: impl Into<String>, handle: impl Into<String>) -> String {
        let auth_id = auth_id.into();
        let account = Account {
            user_id: Uuid::new_v4().to_string(),
            handle: handle.into(),
            device_id: None,
        };
        let user_id = account.user_id.clone();
        self.lock().accounts.insert(auth_id, account);
        user_id
    }

    /// Lifetime of tokens issued from now on.
    pub fn set_token_ttl(&self, secs: i64) {
        self.lock().token_ttl_secs = secs;
    }

    /// Make the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().failing_connects = count;
    }

    /// Make every login fail with `error` until cleared with `None`.
    pub fn fail_logins_with(&self, error: Option<BackendError>) {
        self.lock().login_error = error;
    }

    /// Drop the socket as if the network went away.
    pub fn drop_connection(&self) {
        let was_connected = {
            let mut state = self.lock();
            state.joined.clear();
            state.connected.take().is_some()
        };
        if was_connected {
            self.emit(BackendEvent::Disconnected);
        }
    }

    /// Push an arbitrary event to the client.
    pub fn emit(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected.is_some()
    }

    fn issue(state: &State, account: &Account) -> Session {
        Session::issue(
            account.user_id.clone(),
            account.handle.clone(),
            session::now() + state.token_ttl_secs,
        )
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    fn handle_send(&self, state: &mut State, request: Request) -> Result<Response, BackendError> {
        let Some(session) = state.connected.clone() else {
            return Err(BackendError::new(
                ErrorCode::NotConnected,
                "socket is not connected",
            ));
        };
        let me = UserPresence {
            user_id: session.user_id().to_string(),
            session_id: state.session_id.clone(),
            handle: session.handle().to_string(),
        };

        match request {
            Request::TopicJoin { room } => {
                state.joined.insert(room.clone());
                self.emit(BackendEvent::Presence {
                    topic: room.clone(),
                    joins: vec![me.clone()],
                    leaves: Vec::new(),
                });
                Ok(Response::TopicJoined {
                    topic: room,
                    presence: me,
                })
            }
            Request::TopicLeave { topic } => {
                if state.joined.remove(&topic) {
                    self.emit(BackendEvent::Presence {
                        topic,
                        joins: Vec::new(),
                        leaves: vec![me],
                    });
                }
                Ok(Response::Ack)
            }
            Request::TopicMessageSend { topic, content } => {
                if !state.joined.contains(&topic) {
                    return Err(BackendError::new(
                        ErrorCode::BadInput,
                        format!("topic '{topic}' not joined"),
                    ));
                }
                let message_id = Uuid::new_v4().to_string();
                self.emit(BackendEvent::Message(TopicMessage {
                    topic,
                    message_id: message_id.clone(),
                    user_id: me.user_id,
                    created_at: Self::now_millis(),
                    content,
                }));
                Ok(Response::MessageAck { message_id })
            }
            Request::SelfFetch => {
                let device_ids = state
                    .accounts
                    .values()
                    .find(|a| a.user_id == me.user_id)
                    .and_then(|a| a.device_id.clone())
                    .into_iter()
                    .collect();
                Ok(Response::SelfInfo(SelfInfo {
                    id: me.user_id,
                    handle: me.handle.clone(),
                    fullname: me.handle,
                    device_ids,
                }))
            }
            Request::FriendAdd { user_id } => {
                let Some(target) = state
                    .accounts
                    .values()
                    .find(|a| a.user_id == user_id)
                    .cloned()
                else {
                    return Err(BackendError::new(
                        ErrorCode::BadInput,
                        format!("user '{user_id}' not found"),
                    ));
                };
                let friends = state.friends.entry(me.user_id).or_default();
                if !friends.iter().any(|f| f.user_id == target.user_id) {
                    friends.push(Friend {
                        user_id: target.user_id,
                        handle: target.handle,
                        state: FriendState::InviteSent,
                    });
                }
                Ok(Response::Ack)
            }
            Request::FriendRemove { user_id } => {
                if let Some(friends) = state.friends.get_mut(&me.user_id) {
                    friends.retain(|f| f.user_id != user_id);
                }
                Ok(Response::Ack)
            }
            Request::FriendsList => Ok(Response::Friends {
                friends: state.friends.get(&me.user_id).cloned().unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl Backend for LoopbackBackend {
    async fn connect(&self, session: &Session) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.connect += 1;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BackendError::new(
                ErrorCode::Connection,
                "connection refused",
            ));
        }
        if session.has_expired(session::now()) {
            return Err(BackendError::new(
                ErrorCode::Unauthorized,
                "session expired",
            ));
        }

        state.connected = Some(session.clone());
        state.session_id = Uuid::new_v4().to_string();
        Ok(())
    }

    async fn login(&self, request: &AuthRequest) -> Result<Session, BackendError> {
        let mut state = self.lock();
        state.calls.login += 1;

        if let Some(err) = state.login_error.clone() {
            return Err(err);
        }
        match state.accounts.get(request.id()) {
            Some(account) => Ok(Self::issue(&state, account)),
            None => Err(BackendError::new(
                ErrorCode::UserNotFound,
                "user account not found",
            )),
        }
    }

    async fn register(&self, request: &AuthRequest) -> Result<Session, BackendError> {
        let mut state = self.lock();
        state.calls.register += 1;

        if state.accounts.contains_key(request.id()) {
            return Err(BackendError::new(
                ErrorCode::UserExists,
                "user account already exists",
            ));
        }

        let user_id = Uuid::new_v4().to_string();
        let handle = request
            .username()
            .map_or_else(|| format!("user-{}", &user_id[..8]), ToString::to_string);
        let device_id = matches!(request, AuthRequest::Device { .. }).then(|| request.id().to_string());
        let account = Account {
            user_id,
            handle,
            device_id,
        };
        let session = Self::issue(&state, &account);
        state.accounts.insert(request.id().to_string(), account);
        Ok(session)
    }

    async fn disconnect(&self) {
        let was_connected = {
            let mut state = self.lock();
            state.calls.disconnect += 1;
            state.joined.clear();
            state.connected.take().is_some()
        };
        if was_connected {
            self.emit(BackendEvent::Disconnected);
        }
    }

    async fn send(&self, request: Request) -> Result<Response, BackendError> {
        let mut state = self.lock();
        state.calls.send += 1;
        self.handle_send(&mut state, request)
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn test_login_unknown_then_register() {
        let (backend, _events) = LoopbackBackend::new();
        let req = AuthRequest::device("dev-1");

        let err = assert_err!(backend.login(&req).await);
        assert_eq!(err.code, ErrorCode::UserNotFound);

        let session = assert_ok!(backend.register(&req).await);
        let again = assert_ok!(backend.login(&req).await);
        assert_eq!(again.user_id(), session.user_id());

        let calls = backend.calls();
        assert_eq!((calls.login, calls.register), (2, 1));
    }

    #[tokio::test]
    async fn test_message_echo_and_drop() {
        let (backend, mut events) = LoopbackBackend::new();
        backend.add_account("c-1", "alice");
        let session = assert_ok!(backend.login(&AuthRequest::custom("c-1")).await);
        assert_ok!(backend.connect(&session).await);

        let joined = assert_ok!(
            backend
                .send(Request::TopicJoin {
                    room: "Topic1".into()
                })
                .await
        );
        assert!(matches!(joined, Response::TopicJoined { ref topic, .. } if topic == "Topic1"));
        assert!(matches!(
            events.recv().await,
            Some(BackendEvent::Presence { ref joins, .. }) if joins.len() == 1
        ));

        assert_ok!(
            backend
                .send(Request::TopicMessageSend {
                    topic: "Topic1".into(),
                    content: "Hello!".into(),
                })
                .await
        );
        match events.recv().await {
            Some(BackendEvent::Message(msg)) => assert_eq!(msg.content, "Hello!"),
            other => panic!("unexpected event: {other:?}"),
        }

        backend.drop_connection();
        assert_eq!(events.recv().await, Some(BackendEvent::Disconnected));
        assert!(!backend.is_connected());

        let err = assert_err!(backend.send(Request::FriendsList).await);
        assert_eq!(err.code, ErrorCode::NotConnected);
    }

    #[tokio::test]
    async fn test_failing_connects_and_expired_sessions() {
        let (backend, _events) = LoopbackBackend::new();
        backend.fail_next_connects(1);

        let session = Session::issue("u", "h", session::now() + 60);
        assert_err!(backend.connect(&session).await);
        assert_ok!(backend.connect(&session).await);

        let expired = Session::issue("u", "h", 0);
        let err = assert_err!(backend.connect(&expired).await);
        assert_eq!(err.code, ErrorCode::Unauthorized);

        backend.add_account("c-1", "alice");
        backend.set_token_ttl(-60);
        let stale = assert_ok!(backend.login(&AuthRequest::custom("c-1")).await);
        assert!(stale.has_expired(session::now()));
        let err = assert_err!(backend.connect(&stale).await);
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }
}
