//! Session manager owning one authenticated session.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rtsession_core::{
    AuthRequest, Backend, BackendError, BackendEvent, ClientConfig, DispatchQueue, EventHub,
    Session, SessionEvent, TerminalReason, TokenStore,
    session,
    traits::StoreError,
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    device,
    reconnect::{DisconnectOutcome, ReconnectPolicy},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("No session or credentials to reconnect with")]
    NoSession,
}

/// Mutable lifecycle state.
struct State {
    session: Option<Session>,
    /// Cached for re-authentication once the session expires.
    auth_request: Option<AuthRequest>,
    reconnect_count: u32,
    /// Cleared by an intentional disconnect.
    do_reconnect: bool,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Inner<B, S> {
    backend: Arc<B>,
    store: S,
    config: ClientConfig,
    policy: ReconnectPolicy,
    queue: DispatchQueue,
    events: EventHub,
    state: Mutex<State>,
}

/// Owns one authenticated session and its reconnect policy.
///
/// Network-side work (backend round-trips, event pumps, reconnect timers)
/// runs on tokio tasks and only enqueues actions. The host calls
/// [`drain_queue`](Self::drain_queue) once per tick, and every event
/// subscribers see is published from there.
///
/// Cloning yields another handle to the same manager.
pub struct SessionManager<B, S>
where
    B: Backend,
    S: TokenStore,
{
    inner: Arc<Inner<B, S>>,
}

impl<B, S> Clone for SessionManager<B, S>
where
    B: Backend,
    S: TokenStore,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B, S> SessionManager<B, S>
where
    B: Backend,
    S: TokenStore,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(backend: Arc<B>, store: S, config: ClientConfig) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                config,
                policy,
                queue: DispatchQueue::new(),
                events: EventHub::new(),
                state: Mutex::new(State {
                    session: None,
                    auth_request: None,
                    reconnect_count: 0,
                    do_reconnect: true,
                    reconnect_task: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Current session, if connected at least once.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn reconnect_count(&self) -> u32 {
        self.lock().reconnect_count
    }

    /// Whether an unsolicited disconnect will schedule a reconnect.
    #[must_use]
    pub fn reconnect_enabled(&self) -> bool {
        self.lock().do_reconnect
    }

    /// Number of actions waiting for the next drain.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.inner.queue.len()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    /// Persistent device id for device authentication.
    ///
    /// # Errors
    /// Returns error if the token store fails.
    pub async fn device_id(&self) -> Result<String, SessionError> {
        Ok(device::device_id(&self.inner.store, &self.inner.config.device_key).await?)
    }

    /// Connect, authenticating only when no valid session is persisted.
    ///
    /// Login falls back to registration with the same credentials when the
    /// account does not exist. Any other failure is logged, published as an
    /// error event and returned; nothing is retried.
    ///
    /// # Errors
    /// Returns error if authentication or the socket connect fails.
    pub async fn connect(&self, request: AuthRequest) -> Result<Session, SessionError> {
        let pending = {
            let mut state = self.lock();
            state.do_reconnect = true;
            state.auth_request = Some(request.clone());
            state.reconnect_task.take()
        };
        if let Some(task) = pending {
            tracing::debug!("Replacing pending reconnect with explicit connect");
            task.abort();
        }

        if let Some(session) = self.restore_session().await {
            return self.connect_session(session).await;
        }

        let session = self.authenticate(&request).await?;
        self.connect_session(session).await
    }

    /// Read the persisted token. `None` if absent, unreadable or expired.
    pub async fn restore_session(&self) -> Option<Session> {
        let key = &self.inner.config.session_key;
        let token = match self.inner.store.load(key).await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => {
                tracing::debug!("No session in store");
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read session token: {e}");
                return None;
            }
        };

        let session = match Session::restore(&token) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable session token: {e}");
                return None;
            }
        };

        if session.has_expired(session::now()) {
            tracing::info!(user_id = session.user_id(), "Session expired");
            return None;
        }
        Some(session)
    }

    async fn authenticate(&self, request: &AuthRequest) -> Result<Session, SessionError> {
        match self.inner.backend.login(request).await {
            Ok(session) => Ok(session),
            Err(err) if err.is_user_not_found() => {
                tracing::info!(kind = request.kind(), "No account for credentials, registering");
                self.inner
                    .backend
                    .register(request)
                    .await
                    .map_err(|e| self.report(e))
            }
            Err(err) => Err(self.report(err)),
        }
    }

    async fn connect_session(&self, session: Session) -> Result<Session, SessionError> {
        tracing::info!(user_id = session.user_id(), "Connecting session");
        self.inner
            .backend
            .connect(&session)
            .await
            .map_err(|e| self.report(e))?;

        {
            let mut state = self.lock();
            state.session = Some(session.clone());
            state.reconnect_count = 0;
        }

        // Cache for quick reconnects.
        if let Err(e) = self
            .inner
            .store
            .save(&self.inner.config.session_key, session.token())
            .await
        {
            tracing::warn!("Failed to persist session token: {e}");
        }

        self.publish_later(SessionEvent::Connected {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Log a backend error and queue it for subscribers.
    fn report(&self, err: BackendError) -> SessionError {
        tracing::error!(code = %err.code, message = %err.message, "Backend error");
        self.publish_later(SessionEvent::Error { error: err.clone() });
        SessionError::Backend(err)
    }

    fn publish_later(&self, event: SessionEvent) {
        let events = self.inner.events.clone();
        self.inner.queue.enqueue(move || events.publish(event));
    }

    /// React to the socket closing.
    ///
    /// Schedules a reconnect while the counter is below the bound and
    /// reconnect is enabled; otherwise clears the queue and enqueues the
    /// terminal notification.
    pub fn on_disconnect(&self) -> DisconnectOutcome {
        let decision = {
            let mut state = self.lock();
            if !state.do_reconnect {
                Err(TerminalReason::Intentional)
            } else if self.inner.policy.allows(state.reconnect_count) {
                state.reconnect_count += 1;
                Ok(state.reconnect_count)
            } else {
                Err(TerminalReason::Exhausted)
            }
        };

        let attempt = match decision {
            Ok(attempt) => attempt,
            Err(reason) => return self.terminate(reason),
        };

        let delay = self.inner.policy.delay_for(attempt);
        tracing::info!(
            attempt,
            max_attempts = self.inner.policy.max_attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Disconnected from server, scheduling reconnect"
        );

        let this = self.clone();
        self.inner
            .queue
            .enqueue(move || this.schedule_reconnect(attempt, delay));

        DisconnectOutcome::ReconnectScheduled { attempt, delay }
    }

    fn terminate(&self, reason: TerminalReason) -> DisconnectOutcome {
        tracing::info!(?reason, "Disconnected from server");
        let dropped = self.inner.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Cleared pending actions");
        }
        self.publish_later(SessionEvent::Disconnected { reason });
        DisconnectOutcome::Terminal(reason)
    }

    /// Runs on the host turn.
    fn schedule_reconnect(&self, attempt: u32, delay: Duration) {
        if !self.is_current_attempt(attempt) {
            tracing::debug!(attempt, "Reconnect no longer wanted");
            return;
        }

        self.inner.events.publish(SessionEvent::Reconnecting {
            attempt,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });

        let Ok(runtime) = Handle::try_current() else {
            tracing::error!("No async runtime available to schedule reconnect");
            return;
        };

        let this = self.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            this.reconnect(attempt).await;
        });

        if let Some(previous) = self.lock().reconnect_task.replace(task) {
            previous.abort();
        }
    }

    /// False once reconnect was disabled or a connect or later disconnect
    /// moved the counter past `attempt`.
    fn is_current_attempt(&self, attempt: u32) -> bool {
        let state = self.lock();
        state.do_reconnect && state.reconnect_count == attempt
    }

    async fn reconnect(&self, attempt: u32) {
        let (session, request) = {
            let state = self.lock();
            if !state.do_reconnect || state.reconnect_count != attempt {
                tracing::debug!(attempt, "Reconnect cancelled");
                return;
            }
            (state.session.clone(), state.auth_request.clone())
        };

        let session = match (session, request) {
            (Some(session), _) if !session.has_expired(session::now()) => session,
            (_, Some(request)) => match self.authenticate(&request).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Re-authentication failed: {e}");
                    self.terminate(TerminalReason::Rejected);
                    return;
                }
            },
            _ => {
                tracing::warn!("{}", SessionError::NoSession);
                self.terminate(TerminalReason::Rejected);
                return;
            }
        };

        if let Err(e) = self.connect_session(session).await {
            tracing::warn!("Reconnect attempt failed: {e}");
            self.on_disconnect();
        }
    }

    /// Execute the actions queued before this call, in FIFO order.
    ///
    /// Call once per host tick. Returns the number of actions executed.
    pub fn drain_queue(&self) -> usize {
        self.inner.queue.drain()
    }

    /// Route one backend event.
    pub fn handle_backend_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::Disconnected => {
                self.on_disconnect();
            }
            BackendEvent::Error(err) => {
                let _ = self.report(err);
            }
            BackendEvent::Presence {
                topic,
                joins,
                leaves,
            } => self.publish_later(SessionEvent::Presence {
                topic,
                joins,
                leaves,
            }),
            BackendEvent::Message(message) => {
                self.publish_later(SessionEvent::Message { message });
            }
        }
    }

    /// Spawn a task feeding backend events into the manager.
    pub fn attach(&self, mut events: mpsc::UnboundedReceiver<BackendEvent>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_backend_event(event);
            }
            tracing::debug!("Backend event stream closed");
        })
    }

    /// Disconnect on purpose. No reconnect follows.
    pub async fn disconnect(&self) {
        let pending = {
            let mut state = self.lock();
            state.do_reconnect = false;
            state.reconnect_task.take()
        };
        if let Some(task) = pending {
            task.abort();
        }

        tracing::info!("Disconnecting");
        self.inner.backend.disconnect().await;
    }

    /// Application moved to the background.
    pub async fn suspend(&self) {
        self.disconnect().await;
    }

    /// Application back in the foreground.
    ///
    /// Re-authenticates if necessary and reconnects with the credentials of
    /// the last [`connect`](Self::connect). Returns `None` if there were none.
    ///
    /// # Errors
    /// Returns error if the reconnect fails.
    pub async fn resume(&self) -> Result<Option<Session>, SessionError> {
        let request = self.lock().auth_request.clone();
        let Some(request) = request else {
            tracing::debug!("Nothing to resume");
            return Ok(None);
        };
        self.connect(request).await.map(Some)
    }
}
