//! Resilient event feed consumer
//!
//! `EventStreamConsumer::subscribe` spawns one task per session. The task
//! holds either an open feed connection or a pending retry timer, never
//! both, and writes every decoded request into the shared `RequestStore`
//! in the order the transport yields them.

use super::policy::ReconnectionPolicy;
use super::store::RequestStore;
use super::transport::{FeedConnection, FeedTransport, TransportError};
use hookwatch_common::{FeedKind, FeedMessage};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Connection lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting { attempt: u32, next_delay: Duration },
    /// Retry budget exhausted or subscription rejected; only an explicit
    /// re-subscribe recovers
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Event feed unavailable after {attempts} reconnection attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    /// The feed refused the subscription; retrying cannot help
    #[error("Event feed rejected the subscription with status {status}")]
    Rejected { status: u16 },

    #[error("Subscription task failed: {0}")]
    Task(String),
}

/// Subscribes to session feeds and feeds a `RequestStore`
pub struct EventStreamConsumer<T> {
    transport: Arc<T>,
    store: Arc<RequestStore>,
    policy: ReconnectionPolicy,
}

impl<T: FeedTransport> EventStreamConsumer<T> {
    pub fn new(transport: T, store: Arc<RequestStore>) -> Self {
        Self {
            transport: Arc::new(transport),
            store,
            policy: ReconnectionPolicy::default(),
        }
    }

    /// Start a subscription to `session_id`.
    ///
    /// Fails immediately, without retry, when the session id is blank or the
    /// transport cannot resolve an endpoint. Must be called inside a Tokio
    /// runtime.
    pub fn subscribe(&self, session_id: &str) -> Result<Subscription, ConsumerError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ConsumerError::Configuration(
                "session id is empty".to_string(),
            ));
        }

        let endpoint = self.transport.endpoint(session_id).ok_or_else(|| {
            ConsumerError::Configuration("no event feed endpoint is configured".to_string())
        })?;
        tracing::debug!(session_id = %session_id, endpoint = %endpoint, "Subscribing to event feed");

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let retries = Arc::new(AtomicU32::new(0));

        let worker = Worker {
            session_id: session_id.to_string(),
            transport: self.transport.clone(),
            store: self.store.clone(),
            policy: self.policy,
            state: state_tx,
            cancel: cancel_rx,
            retries: retries.clone(),
        };

        Ok(Subscription {
            session_id: session_id.to_string(),
            state: state_rx,
            retries,
            cancel: cancel_tx,
            task: Some(tokio::spawn(worker.run())),
        })
    }
}

/// Handle to one live subscription. Dropping it cancels the subscription.
pub struct Subscription {
    session_id: String,
    state: watch::Receiver<ConnectionState>,
    retries: Arc<AtomicU32>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), ConsumerError>>>,
}

impl Subscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Reconnects scheduled since the last successful open
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Wait for the subscription to end on its own.
    ///
    /// Resolves with `ConnectionExhausted` once the retry budget is spent,
    /// or with `Rejected` when the feed refuses the session.
    /// Cancel safe; resolves immediately if the task already finished.
    pub async fn closed(&mut self) -> Result<(), ConsumerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;

        match result {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ConsumerError::Task(e.to_string())),
        }
    }

    /// Cancel any pending retry timer, close any open transport and wait
    /// for the subscription task to finish
    pub async fn unsubscribe(mut self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.closed().await {
            tracing::debug!(session_id = %self.session_id, "Subscription ended with: {}", e);
        }
        tracing::debug!(session_id = %self.session_id, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How a read loop ended
enum ReadOutcome {
    Cancelled,
    Dropped(String),
}

struct Worker<T> {
    session_id: String,
    transport: Arc<T>,
    store: Arc<RequestStore>,
    policy: ReconnectionPolicy,
    state: watch::Sender<ConnectionState>,
    cancel: watch::Receiver<bool>,
    retries: Arc<AtomicU32>,
}

impl<T: FeedTransport> Worker<T> {
    async fn run(mut self) -> Result<(), ConsumerError> {
        // Failures since the last successful open
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = cancelled(&mut self.cancel) => return Ok(()),
                opened = self.transport.open(&self.session_id) => opened,
            };

            let error = match opened {
                Ok(mut connection) => {
                    failures = 0;
                    self.retries.store(0, Ordering::SeqCst);
                    self.set_state(ConnectionState::Open);
                    tracing::info!(session_id = %self.session_id, "Event feed open");

                    match self.read(&mut connection).await {
                        ReadOutcome::Cancelled => {
                            connection.close();
                            return Ok(());
                        }
                        ReadOutcome::Dropped(error) => error,
                    }
                }
                Err(TransportError::Rejected(status)) => {
                    self.set_state(ConnectionState::Failed);
                    tracing::warn!(
                        session_id = %self.session_id,
                        status,
                        "Event feed rejected the subscription"
                    );
                    return Err(ConsumerError::Rejected { status });
                }
                Err(e) => e.to_string(),
            };

            let attempt = failures;
            failures = failures.saturating_add(1);

            if !self.policy.should_retry(attempt) {
                self.set_state(ConnectionState::Failed);
                tracing::warn!(
                    session_id = %self.session_id,
                    attempts = attempt,
                    "Event feed failed, giving up: {}",
                    error
                );
                return Err(ConsumerError::ConnectionExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.next_delay(attempt);
            self.retries.store(attempt + 1, Ordering::SeqCst);
            self.set_state(ConnectionState::Reconnecting {
                attempt,
                next_delay: delay,
            });
            tracing::info!(
                session_id = %self.session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Event feed dropped, reconnecting: {}",
                error
            );

            tokio::select! {
                _ = cancelled(&mut self.cancel) => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn read(&mut self, connection: &mut FeedConnection) -> ReadOutcome {
        loop {
            let next = tokio::select! {
                _ = cancelled(&mut self.cancel) => return ReadOutcome::Cancelled,
                next = connection.next() => next,
            };

            match next {
                Some(Ok(message)) => self.handle(message).await,
                Some(Err(e)) => return ReadOutcome::Dropped(e.to_string()),
                None => return ReadOutcome::Dropped(TransportError::Closed.to_string()),
            }
        }
    }

    async fn handle(&self, message: FeedMessage) {
        match message.kind {
            FeedKind::Request => match message.parse_request() {
                Ok(request) => {
                    let request_id = request.request_id.clone();
                    if self.store.append_live(request).await {
                        tracing::debug!(session_id = %self.session_id, request_id = %request_id, "Live request stored");
                    } else {
                        tracing::debug!(session_id = %self.session_id, request_id = %request_id, "Duplicate request suppressed");
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, "Dropping feed message: {}", e);
                }
            },
            FeedKind::Ping => match message.parse_ping() {
                Ok(_) => {
                    if *self.state.borrow() != ConnectionState::Open {
                        self.set_state(ConnectionState::Open);
                    }
                    tracing::trace!(session_id = %self.session_id, "Ping");
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, "Dropping feed message: {}", e);
                }
            },
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Resolves once cancellation is requested or the handle is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
