//! Event feed transports
//!
//! A transport opens one connection to a session's feed and yields typed
//! `FeedMessage`s through a channel. Closing the connection (or dropping it)
//! stops the reader task.

use futures_util::StreamExt;
use hookwatch_common::{constants, FeedMessage, SseDecoder};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered messages between the reader task and the consumer
const CHANNEL_CAPACITY: usize = 64;

/// Feed transport failures. Only `Rejected` is terminal; every other
/// variant drives a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No event feed endpoint is configured")]
    NoEndpoint,

    /// The relay or origin refused the subscription itself: unknown or
    /// expired session, invalid id, no origin configured
    #[error("Event feed rejected the subscription with status {0}")]
    Rejected(u16),

    #[error("Failed to connect to event feed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("Event feed responded with status {0}")]
    Status(u16),

    #[error("Event feed stream failed: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("Event feed closed")]
    Closed,
}

impl TransportError {
    /// Classify a non-success feed response. Client errors and 503 (no
    /// origin configured) are terminal; other server errors are transient.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status.is_client_error() || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            TransportError::Rejected(status.as_u16())
        } else {
            TransportError::Status(status.as_u16())
        }
    }
}

/// Opens connections to a session's event feed
pub trait FeedTransport: Send + Sync + 'static {
    /// Endpoint the session's feed is read from, `None` if unresolvable
    fn endpoint(&self, session_id: &str) -> Option<String>;

    /// Open one connection. Resolves once the feed is established.
    fn open(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<FeedConnection, TransportError>> + Send;
}

/// One open feed connection
pub struct FeedConnection {
    messages: mpsc::Receiver<Result<FeedMessage, TransportError>>,
    reader: Option<JoinHandle<()>>,
}

impl FeedConnection {
    pub fn new(
        messages: mpsc::Receiver<Result<FeedMessage, TransportError>>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self { messages, reader }
    }

    /// Next message; `None` once the transport has closed
    pub async fn next(&mut self) -> Option<Result<FeedMessage, TransportError>> {
        self.messages.recv().await
    }

    /// Close the connection and stop its reader
    pub fn close(mut self) {
        self.stop_reader();
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.messages.close();
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// Server-sent events over chunked HTTP, read through the relay
pub struct SseTransport {
    relay_url: Option<String>,
    client: Client,
}

impl SseTransport {
    pub fn new(relay_url: Option<String>) -> Result<Self, reqwest::Error> {
        // No overall timeout: the feed stays open indefinitely
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            relay_url: relay_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            client,
        })
    }
}

impl FeedTransport for SseTransport {
    fn endpoint(&self, session_id: &str) -> Option<String> {
        self.relay_url
            .as_ref()
            .map(|base| format!("{}{}/{}", base, constants::RELAY_STREAM_PREFIX, session_id))
    }

    async fn open(&self, session_id: &str) -> Result<FeedConnection, TransportError> {
        let url = self.endpoint(session_id).ok_or(TransportError::NoEndpoint)?;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, constants::EVENT_STREAM_CONTENT_TYPE)
            .send()
            .await
            .map_err(TransportError::Connect)?;

        if !response.status().is_success() {
            return Err(TransportError::from_status(response.status()));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let session_id = session_id.to_string();

        let reader = tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Stream(e))).await;
                        return;
                    }
                };

                for frame in decoder.push(&chunk) {
                    let event = frame.event.clone();
                    match FeedMessage::from_frame(frame) {
                        Some(message) => {
                            if tx.send(Ok(message)).await.is_err() {
                                return;
                            }
                        }
                        None => {
                            tracing::debug!(session_id = %session_id, "Ignoring feed event '{}'", event);
                        }
                    }
                }
            }
            // Dropping the sender signals the close
        });

        Ok(FeedConnection::new(rx, Some(reader)))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for consumer tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Outcome of one scripted `open` call
    pub enum Script {
        /// Open fails
        Fail,
        /// Open succeeds; the test feeds messages through the returned sender
        Open,
        /// Open succeeds and the connection closes immediately
        OpenThenClose,
        /// Open is refused with a terminal status
        Reject(u16),
    }

    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub script: Arc<Mutex<VecDeque<Script>>>,
        /// Instants of every `open` call
        pub opens: Arc<Mutex<Vec<Instant>>>,
        /// Senders of connections opened with `Script::Open`
        pub senders: Arc<Mutex<Vec<mpsc::Sender<Result<FeedMessage, TransportError>>>>>,
        pub no_endpoint: bool,
    }

    impl MockTransport {
        pub fn with_script(script: Vec<Script>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Self::default()
            }
        }

        pub fn open_count(&self) -> usize {
            self.opens.lock().unwrap().len()
        }

        pub fn open_times(&self) -> Vec<Instant> {
            self.opens.lock().unwrap().clone()
        }

        /// Sender of the most recent open connection
        pub fn sender(&self) -> mpsc::Sender<Result<FeedMessage, TransportError>> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl FeedTransport for MockTransport {
        fn endpoint(&self, session_id: &str) -> Option<String> {
            if self.no_endpoint {
                None
            } else {
                Some(format!("mock://{}", session_id))
            }
        }

        async fn open(&self, _session_id: &str) -> Result<FeedConnection, TransportError> {
            self.opens.lock().unwrap().push(Instant::now());
            // An exhausted script keeps failing
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Fail);

            match step {
                Script::Fail => Err(TransportError::Status(502)),
                Script::Open => {
                    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                    self.senders.lock().unwrap().push(tx);
                    Ok(FeedConnection::new(rx, None))
                }
                Script::OpenThenClose => {
                    let (_tx, rx) = mpsc::channel(1);
                    Ok(FeedConnection::new(rx, None))
                }
                Script::Reject(status) => Err(TransportError::Rejected(status)),
            }
        }
    }
}
