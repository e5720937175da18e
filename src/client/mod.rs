//! Async driver connecting a [`Transport`] to a [`StreamSession`].
//!
//! The transport runs on its own task and only moves byte chunks into a
//! channel; every parser and session mutation happens on the caller's task,
//! in arrival order, when it pulls updates.

pub mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ClientConfig, StreamConfig};
use crate::error::{Result, StreamError};
use crate::session::{SessionSnapshot, SessionUpdate, StreamSession};
use crate::transport::Transport;

const CHANNEL_CAPACITY: usize = 64;

enum TransportEvent {
    Chunk(Bytes),
    Finished,
    Failed(String),
}

/// Transport task of the current session and the receiving end of its channel
struct Inflight {
    task: JoinHandle<()>,
    events: mpsc::Receiver<TransportEvent>,
}

impl Drop for Inflight {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct StreamClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    session: StreamSession,
    inflight: Option<Inflight>,
    queued: VecDeque<SessionUpdate>,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn Transport>, config: &StreamConfig) -> Self {
        Self {
            transport,
            config: config.client.clone(),
            session: StreamSession::with_titles(config.sections.titles.clone()),
            inflight: None,
            queued: VecDeque::new(),
        }
    }

    /// Create a client backed by [`HttpTransport`]
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.client)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Request URL for a question
    pub fn build_url(&self, query: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.config.endpoint,
            &[(self.config.query_param.as_str(), query)],
        )
        .map_err(|e| StreamError::InvalidUrl(format!("{}: {}", self.config.endpoint, e)))?;
        Ok(url.into())
    }

    /// Start a new session for `query`, tearing down any previous one first.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(&mut self, query: &str) -> Result<Uuid> {
        self.reset();

        let question = query.trim();
        if question.is_empty() {
            return Err(StreamError::EmptyQuery);
        }
        let url = self.build_url(question)?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(pump(self.transport.clone(), url, tx));
        let id = self.session.begin(question);
        info!(session = %id, transport = self.transport.name(), "Opened stream");

        self.inflight = Some(Inflight { task, events: rx });
        Ok(id)
    }

    /// Wait for the next change. Returns `None` once nothing is in flight and
    /// all updates have been delivered.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.queued.pop_front() {
                return Some(update);
            }

            let inflight = self.inflight.as_mut()?;
            let event = inflight.events.recv().await;
            self.handle_event(event);
        }
    }

    /// Coalesced variant of [`Self::next_update`]: waits for one change, then
    /// applies everything already received and returns a single snapshot.
    pub async fn next_frame(&mut self) -> Option<SessionSnapshot> {
        self.next_update().await?;

        loop {
            let Some(inflight) = self.inflight.as_mut() else {
                break;
            };
            let event = match inflight.events.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => None,
            };
            self.handle_event(event);
        }
        self.queued.clear();

        Some(self.session.snapshot())
    }

    fn handle_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Chunk(chunk)) => {
                self.queued.extend(self.session.ingest(&chunk));
            }
            Some(TransportEvent::Finished) => {
                self.inflight = None;
                self.queued.extend(self.session.finish());
                self.queued.push_back(SessionUpdate::Finished);
            }
            Some(TransportEvent::Failed(message)) => {
                self.inflight = None;
                if self.session.fail(message.clone()) {
                    self.queued.push_back(SessionUpdate::Failed(message));
                }
            }
            None => {
                self.inflight = None;
                let message = "Transport task ended unexpectedly".to_string();
                if self.session.fail(message.clone()) {
                    self.queued.push_back(SessionUpdate::Failed(message));
                }
            }
        }
    }

    /// Stop the current session. No update is delivered afterwards, even if
    /// the transport already had data queued. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.inflight.take().is_some() {
            debug!("Aborted transport task");
        }
        self.queued.clear();
        self.session.close();
    }

    /// Close and drop all session state
    pub fn reset(&mut self) {
        self.close();
        self.session.reset();
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }
}

/// Move transport chunks into the channel until the body ends, fails, or the
/// receiver goes away
async fn pump(transport: Arc<dyn Transport>, url: String, tx: mpsc::Sender<TransportEvent>) {
    let mut stream = match transport.connect(&url).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(TransportEvent::Failed(e.to_string())).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(chunk) if chunk.is_empty() => continue,
            Ok(chunk) => TransportEvent::Chunk(chunk),
            Err(e) => {
                let _ = tx.send(TransportEvent::Failed(e.to_string())).await;
                return;
            }
        };

        if tx.send(event).await.is_err() {
            debug!("Receiver dropped, stopping transport");
            return;
        }
    }

    let _ = tx.send(TransportEvent::Finished).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportFuture, TransportStream};

    struct NullTransport;

    impl Transport for NullTransport {
        fn connect(&self, _url: &str) -> TransportFuture {
            let stream: TransportStream = Box::pin(futures::stream::empty::<Result<Bytes>>());
            Box::pin(async move { Ok(stream) })
        }

        fn name(&self) -> &str {
            "null"
        }
    }

    fn client() -> StreamClient {
        StreamClient::new(Arc::new(NullTransport), &StreamConfig::default())
    }

    #[test]
    fn test_build_url_encodes_query() {
        let url = client().build_url("cap in adults?").unwrap();
        assert_eq!(
            url,
            "https://vera-assignment-api.vercel.app/api/stream?prompt=cap+in+adults%3F"
        );
    }

    #[test]
    fn test_build_url_rejects_bad_endpoint() {
        let mut config = StreamConfig::default();
        config.client.endpoint = "not a url".to_string();
        let client = StreamClient::new(Arc::new(NullTransport), &config);
        assert!(matches!(
            client.build_url("q"),
            Err(StreamError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_blank_query() {
        let mut client = client();
        assert!(matches!(client.open("   "), Err(StreamError::EmptyQuery)));
        assert!(!client.is_streaming());
        assert!(client.next_update().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_finishes() {
        let mut client = client();
        client.open("q").unwrap();
        assert!(client.is_streaming());

        assert_eq!(client.next_update().await, Some(SessionUpdate::Finished));
        assert!(client.next_update().await.is_none());
        assert!(!client.is_streaming());
    }
}
