use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::streaming::{ContentAssembler, FrameParser, Node, NodePayload, SearchStep, Section};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Streaming,
    Finished,
    Closed,
    Failed,
}

/// Auxiliary progress state carried beside the text channel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchState {
    pub steps: Vec<SearchStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Change notification produced while ingesting transport data
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// New section snapshot after one text delta
    Sections(Vec<Section>),
    /// Step list or progress value was replaced
    Search(SearchState),
    /// Transport ended normally
    Finished,
    /// Transport failed; terminal
    Failed(String),
}

/// Caller-visible copy of the whole session state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub question: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sections: Vec<Section>,
    pub search: SearchState,
}

/// One streaming answer: owns the frame parser and the content assembler
/// and routes decoded payloads between them and the search state.
///
/// All methods are synchronous; the transport side lives in
/// [`crate::client::StreamClient`].
pub struct StreamSession {
    id: Option<Uuid>,
    question: String,
    status: SessionStatus,
    error: Option<String>,
    parser: FrameParser,
    assembler: ContentAssembler,
    search: SearchState,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::with_titles(HashMap::new())
    }

    /// Create a session whose assembler knows extra tag titles
    pub fn with_titles(titles: HashMap<String, String>) -> Self {
        Self {
            id: None,
            question: String::new(),
            status: SessionStatus::Idle,
            error: None,
            parser: FrameParser::new(),
            assembler: ContentAssembler::with_titles(titles),
            search: SearchState::default(),
        }
    }

    /// Reset everything and start accepting data for `question`
    pub fn begin(&mut self, question: &str) -> Uuid {
        self.reset();
        let id = Uuid::new_v4();
        self.id = Some(id);
        self.question = question.to_string();
        self.status = SessionStatus::Streaming;
        info!(session = %id, question, "Session started");
        id
    }

    /// Feed raw transport bytes and return the resulting updates in order.
    ///
    /// Input is discarded unless the session is streaming.
    pub fn ingest(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SessionUpdate> {
        if !self.is_streaming() {
            trace!(status = ?self.status, "Discarding input for inactive session");
            return Vec::new();
        }

        let mut updates = Vec::new();
        for event in self.parser.feed(chunk) {
            let Some(data) = event.data else {
                continue;
            };

            let payload = match NodePayload::parse(&data) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "Dropping undecodable event payload");
                    continue;
                }
            };

            if let Some(update) = self.apply(payload.into_node()) {
                updates.push(update);
            }
        }
        updates
    }

    fn apply(&mut self, node: Node) -> Option<SessionUpdate> {
        match node {
            Node::Stream(delta) => self.assembler.append(&delta).map(SessionUpdate::Sections),
            Node::SearchSteps(steps) => {
                debug!(count = steps.len(), "Replacing search steps");
                self.search.steps = steps;
                Some(SessionUpdate::Search(self.search.clone()))
            }
            Node::SearchProgress(progress) => {
                self.search.progress = progress;
                Some(SessionUpdate::Search(self.search.clone()))
            }
            Node::Ignored(name) => {
                trace!(node = %name, "Ignoring node");
                None
            }
        }
    }

    /// End of transport. Flushes what can be flushed; returns the last
    /// section snapshot when the flush changed anything.
    pub fn finish(&mut self) -> Option<SessionUpdate> {
        if !self.is_streaming() {
            return None;
        }

        self.parser.finish();
        let flushed = self.assembler.finish().map(SessionUpdate::Sections);
        self.status = SessionStatus::Finished;
        info!(session = ?self.id, sections = self.assembler.sections().len(), "Session finished");
        flushed
    }

    /// Transport failure. Recorded once; the session stops streaming.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.is_streaming() {
            return false;
        }

        let message = message.into();
        warn!(session = ?self.id, error = %message, "Session failed");
        self.parser.fail();
        self.error = Some(message);
        self.status = SessionStatus::Failed;
        true
    }

    /// Stop accepting input. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.is_streaming() {
            debug!(session = ?self.id, "Session closed");
            self.parser.fail();
            self.status = SessionStatus::Closed;
        }
    }

    /// Drop all state and go back to idle
    pub fn reset(&mut self) {
        self.parser.reset();
        self.assembler.reset();
        self.search = SearchState::default();
        self.error = None;
        self.question.clear();
        self.id = None;
        self.status = SessionStatus::Idle;
    }

    pub fn is_streaming(&self) -> bool {
        self.status == SessionStatus::Streaming
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sections(&self) -> Vec<Section> {
        self.assembler.sections()
    }

    pub fn search(&self) -> &SearchState {
        &self.search
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            question: self.question.clone(),
            status: self.status,
            error: self.error.clone(),
            sections: self.assembler.sections(),
            search: self.search.clone(),
        }
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}
