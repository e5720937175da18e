//! # Section Stream
//!
//! Incremental decoding of streamed AI answers delivered as Server-Sent Events.
//!
//! ## Overview
//!
//! The pipeline has three layers:
//! - **Frame parsing** - raw `text/event-stream` bytes, split anywhere, become
//!   discrete event records
//! - **Payload routing** - each record's JSON is normalized to a node name and
//!   routed to the text channel or to the search progress state
//! - **Section assembly** - the text channel is partitioned into a general
//!   section plus one section per inline `<tag>...</tag>` block, even when tags
//!   are split across deltas
//!
//! ## Quick Start
//!
//! ```rust
//! use section_stream::session::{SessionUpdate, StreamSession};
//!
//! let mut session = StreamSession::new();
//! session.begin("outpatient CAP in adults");
//!
//! session.ingest("data: {\"type\":\"STREAM\",\"content\":\"Hi <drug>amox\"}\n\n");
//! let updates = session.ingest("data: {\"type\":\"STREAM\",\"content\":\"icillin</drug>\"}\n\n");
//!
//! if let Some(SessionUpdate::Sections(sections)) = updates.last() {
//!     assert_eq!(sections[1].content, "amoxicillin");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`] - Async driver and the reqwest transport
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types and handling
//! - [`session`] - Session state and payload dispatch
//! - [`streaming`] - Frame parser, payload normalizer and section assembler
//! - [`transport`] - Transport trait

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod streaming;
pub mod transport;

pub use client::StreamClient;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use session::{SessionSnapshot, SessionStatus, SessionUpdate, StreamSession};
