use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Type alias for the byte stream delivered by a transport
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Type alias for the future returned by `connect`
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<TransportStream>> + Send>>;

/// Source of raw `text/event-stream` bytes for a URL
pub trait Transport: Send + Sync {
    /// Open a connection to `url` and stream its body
    ///
    /// # Arguments
    /// * `url` - Fully built request URL, query string included
    ///
    /// # Returns
    /// A stream of body chunks; an `Err` item ends the session as failed
    fn connect(&self, url: &str) -> TransportFuture;

    /// Get the transport name for logging
    fn name(&self) -> &str;
}
