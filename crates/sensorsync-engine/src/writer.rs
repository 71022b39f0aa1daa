//! Outbound writer
//!
//! Encodes reply and command messages and writes them to the link. The link
//! attaches its sink when the connection comes up and detaches it when the
//! connection drops; writing without a sink is reported as
//! [`GatewayError::TransportUnavailable`], never queued.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sensorsync_core::{encode, GatewayError, GatewayResult, Message};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a link sink
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Write half of the stream link
///
/// Implementations must serialize concurrent writes so lines are never
/// interleaved.
#[async_trait]
pub trait LinkSink: Send + Sync {
    /// Write one complete line, terminator included
    async fn write_line(&self, line: &str) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct OutboundWriter {
    sink: RwLock<Option<Arc<dyn LinkSink>>>,
}

impl OutboundWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the sink of a freshly connected link
    pub fn attach(&self, sink: Arc<dyn LinkSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Remove the sink after the link dropped
    pub fn detach(&self) {
        *self.sink.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.sink.read().is_some()
    }

    /// Encode `message` and write it to the link
    pub async fn send(&self, message: &Message) -> GatewayResult<()> {
        let sink = self
            .sink
            .read()
            .clone()
            .ok_or(GatewayError::TransportUnavailable)?;

        let line = format!("{}\n", encode(message));
        debug!(line = %line.trim_end(), "Sending message");
        sink.write_line(&line).await.map_err(|e| {
            warn!(error = %e, "Link write failed");
            GatewayError::TransportUnavailable
        })
    }
}
