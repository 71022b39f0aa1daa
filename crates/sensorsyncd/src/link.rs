//! Stream link to the radio gateway
//!
//! Connects to the radio gateway as a TCP client, frames inbound bytes into
//! lines and hands each line to the engine in arrival order. The write half is
//! attached to the engine's outbound writer for as long as the connection
//! lives. When the connection drops the link waits and reconnects.

use std::sync::Arc;

use async_trait::async_trait;
use sensorsync_core::{InternalCommand, Message};
use sensorsync_engine::{LinkSink, SyncEngine, TransportError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;

/// Payload of the version request sent after connecting
const VERSION_REQUEST: &str = "Get Version";

/// Write half of a TCP link; one line at a time
pub struct TcpSink {
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpSink {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl LinkSink for TcpSink {
    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }
}

pub struct Link {
    config: LinkConfig,
    engine: Arc<SyncEngine>,
}

impl Link {
    pub fn new(config: LinkConfig, engine: Arc<SyncEngine>) -> Self {
        Self { config, engine }
    }

    /// Keep the link up: connect, serve, reconnect after a delay
    pub async fn run(&self) {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        loop {
            match TcpStream::connect(addr.as_str()).await {
                Ok(stream) => {
                    info!(%addr, "Connected to radio gateway");
                    match self.serve(stream).await {
                        Ok(()) => info!(%addr, "Radio gateway closed the connection"),
                        Err(e) => warn!(%addr, error = %e, "Radio gateway connection failed"),
                    }
                }
                Err(e) => warn!(%addr, error = %e, "Could not connect to radio gateway"),
            }

            debug!(delay_ms = self.config.reconnect_delay_ms, "Waiting before reconnect");
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    /// Serve one connection until it closes
    pub async fn serve(&self, stream: TcpStream) -> std::io::Result<()> {
        let (reader, writer) = stream.into_split();
        let writer_handle = self.engine.writer().clone();
        writer_handle.attach(Arc::new(TcpSink::new(writer)));

        let result = self.read_lines(reader).await;
        writer_handle.detach();
        result
    }

    async fn read_lines(&self, reader: tokio::net::tcp::OwnedReadHalf) -> std::io::Result<()> {
        if self.config.version_request {
            let request = Message::internal(0, 0, InternalCommand::Version, VERSION_REQUEST);
            if let Err(e) = self.engine.writer().send(&request).await {
                warn!(error = %e, "Version request not sent");
            }
        }

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            // Invalid UTF-8 is replaced rather than failing the connection;
            // the engine drops whatever no longer decodes
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            debug!(%line, "Inbound line");
            self.engine.submit_line(line);
        }
    }
}
