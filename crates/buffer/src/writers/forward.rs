//! ForwardWriter - TCP forward protocol, packed-forward mode

use contracts::{BufferError, Chunk, ChunkWriter};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

/// Configuration for ForwardWriter
#[derive(Debug, Clone)]
pub struct ForwardWriterConfig {
    /// Target address, `host:port`
    pub addr: String,
    /// Tag used when the chunk key has no tag component
    pub tag: String,
    /// Connect and write timeout
    pub timeout: Duration,
}

impl ForwardWriterConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| "missing 'addr' parameter".to_string())?
            .clone();

        let tag = params
            .get("tag")
            .cloned()
            .unwrap_or_else(|| "chunkline".to_string());

        let timeout_ms = match params.get("timeout_ms") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| format!("invalid timeout_ms '{}': {}", v, e))?,
            None => 5000,
        };

        Ok(Self {
            addr,
            tag,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Packed-forward option map
#[derive(Debug, Serialize)]
struct ForwardOption<'a> {
    size: usize,
    chunk: &'a str,
}

/// Encode one `[tag, bin(entries), option]` frame
fn encode_frame(tag: &str, chunk: &Chunk) -> Result<Vec<u8>, BufferError> {
    let chunk_id = chunk.id.to_string();
    let option = ForwardOption {
        size: chunk.records,
        chunk: &chunk_id,
    };
    let mut frame = Vec::with_capacity(chunk.bytesize() + tag.len() + 48);
    rmp_serde::encode::write_named(
        &mut frame,
        &(tag, serde_bytes::Bytes::new(&chunk.data), option),
    )
    .map_err(|e| BufferError::encode(e.to_string()))?;
    Ok(frame)
}

/// Writer that forwards chunks over TCP
///
/// The connection is opened lazily and dropped after a failed write, so the
/// next retry reconnects.
pub struct ForwardWriter {
    name: String,
    config: ForwardWriterConfig,
    stream: Option<TcpStream>,
}

impl ForwardWriter {
    /// Create a new ForwardWriter (no connection yet)
    pub fn new(name: impl Into<String>, config: ForwardWriterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stream: None,
        }
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, BufferError> {
        let name = name.into();
        let config =
            ForwardWriterConfig::from_params(params).map_err(|e| BufferError::write(&name, e))?;
        Ok(Self::new(name, config))
    }

    async fn connect(&mut self) -> Result<&mut TcpStream, BufferError> {
        if self.stream.is_none() {
            let stream = tokio::time::timeout(self.config.timeout, TcpStream::connect(&self.config.addr))
                .await
                .map_err(|_| BufferError::write(&self.name, "connect timed out"))?
                .map_err(|e| BufferError::write(&self.name, format!("connect failed: {e}")))?;
            stream.set_nodelay(true)?;
            debug!(writer = %self.name, target = %self.config.addr, "ForwardWriter connected");
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| BufferError::write(&self.name, "socket not connected"))
    }

    async fn transmit(&mut self, frame: &[u8]) -> Result<(), BufferError> {
        let timeout = self.config.timeout;
        let stream = self.connect().await?;
        match tokio::time::timeout(timeout, stream.write_all(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stream = None;
                Err(BufferError::write(&self.name, format!("send failed: {e}")))
            }
            Err(_) => {
                self.stream = None;
                Err(BufferError::write(&self.name, "send timed out"))
            }
        }
    }
}

impl ChunkWriter for ForwardWriter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "forward_writer_write",
        skip(self, chunk),
        fields(writer = %self.name, chunk_id = %chunk.id)
    )]
    async fn write(&mut self, chunk: &Chunk) -> Result<(), BufferError> {
        let tag = chunk.key.tag.as_deref().unwrap_or(&self.config.tag);
        let frame = encode_frame(tag, chunk)?;

        if let Err(e) = self.transmit(&frame).await {
            warn!(writer = %self.name, error = %e, "Forward failed");
            return Err(e);
        }
        debug!(writer = %self.name, bytes = frame.len(), records = chunk.records, "Sent");
        Ok(())
    }

    #[instrument(name = "forward_writer_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), BufferError> {
        if let Some(stream) = self.stream.as_mut() {
            stream.flush().await?;
        }
        Ok(())
    }

    #[instrument(name = "forward_writer_close", skip(self))]
    async fn close(&mut self) -> Result<(), BufferError> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(writer = %self.name, error = %e, "Shutdown failed");
            }
        }
        debug!(writer = %self.name, "ForwardWriter closed");
        Ok(())
    }
}
