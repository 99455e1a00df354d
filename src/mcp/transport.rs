//! Newline-delimited JSON framing over a byte stream.
//!
//! One complete line is one message. stdout carries nothing but protocol
//! output; all logging goes through `tracing` to stderr.

use std::future::Future;
use std::string::FromUtf8Error;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio_util::sync::CancellationToken;

/// Receives each complete incoming message; a returned value is written back
/// as one line.
pub trait MessageHandler {
    fn on_message(&self, message: &str) -> impl Future<Output = Option<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Listening,
    Stopped,
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    /// Bytes read but not yet delivered as a complete message.
    pending: Vec<u8>,
    state: TransportState,
}

impl StdioTransport<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
            state: TransportState::Idle,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Next complete line without its terminator, or `None` at end of input.
    ///
    /// A trailing line without a newline is delivered when the input ends.
    /// Cancel safe: partial reads stay in the pending buffer.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let mut frame: Vec<u8> = self.pending.drain(..=pos).collect();
                frame.pop();
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                return Ok(Some(frame));
            }

            if self.reader.read_buf(&mut self.pending).await? == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
        }
    }

    /// Write one JSON value as one line and flush it.
    pub async fn write_message(&mut self, message: &Value) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(message).map_err(std::io::Error::other)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }

    /// Deliver messages to `handler` until `shutdown` fires.
    ///
    /// End of input does not stop the loop; the transport stays resident
    /// until the token is cancelled. Requests are handled one at a time.
    pub async fn listen<H: MessageHandler>(
        &mut self,
        handler: &H,
        shutdown: &CancellationToken,
    ) -> std::io::Result<()> {
        self.state = TransportState::Listening;
        tracing::info!("Listening for messages");

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = self.read_frame() => frame?,
            };

            let Some(frame) = frame else {
                tracing::info!("Input closed; waiting for shutdown");
                shutdown.cancelled().await;
                break;
            };

            let message = match decode_frame(frame) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Dropping undecodable message: {}", e);
                    continue;
                }
            };

            if let Some(response) = handler.on_message(&message).await {
                self.write_message(&response).await?;
            }
        }

        self.state = TransportState::Stopped;
        tracing::info!("Transport stopped");
        Ok(())
    }
}

/// Strict UTF-8 decode; blank lines yield `None`.
pub fn decode_frame(frame: Vec<u8>) -> Result<Option<String>, FramingError> {
    let text = String::from_utf8(frame)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}
