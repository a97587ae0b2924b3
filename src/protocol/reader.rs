//! Buffered RESP Stream Reader
//!
//! [`RespReader`] turns any `AsyncRead` into a stream of decoded
//! [`RespValue`]s. Bytes are accumulated in a `BytesMut` and handed to the
//! incremental [`RespParser`]; the reader only goes back to the socket when
//! the buffer does not yet hold a complete frame.
//!
//! TCP may deliver half a command or several commands in one read, so the
//! buffer can hold a partial frame or more than one frame at any time.

use crate::protocol::parser::{ParseError, RespParser};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors produced while decoding a value from a byte stream.
///
/// Every variant is fatal for the stream: after a malformed frame there is
/// no way to know where the next one begins.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The peer closed the stream in the middle of a frame
    #[error("unexpected end of stream with {buffered} bytes of a partial frame buffered")]
    UnexpectedEof { buffered: usize },
}

/// Reads complete RESP values from an async byte stream.
#[derive(Debug)]
pub struct RespReader<R> {
    inner: R,
    buffer: BytesMut,
    parser: RespParser,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
        }
    }

    /// Reads the next complete value, waiting for more bytes as needed.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    pub async fn read_value(&mut self) -> Result<Option<RespValue>, DecodeError> {
        loop {
            if let Some(value) = self.try_parse()? {
                return Ok(Some(value));
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(DecodeError::UnexpectedEof {
                    buffered: self.buffer.len(),
                });
            }

            trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        }
    }

    /// Number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn try_parse(&mut self) -> Result<Option<RespValue>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((value, consumed)) => {
                self.buffer.advance(consumed);
                trace!(consumed, remaining = self.buffer.len(), "Parsed frame");
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
