//! Connection Handler Module
//!
//! This module drives a single client connection. Each client gets its own
//! task running a read-execute-respond loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!          ┌──────────────────────────────┐
//!          │  Reading                     │◄─────────┐
//!          │  (waiting in read_value)     │          │
//!          └──────┬───────────────┬───────┘          │
//!                 │ frame decoded │ EOF / bad frame  │
//!                 ▼               ▼                  │
//!          ┌────────────┐   ┌──────────┐             │
//!          │ Dispatching│   │  Closed  │             │
//!          └──────┬─────┘   └──────────┘             │
//!                 │ reply written and flushed        │
//!                 └──────────────────────────────────┘
//! ```
//!
//! A bad frame closes the connection without a reply. A bad command inside a
//! good frame gets an error reply and the loop carries on.

use crate::commands::CommandHandler;
use crate::protocol::{DecodeError, RespReader, RespValue};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tracing::{debug, info, trace, warn};

/// Handles a single client connection.
///
/// Generic over the transport so that anything byte-stream shaped (a
/// `TcpStream`, an in-memory duplex, a scripted mock) can be served.
pub struct ConnectionHandler<S> {
    reader: RespReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,

    /// Client's address (for logging)
    addr: SocketAddr,

    command_handler: CommandHandler,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    pub fn new(stream: S, addr: SocketAddr, command_handler: CommandHandler) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: RespReader::new(read_half),
            writer: BufWriter::new(write_half),
            addr,
            command_handler,
        }
    }

    /// Runs the connection loop until the client disconnects or an error
    /// occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Decode(DecodeError::Io(io_err)))
            | Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Closing connection"),
        }

        result
    }

    /// The read-execute-respond loop.
    ///
    /// The reply for one request is flushed before the next request is
    /// decoded, so replies always come back in request order.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(request) = self.reader.read_value().await? {
            trace!(client = %self.addr, request = ?request, "Received request");

            let response = self.command_handler.execute(request);
            self.send_response(&response).await?;
        }

        Ok(())
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            error = response.is_error(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Malformed or truncated request, or a failed socket read
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Failed to write a reply
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves a client connection to completion.
///
/// Errors are logged by the handler and go no further: one connection
/// failing never affects another.
pub async fn handle_connection<S>(stream: S, addr: SocketAddr, command_handler: CommandHandler)
where
    S: AsyncRead + AsyncWrite,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler);
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use std::sync::Arc;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn command_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .write(b"$3\r\nbar\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .write(b"$-1\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let mock = Builder::new()
            .read(b"*1\r\n$3\r\nFOO\r\n")
            .write(b"-ERR unknown command 'FOO'\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_requests_in_one_read_are_answered_in_order() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*1\r\n$4\r\nPING\r\n")
            .write(b"+OK\r\n")
            .write(b"$2\r\nv1\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_truncated_frame_closes_without_reply() {
        // No write is scripted: any reply would fail the mock.
        let mock = Builder::new().read(b"*2\r\n$3\r\nGET\r\n$3\r\nfo").build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Decode(DecodeError::UnexpectedEof { .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_after_earlier_replies() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .read(b"?garbage\r\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Decode(DecodeError::Parse(_)))
        ));
    }

    #[tokio::test]
    async fn test_write_failure_ends_connection() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            ))
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), command_handler())
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::Io(_))));
    }

    #[tokio::test]
    async fn test_connections_share_the_store() {
        let handler = command_handler();

        let writer = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .write(b"+OK\r\n")
            .build();
        handle_connection(writer, test_addr(), handler.clone()).await;

        let reader = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .write(b"$3\r\nbar\r\n")
            .build();
        handle_connection(reader, test_addr(), handler).await;
    }
}
