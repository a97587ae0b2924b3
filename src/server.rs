//! TCP accept loop.
//!
//! Spawns one task per accepted connection. Every task gets its own
//! `CommandHandler` over the same shared `StorageEngine`.

use crate::commands::CommandHandler;
use crate::connection::handle_connection;
use crate::storage::StorageEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts connections on `listener` forever.
///
/// A failed `accept` is logged and skipped; it only affects the connection
/// being accepted.
pub async fn run(listener: TcpListener, storage: Arc<StorageEngine>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                tokio::spawn(handle_connection(stream, addr, handler));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RespValue;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());

        tokio::spawn(run(listener, Arc::clone(&storage)));

        (addr, storage)
    }

    /// Writes a request and reads until `expected.len()` bytes have arrived.
    async fn roundtrip(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
        client.write_all(request).await.unwrap();

        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(buf, expected, "reply was {:?}", String::from_utf8_lossy(&buf));
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, storage) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", b"$3\r\nbar\r\n").await;
        roundtrip(
            &mut client,
            b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n",
            b"$-1\r\n",
        )
        .await;

        assert_eq!(storage.get(b"foo"), Some(Bytes::from("bar")));
    }

    #[tokio::test]
    async fn test_set_px_zero_then_get() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\npx\r\n$1\r\n0\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n", b"$-1\r\n").await;
    }

    #[tokio::test]
    async fn test_unknown_command_then_ping() {
        let (addr, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*1\r\n$3\r\nFOO\r\n",
            b"-ERR unknown command 'FOO'\r\n",
        )
        .await;
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_truncated_frame_closes_connection() {
        let (addr, storage) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nba")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        // The server closes its side without replying.
        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
            .await
            .expect("server did not close the connection")
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(storage.get(b"foo"), None);
    }

    #[tokio::test]
    async fn test_connections_are_independent() {
        let (addr, _) = create_test_server().await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        let mut good = TcpStream::connect(addr).await.unwrap();

        bad.write_all(b"!nonsense\r\n").await.unwrap();
        let mut buf = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), bad.read_to_end(&mut buf))
            .await
            .expect("server did not close the bad connection")
            .unwrap();
        assert!(buf.is_empty());

        roundtrip(&mut good, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_concurrent_clients() {
        let (addr, storage) = create_test_server().await;
        let mut tasks = Vec::new();

        for i in 0..8 {
            tasks.push(tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                for j in 0..20 {
                    let key = format!("k{}-{}", i, j);
                    let request = RespValue::array(vec![
                        RespValue::bulk_string(Bytes::from("SET")),
                        RespValue::bulk_string(Bytes::from(key.clone())),
                        RespValue::bulk_string(Bytes::from(key.clone())),
                    ]);
                    roundtrip(&mut client, &request.serialize(), b"+OK\r\n").await;

                    let request = RespValue::array(vec![
                        RespValue::bulk_string(Bytes::from("GET")),
                        RespValue::bulk_string(Bytes::from(key.clone())),
                    ]);
                    let expected = RespValue::bulk_string(Bytes::from(key)).serialize();
                    roundtrip(&mut client, &request.serialize(), &expected).await;
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(storage.len(), 160);
    }
}
