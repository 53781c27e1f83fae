//! Outbound peer connections
//!
//! A peer is an address plus an optional live TCP connection. Writes
//! to a peer go through its own mutex so concurrent broadcasts cannot
//! interleave frames on the wire.

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A remote node this node pushes gossip to
pub struct Peer {
    pub address: String,
    conn: Mutex<Option<TcpStream>>,
}

impl Peer {
    /// Dial the peer and hold the connection for later sends
    pub async fn connect(address: &str) -> Result<Self, PeerError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            address: address.to_string(),
            conn: Mutex::new(Some(stream)),
        })
    }

    /// Write one message line (a newline is appended) under this
    /// peer's send lock
    pub async fn send_line(&self, line: &str) -> Result<(), PeerError> {
        let mut guard = self.conn.lock().await;
        let stream = guard.as_mut().ok_or(PeerError::NotConnected)?;

        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        Ok(())
    }

    /// Shut the connection down
    pub async fn close(&self) {
        if let Some(mut stream) = self.conn.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let peer = Peer::connect(&addr.to_string()).await.unwrap();
        peer.send_line("hello").await.unwrap();
        peer.close().await;

        assert_eq!(accept.await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Port 1 is essentially never listening
        assert!(matches!(
            Peer::connect("127.0.0.1:1").await,
            Err(PeerError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = Peer::connect(&addr.to_string()).await.unwrap();
        peer.close().await;

        assert!(matches!(
            peer.send_line("hello").await,
            Err(PeerError::NotConnected)
        ));
    }
}
