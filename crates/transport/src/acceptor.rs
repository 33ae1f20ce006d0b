//! Connection intake: raw accepts, isolated handshakes, ready queue

use crate::{handshake, ChannelError, SecureChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vigil_crypto::RsaKeyPair;

/// A connection that has completed the accepting-role handshake
pub struct ServerConnection {
    pub channel: SecureChannel<TcpStream>,
    pub peer_addr: SocketAddr,
}

/// Listens for raw connections and publishes only handshaken ones.
///
/// Each raw connection gets its own task for the handshake, so a slow
/// or hostile peer cannot stall the others. The acceptor owns the
/// long-lived RSA keypair; its lifetime equals the listening
/// endpoint's, and it is regenerated on restart (trust-on-first-use).
pub struct Acceptor {
    ready: UnboundedReceiver<ServerConnection>,
    local_addr: SocketAddr,
}

impl Acceptor {
    pub async fn bind(
        addr: SocketAddr,
        handshake_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        // RSA generation is CPU-bound; keep it off the runtime threads.
        let keypair = tokio::task::spawn_blocking(RsaKeyPair::generate)
            .await
            .map_err(|e| ChannelError::Handshake(format!("keypair task failed: {e}")))?
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        let keypair = Arc::new(keypair);

        info!(%local_addr, "listening");

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, keypair, ready_tx, handshake_timeout));

        Ok(Self {
            ready: ready_rx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next handshaken connection.
    ///
    /// Returns `None` only once the listener task has shut down.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.ready.recv().await
    }
}

async fn accept_loop(
    listener: TcpListener,
    keypair: Arc<RsaKeyPair>,
    ready_tx: UnboundedSender<ServerConnection>,
    handshake_timeout: Duration,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        debug!(%peer_addr, "raw connection");

        if ready_tx.is_closed() {
            break;
        }

        let keypair = keypair.clone();
        let ready_tx = ready_tx.clone();
        tokio::spawn(async move {
            handshake_one(stream, peer_addr, &keypair, handshake_timeout, ready_tx).await;
        });
    }
}

/// Run one accepting-role handshake in isolation.
///
/// Failures are logged and dropped; the consumer never sees them.
async fn handshake_one(
    stream: TcpStream,
    peer_addr: SocketAddr,
    keypair: &RsaKeyPair,
    handshake_timeout: Duration,
    ready_tx: UnboundedSender<ServerConnection>,
) {
    let mut channel = SecureChannel::new(stream);

    match timeout(handshake_timeout, handshake::accept(&mut channel, keypair)).await {
        Ok(Ok(())) => {
            debug!(%peer_addr, "handshake complete");
            if ready_tx
                .send(ServerConnection { channel, peer_addr })
                .is_err()
            {
                debug!(%peer_addr, "consumer gone, dropping connection");
            }
        }
        Ok(Err(e)) => warn!(%peer_addr, "handshake failed: {e}"),
        Err(_) => warn!(%peer_addr, "handshake timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_protocol::{Message, Packet, Response};

    #[tokio::test]
    async fn test_published_connections_are_encrypted() {
        let mut acceptor = Acceptor::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
            .await
            .unwrap();
        let addr = acceptor.local_addr();

        let client_task = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut channel = SecureChannel::new(stream);
            handshake::initiate(&mut channel).await.unwrap();
            channel
        });

        let mut conn = acceptor.accept().await.unwrap();
        assert!(conn.channel.is_encrypted());

        let mut client = client_task.await.unwrap();
        let packet = Packet::new(Message::Response(Response {
            success: true,
            message: "ready".into(),
        }));
        conn.channel.send(&packet).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), packet);
    }

    #[tokio::test]
    async fn test_failed_handshake_never_published() {
        let mut acceptor = Acceptor::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
            .await
            .unwrap();
        let addr = acceptor.local_addr();

        // First peer talks garbage; second behaves. Only the second
        // may come out of the queue.
        let bad = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"not a packet\n").await.unwrap();
        });
        bad.await.unwrap();

        let good = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut channel = SecureChannel::new(stream);
            handshake::initiate(&mut channel).await.unwrap();
        });

        let conn = acceptor.accept().await.unwrap();
        assert!(conn.channel.is_encrypted());
        good.await.unwrap();
    }
}
