//! TCP transport driver.
//!
//! Owns the sockets so the engine never has to: one reader and one
//! writer task per stream, an accept loop in the server role, and a
//! heartbeat ticker. Every path into the engine goes through one async
//! mutex, which is what gives the proxy its single-logical-thread
//! execution model — each event handler runs to completion before the
//! next event is processed.
//!
//! ```text
//! TcpListener ──accept──► attach_stream ──► reader task ──► proxy.on_readable
//!                               │
//!                               └─► writer task ◄── peer's outbound channel
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::peer::PeerId;
use crate::proxy::SignalProxy;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the server role binds to.
    pub bind_addr: String,
    /// Heartbeat period in seconds.
    pub heartbeat_interval_secs: u64,
    /// Size of the per-stream read buffer.
    pub read_buffer_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            heartbeat_interval_secs: 30,
            read_buffer_bytes: 8192,
        }
    }
}

/// Drives one [`SignalProxy`] over real sockets.
pub struct ProxyNode {
    proxy: Arc<Mutex<SignalProxy>>,
    config: NodeConfig,
}

impl ProxyNode {
    pub fn new(proxy: SignalProxy, config: NodeConfig) -> Self {
        Self { proxy: Arc::new(Mutex::new(proxy)), config }
    }

    pub fn with_defaults(proxy: SignalProxy) -> Self {
        Self::new(proxy, NodeConfig::default())
    }

    /// Shared handle to the engine, for API calls between events.
    pub fn proxy(&self) -> Arc<Mutex<SignalProxy>> {
        self.proxy.clone()
    }

    /// Bind and start accepting connections (server role). Returns the
    /// bound address; the accept loop runs until the listener fails.
    pub async fn listen(&self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        log::info!("Proxy listening on {addr}");

        let proxy = self.proxy.clone();
        let read_buffer = self.config.read_buffer_bytes;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        log::debug!("New connection from {peer_addr}");
                        let _ = attach_stream(proxy.clone(), stream, read_buffer).await;
                    }
                    Err(e) => {
                        log::error!("Accept failed: {e}");
                        break;
                    }
                }
            }
        });
        Ok(addr)
    }

    /// Dial the upstream proxy (client role).
    pub async fn connect(&self, addr: &str) -> io::Result<PeerId> {
        let stream = TcpStream::connect(addr).await?;
        log::info!("Connected to {addr}");
        attach_stream(self.proxy.clone(), stream, self.config.read_buffer_bytes)
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "proxy rejected the peer"))
    }

    /// Fire `send_heartbeat` on the configured interval until aborted.
    pub fn start_heartbeat(&self) -> JoinHandle<()> {
        let proxy = self.proxy.clone();
        let period = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reached = proxy.lock().await.send_heartbeat();
                log::trace!("Heartbeat sent to {reached} peers");
            }
        })
    }
}

/// Register a stream with the engine and spawn its reader/writer tasks.
/// Returns `None` if the engine rejected the peer (the stream is
/// dropped, which closes it).
async fn attach_stream(
    proxy: Arc<Mutex<SignalProxy>>,
    stream: TcpStream,
    read_buffer: usize,
) -> Option<PeerId> {
    let peer_id = Uuid::new_v4();
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    if !proxy.lock().await.add_peer(peer_id, tx) {
        return None;
    }

    // Writer: drain the peer's outbound channel into the socket.
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    // Reader: feed the dispatcher until EOF or error, then drop the
    // peer so the engine emits its removal notifications.
    tokio::spawn(async move {
        let mut buf = vec![0u8; read_buffer];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => proxy.lock().await.on_readable(peer_id, &buf[..n]),
            }
        }
        log::debug!("Peer {peer_id} stream closed");
        proxy.lock().await.remove_peer(Some(peer_id));
    });

    Some(peer_id)
}
