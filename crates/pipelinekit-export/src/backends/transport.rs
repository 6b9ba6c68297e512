//! Abstract send surface for the StatsD backend, so tests can swap in an
//! in-memory transport instead of a real UDP socket.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::UdpSocket;

/// Something the StatsD backend can hand encoded packets to.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one encoded packet.
    async fn send(&self, bytes: &[u8]) -> io::Result<()>;

    /// Sends multiple packets; the default implementation calls
    /// [`Transport::send`] once per packet.
    async fn send_batch(&self, packets: &[Vec<u8>]) -> io::Result<()> {
        for packet in packets {
            self.send(packet).await?;
        }
        Ok(())
    }
}

/// Non-blocking UDP with a lazily established "connection" (UDP is
/// connectionless; `connect` here just fixes the peer address for `send`,
/// deferred until first use so constructing the exporter never blocks on
/// DNS or socket setup).
pub struct UdpTransport {
    addr: SocketAddr,
    socket: tokio::sync::OnceCell<UdpSocket>,
}

impl UdpTransport {
    /// Targets `addr`; the underlying socket is bound and connected on first
    /// send.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            socket: tokio::sync::OnceCell::new(),
        }
    }

    async fn socket(&self) -> io::Result<&UdpSocket> {
        self.socket
            .get_or_try_init(|| async {
                let bind_addr: SocketAddr = if self.addr.is_ipv6() {
                    "[::]:0".parse().unwrap()
                } else {
                    "0.0.0.0:0".parse().unwrap()
                };
                let socket = UdpSocket::bind(bind_addr).await?;
                socket.connect(self.addr).await?;
                Ok(socket)
            })
            .await
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let socket = self.socket().await?;
        socket.send(bytes).await.map(|_| ())
    }
}

/// An in-memory transport for tests: every packet is appended to an internal
/// buffer instead of hitting the network.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    /// Builds an empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every packet sent so far, decoded as UTF-8 lossily (StatsD packets
    /// are always ASCII/UTF-8 in practice).
    #[must_use]
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}
