//! UDP broadcast command channel
//!
//! One-way and unreliable: the master fires each message at the broadcast
//! address a few times and never waits for an answer. Slaves bind the sync
//! port and decode whatever arrives. Delivery is best-effort by design;
//! heartbeats and the slave watchdog cover the gaps.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::protocol::{self, CodecError, CommandMessage, MAX_DATAGRAM_SIZE};

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind socket on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("Could not resolve address {0}")]
    Resolve(String),
    #[error("Send failed: {0}")]
    Send(std::io::Error),
    #[error("Receive failed: {0}")]
    Receive(std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// How hard a single logical broadcast tries: `repeat` sends spaced by
/// `spacing`, with no acknowledgement and no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub repeat: u32,
    pub spacing: Duration,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            repeat: 3,
            spacing: Duration::from_millis(50),
        }
    }
}

/// Resolve `host:port` to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let lookup = format!("{host}:{port}");
    let mut addrs = tokio::net::lookup_host(lookup.clone())
        .await
        .map_err(|_| TransportError::Resolve(lookup.clone()))?;
    addrs.next().ok_or(TransportError::Resolve(lookup))
}

// ============================================================================
// Sending side (master)
// ============================================================================

pub struct CommandChannel {
    policy: BroadcastPolicy,
    socket: UdpSocket,
    target: SocketAddr,
}

impl CommandChannel {
    /// Open an ephemeral broadcast-enabled socket aimed at `target`.
    pub async fn open(target: SocketAddr, policy: BroadcastPolicy) -> Result<Self, TransportError> {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;
        socket
            .set_broadcast(true)
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;

        debug!(target = %target, repeat = policy.repeat, "Command channel open");
        Ok(Self {
            policy,
            socket,
            target,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send `message` according to the broadcast policy.
    ///
    /// Succeeds if at least one copy left the socket; otherwise returns the
    /// last send error.
    pub async fn broadcast(&self, message: &CommandMessage) -> Result<(), TransportError> {
        let payload = protocol::encode(message)?;
        let mut last_error = None;
        let mut delivered = 0;

        for attempt in 0..self.policy.repeat {
            match self.socket.send_to(&payload, self.target).await {
                Ok(_) => delivered += 1,
                Err(e) => last_error = Some(e),
            }
            if attempt + 1 < self.policy.repeat && !self.policy.spacing.is_zero() {
                tokio::time::sleep(self.policy.spacing).await;
            }
        }

        trace!(command = %message.command, delivered, "Broadcast sent");
        match (delivered, last_error) {
            (0, Some(e)) => Err(TransportError::Send(e)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("target", &self.target)
            .field("policy", &self.policy)
            .finish()
    }
}

// ============================================================================
// Receiving side (slave)
// ============================================================================

pub struct CommandListener {
    socket: UdpSocket,
}

impl CommandListener {
    /// Bind the sync port with `SO_REUSEADDR`, so a restarted slave can take
    /// the port back immediately.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = reusable_socket(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Receive)
    }

    /// Wait for the next datagram and decode it.
    ///
    /// A datagram that does not decode yields `TransportError::Codec`; the
    /// socket stays usable.
    pub async fn recv(&self) -> Result<(CommandMessage, SocketAddr), TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::Receive)?;
        let message = protocol::decode(&buf[..len])?;
        Ok((message, from))
    }
}

fn reusable_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}
