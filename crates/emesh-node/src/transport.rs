//! Datagram transport abstractions.

use crate::error::TransportError;
use async_trait::async_trait;
use emesh_protocol::Message;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// A decoded inbound message and the address it came from.
#[derive(Clone, Debug)]
pub struct Datagram {
    pub message: Message,
    pub source: SocketAddr,
}

/// Unreliable, connectionless message transport.
///
/// Sends are fire-and-forget: a successful `send` says nothing about
/// whether the peer received the datagram.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address peers should send to.
    fn local_addr(&self) -> SocketAddr;

    /// Encode and send one message to `to`.
    async fn send(&self, to: SocketAddr, message: &Message) -> Result<(), TransportError>;

    /// Wait for the next inbound datagram.
    ///
    /// Returns [`TransportError::Closed`] once [`close`](Transport::close)
    /// has been called, including for a receive already in progress.
    async fn receive(&self) -> Result<Datagram, TransportError>;

    /// Stop sending and receiving.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Transport over a UDP socket, one message per datagram.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buffer_size: usize,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind a socket on `addr`.
    pub async fn bind(addr: SocketAddr, buffer_size: usize) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let (closed, _) = watch::channel(false);

        Ok(Self {
            socket,
            local_addr,
            buffer_size,
            closed,
        })
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&self, to: SocketAddr, message: &Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let bytes = message.to_bytes().map_err(TransportError::Encode)?;
        self.socket.send_to(&bytes, to).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Datagram, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut buf = vec![0u8; self.buffer_size];
        tokio::select! {
            received = self.socket.recv_from(&mut buf) => {
                let (len, from) = received?;
                let message = Message::from_bytes(&buf[..len])
                    .map_err(|error| TransportError::Decode { from, error })?;
                Ok(Datagram { message, source: from })
            }
            _ = closed.changed() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }
}
