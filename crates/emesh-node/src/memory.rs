//! In-process datagram network.
//!
//! [`MemoryNetwork`] behaves like UDP on a lossy LAN: datagrams to unknown
//! addresses vanish, a configurable fraction is dropped, and delivery can be
//! held back and released in a chosen order to force reordering. Messages
//! are encoded on send and decoded on receive, so the wire format is
//! exercised exactly as over a socket.

use crate::error::TransportError;
use crate::transport::{Datagram, Transport};
use async_trait::async_trait;
use emesh_protocol::Message;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

const BASE_PORT: u16 = 10_000;

type Inbox = mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>;

/// Order in which held datagrams are released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOrder {
    Fifo,
    Reversed,
    Shuffled(u64),
}

#[derive(Debug)]
struct InFlight {
    from: SocketAddr,
    to: SocketAddr,
    bytes: Vec<u8>,
}

struct NetworkState {
    endpoints: HashMap<SocketAddr, Inbox>,
    next_port: u16,
    /// Datagrams held back while holding is on.
    held: Option<Vec<InFlight>>,
    loss_rate: f64,
    rng: StdRng,
    dropped: usize,
}

impl NetworkState {
    fn deliver(&mut self, datagram: InFlight) {
        if self.loss_rate > 0.0 && self.rng.gen::<f64>() < self.loss_rate {
            self.dropped += 1;
            return;
        }
        match self.endpoints.get(&datagram.to) {
            Some(inbox) => {
                if inbox.send((datagram.bytes, datagram.from)).is_err() {
                    self.dropped += 1;
                }
            }
            None => self.dropped += 1,
        }
    }
}

/// Shared hub connecting [`MemoryTransport`]s.
#[derive(Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_seed(42)
    }

    /// Create a network whose loss decisions follow `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                endpoints: HashMap::new(),
                next_port: BASE_PORT,
                held: None,
                loss_rate: 0.0,
                rng: StdRng::seed_from_u64(seed),
                dropped: 0,
            })),
        }
    }

    /// Attach a new endpoint with a fresh loopback address.
    pub fn bind(&self) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let addr = {
            let mut state = self.state.lock();
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), state.next_port);
            state.next_port += 1;
            state.endpoints.insert(addr, tx);
            addr
        };

        MemoryTransport {
            addr,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
            closed,
        }
    }

    /// Fraction of datagrams silently dropped, from 0.0 to 1.0.
    pub fn set_loss_rate(&self, rate: f64) {
        self.state.lock().loss_rate = rate.clamp(0.0, 1.0);
    }

    /// Hold every datagram sent from now on until released.
    pub fn hold(&self) {
        let mut state = self.state.lock();
        if state.held.is_none() {
            state.held = Some(Vec::new());
        }
    }

    /// Deliver every held datagram in `order` and stop holding.
    pub fn release(&self, order: ReleaseOrder) {
        let mut state = self.state.lock();
        let mut held = state.held.take().unwrap_or_default();
        match order {
            ReleaseOrder::Fifo => {}
            ReleaseOrder::Reversed => held.reverse(),
            ReleaseOrder::Shuffled(seed) => held.shuffle(&mut StdRng::seed_from_u64(seed)),
        }
        for datagram in held {
            state.deliver(datagram);
        }
    }

    /// Deliver held datagrams addressed to `to`, leaving the rest held.
    pub fn release_to(&self, to: SocketAddr) {
        let mut state = self.state.lock();
        let Some(held) = state.held.as_mut() else {
            return;
        };
        let (ready, rest): (Vec<_>, Vec<_>) = held.drain(..).partition(|d| d.to == to);
        *held = rest;
        for datagram in ready {
            state.deliver(datagram);
        }
    }

    /// Send raw bytes as if `from` had put them on the wire.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, bytes: Vec<u8>) {
        self.route(InFlight { from, to, bytes });
    }

    pub fn held_count(&self) -> usize {
        self.state.lock().held.as_ref().map_or(0, Vec::len)
    }

    pub fn dropped_count(&self) -> usize {
        self.state.lock().dropped
    }

    fn route(&self, datagram: InFlight) {
        let mut state = self.state.lock();
        match state.held.as_mut() {
            Some(held) => held.push(datagram),
            None => state.deliver(datagram),
        }
    }

    fn detach(&self, addr: &SocketAddr) {
        self.state.lock().endpoints.remove(addr);
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn send(&self, to: SocketAddr, message: &Message) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let bytes = message.to_bytes().map_err(TransportError::Encode)?;
        self.network.route(InFlight {
            from: self.addr,
            to,
            bytes,
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Datagram, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            received = inbox.recv() => {
                let (bytes, from) = received.ok_or(TransportError::Closed)?;
                let message = Message::from_bytes(&bytes)
                    .map_err(|error| TransportError::Decode { from, error })?;
                Ok(Datagram { message, source: from })
            }
            _ = closed.changed() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        self.network.detach(&self.addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emesh_core::{NodeId, VectorClock};
    use emesh_protocol::{Command, Header};

    fn message(n: u64) -> Message {
        let sender = NodeId::new("mem").unwrap();
        let clock = VectorClock::from_entries([(sender.clone(), n)]);
        Message::new(Header::new(sender, clock), Command::put("x", n.to_string()).to_payload())
    }

    #[tokio::test]
    async fn test_memory_transport() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();
        assert_ne!(a.local_addr(), b.local_addr());

        a.send(b.local_addr(), &message(1)).await.unwrap();
        let datagram = b.receive().await.unwrap();
        assert_eq!(datagram.message, message(1));
        assert_eq!(datagram.source, a.local_addr());
    }

    #[tokio::test]
    async fn test_hold_and_reverse() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();

        network.hold();
        for n in 1..=3 {
            a.send(b.local_addr(), &message(n)).await.unwrap();
        }
        assert_eq!(network.held_count(), 3);

        network.release(ReleaseOrder::Reversed);
        assert_eq!(network.held_count(), 0);
        for n in (1..=3).rev() {
            assert_eq!(b.receive().await.unwrap().message, message(n));
        }
    }

    #[tokio::test]
    async fn test_release_to_one_destination() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();
        let c = network.bind();

        network.hold();
        a.send(b.local_addr(), &message(1)).await.unwrap();
        a.send(c.local_addr(), &message(1)).await.unwrap();

        network.release_to(c.local_addr());
        assert_eq!(network.held_count(), 1);
        assert_eq!(c.receive().await.unwrap().message, message(1));
    }

    #[tokio::test]
    async fn test_total_loss_and_unknown_destination() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();

        network.set_loss_rate(1.0);
        a.send(b.local_addr(), &message(1)).await.unwrap();
        network.set_loss_rate(0.0);
        a.send("127.0.0.1:1".parse().unwrap(), &message(1)).await.unwrap();

        assert_eq!(network.dropped_count(), 2);
    }

    #[tokio::test]
    async fn test_garbage_is_a_decode_error() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();

        network.inject(a.local_addr(), b.local_addr(), vec![1, 2, 3]);
        assert!(matches!(
            b.receive().await,
            Err(TransportError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_close() {
        let network = MemoryNetwork::new();
        let a = network.bind();
        let b = network.bind();

        b.close().await.unwrap();
        assert!(matches!(b.receive().await, Err(TransportError::Closed)));

        // the closed endpoint no longer accepts traffic
        a.send(b.local_addr(), &message(1)).await.unwrap();
        assert_eq!(network.dropped_count(), 1);
    }
}
