//! Message header and message types.

use emesh_core::{NodeId, VectorClock};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender identity plus the sender's clock snapshot at send time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub sender: NodeId,
    pub clock: VectorClock,
}

impl Header {
    pub fn new(sender: NodeId, clock: VectorClock) -> Self {
        Self { sender, clock }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Header{{From:{}, Clock:{}}}", self.sender, self.clock)
    }
}

/// A broadcast write as it travels between nodes.
///
/// The clock records the sender's complete causal knowledge after it
/// incremented its own counter for this message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn sender(&self) -> &NodeId {
        &self.header.sender
    }

    pub fn clock(&self) -> &VectorClock {
        &self.header.clock
    }

    /// Encode into a single datagram.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        crate::codec::encode(&self.header, &self.payload)
    }

    /// Decode a single datagram.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let (header, payload) = crate::codec::decode(bytes)?;
        Ok(Self { header, payload })
    }

    /// Size of this message on the wire.
    pub fn wire_len(&self) -> usize {
        crate::codec::HEADER_LEN + crate::codec::ENTRY_LEN * self.header.clock.len() + self.payload.len()
    }
}
