//! Datagram encoding.
//!
//! All multi-byte integers are big-endian. The payload length is implicit:
//! whatever follows the clock section belongs to the payload.

use crate::error::{CodecError, Result};
use crate::header::Header;
use emesh_core::{NodeId, VectorClock, MAX_ID_LEN, MAX_NODES};

/// Fixed part: identity, entry count, reserved padding.
pub const HEADER_LEN: usize = 24;
/// One clock entry: identity plus counter.
pub const ENTRY_LEN: usize = MAX_ID_LEN + 8;

const COUNT_OFFSET: usize = MAX_ID_LEN;

/// Reject clocks that do not fit the one-byte entry count.
pub fn check_clock(clock: &VectorClock) -> Result<()> {
    if clock.len() > MAX_NODES {
        return Err(CodecError::OversizedClock {
            entries: clock.len(),
        });
    }
    Ok(())
}

/// Encode a header and payload into one datagram.
pub fn encode(header: &Header, payload: &[u8]) -> Result<Vec<u8>> {
    check_clock(&header.clock)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * header.clock.len() + payload.len());
    put_identity(&mut buf, header.sender.as_bytes());
    buf.push(header.clock.len() as u8);
    buf.extend_from_slice(&[0u8; HEADER_LEN - COUNT_OFFSET - 1]);

    for (id, counter) in header.clock.iter() {
        put_identity(&mut buf, id.as_bytes());
        buf.extend_from_slice(&counter.to_be_bytes());
    }

    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode one datagram into its header and payload.
///
/// Purely structural: the payload is returned as-is.
pub fn decode(bytes: &[u8]) -> Result<(Header, Vec<u8>)> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::ShortHeader { len: bytes.len() });
    }

    let sender = read_identity(&bytes[..MAX_ID_LEN])?;
    let count = bytes[COUNT_OFFSET] as usize;
    if count > MAX_NODES {
        return Err(CodecError::OversizedClock { entries: count });
    }

    let clock_end = HEADER_LEN + ENTRY_LEN * count;
    if bytes.len() < clock_end {
        return Err(CodecError::TruncatedMessage {
            expected: clock_end,
            actual: bytes.len(),
        });
    }

    let mut clock = VectorClock::new();
    for entry in bytes[HEADER_LEN..clock_end].chunks_exact(ENTRY_LEN) {
        let id = read_identity(&entry[..MAX_ID_LEN])?;
        clock.observe(id, read_u64(&entry[MAX_ID_LEN..]));
    }

    Ok((Header::new(sender, clock), bytes[clock_end..].to_vec()))
}

/// Write an identity into a zero-padded field, truncating anything past it.
fn put_identity(buf: &mut Vec<u8>, id: &[u8]) {
    let mut field = [0u8; MAX_ID_LEN];
    let len = id.len().min(MAX_ID_LEN);
    field[..len].copy_from_slice(&id[..len]);
    buf.extend_from_slice(&field);
}

fn read_identity(field: &[u8]) -> Result<NodeId> {
    let end = field
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let id = std::str::from_utf8(&field[..end])
        .map_err(|e| CodecError::InvalidIdentity(e.to_string()))?;
    NodeId::new(id).map_err(|e| CodecError::InvalidIdentity(e.to_string()))
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(raw)
}
