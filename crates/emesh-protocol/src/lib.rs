//! EventMesh wire protocol
//!
//! One datagram carries one [`Message`]: a fixed header naming the sender,
//! the sender's vector clock at send time, and an opaque payload.
//!
//! ```text
//! offset 0      : 16 bytes      sender identity (zero-padded)
//! offset 16     : 1 byte        clock entry count N (0..=32)
//! offset 17     : 7 bytes       reserved (zero)
//! offset 24     : N × 24 bytes  { 16 bytes identity, 8 bytes counter (BE) }
//! offset 24+24N : remainder     payload
//! ```
//!
//! Payloads follow the `PUT:<key>:<value>` convention from [`command`], but
//! the codec itself never inspects them.

pub mod codec;
pub mod command;
pub mod error;
pub mod header;

pub use codec::{check_clock, decode, encode, ENTRY_LEN, HEADER_LEN};
pub use command::Command;
pub use error::{CodecError, Result};
pub use header::{Header, Message};
