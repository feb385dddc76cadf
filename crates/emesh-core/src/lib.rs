//! EventMesh core types.
//!
//! - [`node_id`] - bounded node identities that fit the 16-byte wire field
//! - [`vector_clock`] - causal time as a per-node counter map
//! - [`store`] - the key-value store delivered writes are applied into

pub mod node_id;
pub mod store;
pub mod vector_clock;

pub use node_id::{IdentityError, NodeId, MAX_ID_LEN};
pub use store::{KvStore, MemKv};
pub use vector_clock::{VectorClock, MAX_NODES};
