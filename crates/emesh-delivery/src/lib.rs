//! EventMesh causal delivery
//!
//! Messages arrive over an unreliable transport in any order. The
//! [`CausalDeliverer`] buffers each one until everything it causally depends
//! on has been applied, then applies it to the local store.
//!
//! ## Delivery rule
//!
//! ```text
//! On submit(m) from sender s with clock c:
//!   P := P ∪ {m}
//!   repeat
//!     for each m' ∈ P with ready(m'):
//!       V[s'] := V[s'] + 1
//!       V := V ⊔ c'
//!       apply payload(m')
//!       P := P \ {m'}
//!   until no progress
//!
//! ready(m) ⟺ c[s] = V[s] + 1  ∧  ∀k ∉ {s, self}: c[k] ≤ V[k]
//! ```
//!
//! Delivering one message can unblock others that were waiting on it, which
//! is why the scan runs to a fixpoint rather than a single pass.

pub mod deliverer;
pub mod metrics;

pub use deliverer::CausalDeliverer;
pub use metrics::DelivererMetrics;
