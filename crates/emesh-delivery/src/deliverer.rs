//! The causal reorder buffer.
//!
//! Every message, whether it arrived from a peer or was originated locally,
//! enters through the same pending set and is applied by the same scan. All
//! state lives behind one lock so submissions, origination and clock
//! snapshots never interleave with a scan in progress.

use crate::metrics::DelivererMetrics;
use emesh_core::{KvStore, NodeId, VectorClock};
use emesh_protocol::{check_clock, CodecError, Command, Header, Message};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A submitted message waiting on its causal dependencies.
#[derive(Debug)]
struct Pending {
    message: Message,
    received_at: Instant,
}

#[derive(Debug, Default)]
struct DeliveryState {
    /// Cumulative delivered knowledge.
    clock: VectorClock,
    /// Messages not yet delivered, in arrival order.
    pending: Vec<Pending>,
}

/// Outcome of evaluating one pending message against the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    Blocked,
    /// Already delivered: a duplicate datagram or our own loopback.
    Stale,
}

/// Buffers out-of-order messages and applies them in causal order.
pub struct CausalDeliverer {
    id: NodeId,
    store: Arc<dyn KvStore>,
    metrics: DelivererMetrics,
    state: Mutex<DeliveryState>,
}

impl CausalDeliverer {
    /// Create a deliverer with an empty clock and empty pending set.
    pub fn new(id: NodeId, store: Arc<dyn KvStore>, metrics: DelivererMetrics) -> Self {
        Self {
            id,
            store,
            metrics,
            state: Mutex::new(DeliveryState::default()),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn metrics(&self) -> &DelivererMetrics {
        &self.metrics
    }

    /// Snapshot of the local clock.
    pub fn copy_clock(&self) -> VectorClock {
        self.state.lock().clock.clone()
    }

    /// Number of messages waiting on causal dependencies.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Queue a message and deliver everything that has become ready.
    ///
    /// Returns the number of messages applied by this call.
    pub fn submit(&self, message: Message) -> usize {
        let mut state = self.state.lock();
        self.enqueue(&mut state, message);
        self.scan(&mut state)
    }

    /// Stamp a locally originated payload and self-deliver it.
    ///
    /// Copying the clock, incrementing our own entry and submitting happen
    /// under one lock acquisition, so no concurrent delivery can slip between
    /// the stamp and the self-delivery. Fails without touching any state if
    /// the stamped clock cannot be encoded.
    pub fn originate(&self, payload: Vec<u8>) -> Result<Message, CodecError> {
        let mut state = self.state.lock();

        let mut clock = state.clock.clone();
        clock.increment(&self.id);
        check_clock(&clock)?;

        let message = Message::new(Header::new(self.id.clone(), clock), payload);
        self.enqueue(&mut state, message.clone());
        self.scan(&mut state);
        Ok(message)
    }

    /// Re-run the delivery scan without a new submission.
    pub fn deliver_ready(&self) -> usize {
        let mut state = self.state.lock();
        self.scan(&mut state)
    }

    fn enqueue(&self, state: &mut DeliveryState, message: Message) {
        self.metrics.recv_bytes.inc_by(message.wire_len() as u64);
        state.pending.push(Pending {
            message,
            received_at: Instant::now(),
        });
    }

    /// Scan the pending set until a full pass makes no progress.
    fn scan(&self, state: &mut DeliveryState) -> usize {
        let mut delivered = 0;

        loop {
            let mut progress = false;
            let mut i = 0;

            while i < state.pending.len() {
                match self.readiness(&state.clock, &state.pending[i].message) {
                    Readiness::Blocked => i += 1,
                    Readiness::Stale => {
                        let entry = state.pending.remove(i);
                        self.metrics.discarded.inc();
                        debug!(
                            node = %self.id,
                            from = %entry.message.sender(),
                            clock = %entry.message.clock(),
                            "discarding already-delivered message"
                        );
                    }
                    Readiness::Ready => {
                        let depth = state.pending.len() - i - 1;
                        let entry = state.pending.remove(i);
                        self.apply(&mut state.clock, &entry.message);

                        self.metrics.reorder_depth.observe(depth as f64);
                        self.metrics
                            .deliver_lag_ms
                            .observe(entry.received_at.elapsed().as_secs_f64() * 1000.0);
                        self.metrics.delivered.inc();

                        delivered += 1;
                        progress = true;
                    }
                }
            }

            if !progress {
                break;
            }
        }

        self.metrics.pending.set(state.pending.len() as i64);
        if !state.pending.is_empty() && delivered == 0 {
            debug!(
                node = %self.id,
                pending = state.pending.len(),
                clock = %state.clock,
                "messages buffered awaiting dependencies"
            );
        }
        delivered
    }

    /// Causal precedence test.
    ///
    /// The message must be the sender's next event, and every other
    /// dependency it carries must already be reflected locally. Our own
    /// entry is skipped: local knowledge of our own sends is never behind.
    fn readiness(&self, local: &VectorClock, message: &Message) -> Readiness {
        let sender = message.sender();
        let clock = message.clock();

        let next = clock.get(sender.as_str());
        let expected = local.get(sender.as_str()).saturating_add(1);
        if next < expected {
            return Readiness::Stale;
        }
        if next > expected {
            return Readiness::Blocked;
        }

        let blocked = clock
            .iter()
            .filter(|(id, _)| *id != sender && **id != self.id)
            .any(|(id, counter)| counter > local.get(id.as_str()));

        if blocked {
            Readiness::Blocked
        } else {
            Readiness::Ready
        }
    }

    /// Advance the clock and apply the payload.
    ///
    /// The clock moves for every ready message, recognized payload or not,
    /// so later messages that depend on this one can still be delivered.
    fn apply(&self, local: &mut VectorClock, message: &Message) {
        local.increment(message.sender());
        local.merge(message.clock());

        match Command::parse(&message.payload) {
            Some(Command::Put { key, value }) => {
                self.store.put(&key, &value);
                info!(
                    node = %self.id,
                    from = %message.sender(),
                    key = %key,
                    value = %value,
                    clock = %local,
                    "delivered"
                );
            }
            None => {
                debug!(
                    node = %self.id,
                    from = %message.sender(),
                    len = message.payload.len(),
                    "ignoring unrecognized payload"
                );
            }
        }
    }
}

impl std::fmt::Debug for CausalDeliverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CausalDeliverer")
            .field("id", &self.id)
            .field("clock", &state.clock)
            .field("pending", &state.pending.len())
            .finish()
    }
}
