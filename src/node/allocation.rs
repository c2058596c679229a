//! Dynamic node ID allocation client (allocatee side).
//!
//! ```text
//!   Unresolved { matched: 0 } ──partial match──▶ Unresolved { matched: k }
//!        ▲                                              │
//!        └──────── mismatch / collision / request ◀─────┘
//!                                                       │ full 16-byte match
//!                                                       ▼
//!                                               Resolved(node_id)
//! ```
//!
//! Each request carries the preferred ID and up to six unique-ID bytes
//! starting at the confirmed prefix. The allocator answers with the prefix
//! it has accumulated so far; once it echoes all sixteen bytes it also
//! carries the assigned node ID.
//!
//! The next-request deadline is rescheduled with a random extra delay
//! after every request and on every allocation message seen on the bus,
//! so several allocatees booting together spread out.

use log::{debug, info, trace};

use crate::app::ports::RandomSource;
use crate::dronecan::messages::{Allocation, Message, UNIQUE_ID_LEN, UniqueIdBytes};
use crate::dronecan::transport::Transport;
use crate::dronecan::{NodeId, Priority, RxTransfer, TransferId, TransferKind, TxTransfer, truncated};
use crate::error::TransportError;
use crate::scheduler::Millis;

use super::identity::UniqueId;

/// Unique-ID bytes carried by one request.
pub const MAX_UNIQUE_ID_BYTES_PER_REQUEST: usize = 6;

/// Request pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTiming {
    pub min_request_period_ms: u32,
    pub max_followup_delay_ms: u32,
}

impl Default for AllocationTiming {
    fn default() -> Self {
        Self {
            min_request_period_ms: 600,
            max_followup_delay_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    Unresolved {
        /// Unique-ID bytes the allocator has confirmed so far.
        matched: usize,
        /// `None` until the first request, which goes out immediately.
        next_request_at: Option<Millis>,
    },
    Resolved(NodeId),
}

/// What an allocation broadcast did to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationProgress {
    /// Already resolved, malformed, or carrying an unusable node ID.
    Ignored,
    /// Another anonymous allocatee is talking; progress was reset.
    Collision,
    /// The echoed unique ID is not ours; progress was reset.
    Mismatch,
    /// The allocator confirmed the first `matched` bytes.
    Partial { matched: usize },
    /// Handshake complete.
    Allocated(NodeId),
}

/// A request that was handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRequest {
    pub preferred: NodeId,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct AllocationClient {
    state: AllocationState,
    preferred: NodeId,
    timing: AllocationTiming,
    transfer_id: TransferId,
}

impl AllocationClient {
    /// A client for a node that has no address yet. With a static address
    /// the client starts resolved and never transmits.
    pub fn new(preferred: NodeId, static_node_id: Option<NodeId>, timing: AllocationTiming) -> Self {
        let state = match static_node_id {
            Some(id) => AllocationState::Resolved(id),
            None => AllocationState::Unresolved {
                matched: 0,
                next_request_at: None,
            },
        };
        Self {
            state,
            preferred,
            timing,
            transfer_id: TransferId::default(),
        }
    }

    pub fn state(&self) -> AllocationState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, AllocationState::Resolved(_))
    }

    pub fn allocated(&self) -> Option<NodeId> {
        match self.state {
            AllocationState::Resolved(id) => Some(id),
            AllocationState::Unresolved { .. } => None,
        }
    }

    /// Confirmed prefix length; 0 once resolved.
    pub fn matched_prefix_len(&self) -> usize {
        match self.state {
            AllocationState::Unresolved { matched, .. } => matched,
            AllocationState::Resolved(_) => 0,
        }
    }

    pub fn preferred(&self) -> NodeId {
        self.preferred
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }

    fn jittered_deadline(&self, now: Millis, rng: &mut dyn RandomSource) -> Millis {
        let jitter = match self.timing.max_followup_delay_ms {
            0 => 0,
            max => rng.next_u32() % max,
        };
        now.add(self.timing.min_request_period_ms).add(jitter)
    }

    /// Send the next request if its deadline has passed.
    ///
    /// Progress is reset and the deadline rescheduled before the transfer
    /// is queued, so a lost reply only costs one period. The transfer ID
    /// advances only when the transport accepts the transfer.
    pub fn tick(
        &mut self,
        now: Millis,
        unique_id: &UniqueId,
        transport: &mut dyn Transport,
        rng: &mut dyn RandomSource,
    ) -> Result<Option<AllocationRequest>, TransportError> {
        let AllocationState::Unresolved {
            matched,
            next_request_at,
        } = self.state
        else {
            return Ok(None);
        };
        if next_request_at.is_some_and(|deadline| now.is_before(deadline)) {
            return Ok(None);
        }

        let offset = matched.min(UNIQUE_ID_LEN);
        let end = (offset + MAX_UNIQUE_ID_BYTES_PER_REQUEST).min(UNIQUE_ID_LEN);
        let slice: UniqueIdBytes = truncated(&unique_id.as_bytes()[offset..end]);
        let payload = Allocation {
            node_id: self.preferred.get(),
            first_part_of_unique_id: offset == 0,
            unique_id: slice,
        }
        .encode();

        self.state = AllocationState::Unresolved {
            matched: 0,
            next_request_at: Some(self.jittered_deadline(now, rng)),
        };

        transport.enqueue(&TxTransfer {
            data_type: Allocation::DATA_TYPE,
            kind: TransferKind::Broadcast,
            destination: None,
            transfer_id: self.transfer_id,
            priority: Priority::LOW,
            payload: &payload,
        })?;
        self.transfer_id = self.transfer_id.next();

        debug!(
            "Allocation: requested {} with unique-ID bytes {}..{}",
            self.preferred, offset, end
        );
        Ok(Some(AllocationRequest {
            preferred: self.preferred,
            offset,
        }))
    }

    /// Process an allocation message seen on the bus.
    pub fn on_allocation_broadcast(
        &mut self,
        transfer: &RxTransfer,
        unique_id: &UniqueId,
        now: Millis,
        rng: &mut dyn RandomSource,
    ) -> AllocationProgress {
        let AllocationState::Unresolved { matched, .. } = self.state else {
            return AllocationProgress::Ignored;
        };

        if transfer.source.is_none() {
            trace!("Allocation: anonymous request from another allocatee");
            self.state = AllocationState::Unresolved {
                matched: 0,
                next_request_at: Some(self.jittered_deadline(now, rng)),
            };
            return AllocationProgress::Collision;
        }

        let Ok(msg) = Allocation::decode(&transfer.payload) else {
            debug!("Allocation: malformed response dropped");
            return AllocationProgress::Ignored;
        };

        let deadline = self.jittered_deadline(now, rng);
        let received = msg.unique_id.as_slice();
        if unique_id.as_bytes()[..received.len()] != *received {
            trace!("Allocation: response for another node");
            self.state = AllocationState::Unresolved {
                matched: 0,
                next_request_at: Some(deadline),
            };
            return AllocationProgress::Mismatch;
        }

        if received.len() < UNIQUE_ID_LEN {
            let confirmed = matched.max(received.len());
            debug!("Allocation: {} of {} bytes confirmed", confirmed, UNIQUE_ID_LEN);
            self.state = AllocationState::Unresolved {
                matched: confirmed,
                next_request_at: Some(deadline.sub(self.timing.min_request_period_ms)),
            };
            return AllocationProgress::Partial { matched: confirmed };
        }

        match NodeId::new(msg.node_id) {
            Some(id) => {
                info!("Allocation: node ID {} allocated", id);
                self.state = AllocationState::Resolved(id);
                AllocationProgress::Allocated(id)
            }
            None => {
                debug!("Allocation: full match with unusable node ID {}", msg.node_id);
                self.state = AllocationState::Unresolved {
                    matched,
                    next_request_at: Some(deadline),
                };
                AllocationProgress::Ignored
            }
        }
    }
}
