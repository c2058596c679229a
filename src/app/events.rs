//! Outbound node events.
//!
//! The [`NodeService`](super::service::NodeService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them: log to serial, bump counters, etc.

use crate::app::ports::{FirmwareSinkError, StorageError};
use crate::dronecan::NodeId;
use crate::error::{BusError, TransportError};

/// Why a firmware session ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareFailure {
    /// The file server answered with a non-zero `file.Error`.
    ServerError(i16),
    /// The image sink refused a chunk.
    Sink(FirmwareSinkError),
    /// The owning application cancelled the session.
    Cancelled,
}

/// Structured events emitted by the protocol engine.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The service started; carries the static node ID if one was configured.
    Started { node_id: Option<NodeId> },

    /// An allocation request went out carrying unique-ID bytes from `offset`.
    AllocationRequested { preferred: NodeId, offset: usize },

    /// The allocator confirmed the first `matched` bytes of our unique ID.
    AllocationProgress { matched: usize },

    /// The node adopted an allocated address.
    AddressAllocated(NodeId),

    /// A parameter was written and persisted.
    ParamWritten { index: usize, value: f32 },

    /// All parameters were committed to storage.
    ParamsSaved,

    /// All parameters were reset to defaults and committed.
    ParamsErased,

    /// Persisting a parameter slot failed.
    StorageFailed { index: usize, error: StorageError },

    /// A firmware pull session started.
    FirmwareUpdateStarted { server: NodeId },

    /// The firmware image was received completely.
    FirmwareUpdateComplete { bytes: u32 },

    /// A firmware session ended early.
    FirmwareUpdateFailed { offset: u32, reason: FirmwareFailure },

    /// The transport refused an outbound transfer.
    TransmitFailed {
        what: &'static str,
        error: TransportError,
    },

    /// The bus driver refused a frame; it stays queued.
    BusError(BusError),

    /// A peer requested a restart; the loop is about to halt.
    RestartRequested { requester: Option<NodeId> },
}
