//! Collaborator traits at the frame and transfer boundaries.
//!
//! Concrete implementations live outside this crate:
//! - [`CanBus`]: the controller driver (TWAI on ESP32, bxCAN, SocketCAN…)
//! - [`Transport`]: a libcanard-style transfer layer that splits outbound
//!   transfers into frames and reassembles inbound frames into transfers
//!
//! The node engine is written against `dyn` references to both, so swapping
//! the driver or the transfer layer needs no change in protocol logic.

use super::{CanFrame, DataType, NodeId, RxTransfer, TransferKind, TxTransfer};
use crate::error::{BusError, TransportError};

/// Frame-level bus access. Both calls are non-blocking.
pub trait CanBus {
    /// Hand one frame to the controller.
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), BusError>;

    /// Take the next received frame, if any.
    fn next_inbound_frame(&mut self) -> Option<CanFrame>;
}

/// Decides which transfers the transport should bother reassembling.
///
/// Returning the [`DataType`] (rather than a bare `bool`) hands the
/// transport the signature it needs to verify the multi-frame CRC.
pub trait AcceptFilter {
    fn accept(&self, kind: TransferKind, data_type_id: u16) -> Option<DataType>;

    fn should_accept(&self, kind: TransferKind, data_type_id: u16) -> bool {
        self.accept(kind, data_type_id).is_some()
    }
}

/// Transfer layer: outbound queue plus inbound reassembly.
pub trait Transport {
    /// Address stamped on outbound frames; `None` sends anonymously.
    fn local_node_id(&self) -> Option<NodeId>;

    fn set_local_node_id(&mut self, node_id: NodeId);

    /// Split a transfer into frames and append them to the TX queue.
    fn enqueue(&mut self, transfer: &TxTransfer<'_>) -> Result<(), TransportError>;

    /// Oldest queued frame, left in place.
    fn peek_tx(&self) -> Option<&CanFrame>;

    /// Drop the oldest queued frame after it was sent.
    fn pop_tx(&mut self);

    /// Feed one received frame. Returns a transfer once its last frame
    /// arrives and `filter` accepted it.
    fn feed(
        &mut self,
        frame: &CanFrame,
        timestamp_us: u64,
        filter: &dyn AcceptFilter,
    ) -> Result<Option<RxTransfer>, TransportError>;

    /// Discard partially reassembled transfers older than the transfer
    /// timeout.
    fn purge_stale(&mut self, timestamp_us: u64);
}

/// A bus that discards all writes and never receives.
/// Useful for bench-testing a node without a transceiver.
pub struct NullBus;

impl CanBus for NullBus {
    fn send_frame(&mut self, _frame: &CanFrame) -> Result<(), BusError> {
        Ok(())
    }

    fn next_inbound_frame(&mut self) -> Option<CanFrame> {
        None
    }
}
