//! Mock collaborators for unit tests.
//!
//! The transport is a loopback stand-in: each injected [`RxTransfer`] is
//! paired with one dummy frame on [`MockBus`], and every enqueued transfer
//! becomes one frame in the TX queue.

use std::collections::{HashMap, VecDeque};

use crate::dronecan::transport::{AcceptFilter, CanBus, Transport};
use crate::dronecan::{CanFrame, DataType, NodeId, Priority, RxTransfer, TransferId, TransferKind, TxTransfer};
use crate::error::{BusError, TransportError};
use crate::node::firmware::is_final_chunk;

use super::events::NodeEvent;
use super::ports::{
    ChunkOutcome, EventSink, FirmwareSink, FirmwareSinkError, ParamStorage, RandomSource,
    StorageError,
};
use super::service::NodeIo;

/// An owned copy of a transfer handed to [`MockTransport::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentTransfer {
    pub data_type: DataType,
    pub kind: TransferKind,
    pub source: Option<NodeId>,
    pub destination: Option<NodeId>,
    pub transfer_id: TransferId,
    pub priority: Priority,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    pub local: Option<NodeId>,
    pub sent: Vec<SentTransfer>,
    pub tx: VecDeque<CanFrame>,
    pub inbound: VecDeque<RxTransfer>,
    pub reject: Option<TransportError>,
    pub rejected: usize,
    pub purged_at: Vec<u64>,
}

impl Transport for MockTransport {
    fn local_node_id(&self) -> Option<NodeId> {
        self.local
    }

    fn set_local_node_id(&mut self, node_id: NodeId) {
        self.local = Some(node_id);
    }

    fn enqueue(&mut self, transfer: &TxTransfer<'_>) -> Result<(), TransportError> {
        if let Some(e) = self.reject {
            return Err(e);
        }
        if self.local.is_none() && transfer.kind != TransferKind::Broadcast {
            return Err(TransportError::NodeIdNotSet);
        }
        self.sent.push(SentTransfer {
            data_type: transfer.data_type,
            kind: transfer.kind,
            source: self.local,
            destination: transfer.destination,
            transfer_id: transfer.transfer_id,
            priority: transfer.priority,
            payload: transfer.payload.to_vec(),
        });
        self.tx.push_back(CanFrame {
            id: u32::from(transfer.data_type.id),
            data: heapless::Vec::new(),
        });
        Ok(())
    }

    fn peek_tx(&self) -> Option<&CanFrame> {
        self.tx.front()
    }

    fn pop_tx(&mut self) {
        self.tx.pop_front();
    }

    fn feed(
        &mut self,
        _frame: &CanFrame,
        timestamp_us: u64,
        filter: &dyn AcceptFilter,
    ) -> Result<Option<RxTransfer>, TransportError> {
        let Some(mut transfer) = self.inbound.pop_front() else {
            return Ok(None);
        };
        if !filter.should_accept(transfer.kind, transfer.data_type_id) {
            self.rejected += 1;
            return Ok(None);
        }
        transfer.timestamp_us = timestamp_us;
        Ok(Some(transfer))
    }

    fn purge_stale(&mut self, timestamp_us: u64) {
        self.purged_at.push(timestamp_us);
    }
}

#[derive(Debug, Default)]
pub struct MockBus {
    pub rx: VecDeque<CanFrame>,
    pub sent: Vec<CanFrame>,
    pub fail_with: Option<BusError>,
}

impl CanBus for MockBus {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.sent.push(frame.clone());
        Ok(())
    }

    fn next_inbound_frame(&mut self) -> Option<CanFrame> {
        self.rx.pop_front()
    }
}

/// In-memory slot store; `fail_with` makes every write fail.
#[derive(Debug, Default)]
pub struct MemStorage {
    pub slots: HashMap<usize, f32>,
    pub fail_with: Option<StorageError>,
}

impl MemStorage {
    pub fn failing(error: StorageError) -> Self {
        Self {
            slots: HashMap::new(),
            fail_with: Some(error),
        }
    }
}

impl ParamStorage for MemStorage {
    fn read_slot(&self, offset: usize) -> Result<f32, StorageError> {
        self.slots.get(&offset).copied().ok_or(StorageError::NotFound)
    }

    fn write_slot(&mut self, offset: usize, value: f32) -> Result<(), StorageError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.slots.insert(offset, value);
        Ok(())
    }
}

/// Always returns the same value.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRng(pub u32);

impl RandomSource for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }
}

/// Firmware sink that records chunk boundaries and completes on a short
/// chunk.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub began: bool,
    pub aborted: bool,
    pub refuse_begin: bool,
    pub fail_with: Option<FirmwareSinkError>,
    pub chunks: Vec<(u32, usize)>,
}

impl FirmwareSink for RecordingSink {
    fn begin(&mut self) -> Result<(), FirmwareSinkError> {
        if self.refuse_begin {
            return Err(FirmwareSinkError::NoSpace);
        }
        self.began = true;
        self.aborted = false;
        self.chunks.clear();
        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<ChunkOutcome, FirmwareSinkError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.chunks.push((offset, data.len()));
        if is_final_chunk(data.len()) {
            Ok(ChunkOutcome::Complete)
        } else {
            Ok(ChunkOutcome::More)
        }
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub events: Vec<NodeEvent>,
}

impl EventSink for RecordingEvents {
    fn emit(&mut self, event: &NodeEvent) {
        self.events.push(event.clone());
    }
}

/// Every mock in one place, lendable as a [`NodeIo`].
#[derive(Debug, Default)]
pub struct TestRig {
    pub bus: MockBus,
    pub transport: MockTransport,
    pub storage: MemStorage,
    pub sink: RecordingSink,
    pub rng: FixedRng,
    pub events: RecordingEvents,
}

impl TestRig {
    pub fn io(&mut self) -> NodeIo<'_> {
        NodeIo {
            bus: &mut self.bus,
            transport: &mut self.transport,
            storage: &mut self.storage,
            firmware: &mut self.sink,
            rng: &mut self.rng,
            events: &mut self.events,
        }
    }

    /// Queue `transfer` to arrive on the next tick.
    pub fn inject(&mut self, transfer: RxTransfer) {
        self.transport.inbound.push_back(transfer);
        self.bus.rx.push_back(CanFrame::default());
    }
}
