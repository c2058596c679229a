//! Mock bus collaborators for integration tests.
//!
//! `LoopbackTransport` stands in for the frame splitter: every injected
//! transfer arrives with one dummy frame on `MockBus`, and every enqueued
//! transfer is recorded whole. `Harness` owns a node plus every mock and
//! drives it on a virtual millisecond clock.

use std::collections::VecDeque;

use cannode::adapters::nvs::NvsAdapter;
use cannode::app::events::NodeEvent;
use cannode::app::ports::{
    ChunkOutcome, EventSink, FirmwareSink, FirmwareSinkError, RandomSource,
};
use cannode::app::service::{NodeIo, NodeService};
use cannode::config::NodeConfig;
use cannode::dronecan::messages::{Message, UNIQUE_ID_LEN};
use cannode::dronecan::transport::{AcceptFilter, CanBus, Transport};
use cannode::dronecan::{
    CanFrame, DataType, NodeId, Priority, RxTransfer, TransferId, TransferKind, TxTransfer,
};
use cannode::error::{BusError, Fatal, TransportError};
use cannode::node::firmware::is_final_chunk;
use cannode::node::identity::UniqueId;
use cannode::runtime;
use cannode::scheduler::Instant;

// ── Recorded outbound transfer ────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub data_type: DataType,
    pub kind: TransferKind,
    pub source: Option<NodeId>,
    pub destination: Option<NodeId>,
    pub transfer_id: TransferId,
    pub priority: Priority,
    pub payload: Vec<u8>,
}

#[allow(dead_code)]
impl Sent {
    pub fn decode<M: Message>(&self) -> M {
        M::decode(&self.payload).unwrap()
    }
}

// ── LoopbackTransport ─────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LoopbackTransport {
    pub local: Option<NodeId>,
    pub sent: Vec<Sent>,
    pub tx: VecDeque<CanFrame>,
    pub inbound: VecDeque<RxTransfer>,
    pub reject: Option<TransportError>,
}

impl Transport for LoopbackTransport {
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
        self.sent.push(Sent {
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
            return Ok(None);
        }
        transfer.timestamp_us = timestamp_us;
        Ok(Some(transfer))
    }

    fn purge_stale(&mut self, _timestamp_us: u64) {}
}

// ── MockBus ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockBus {
    pub rx: VecDeque<CanFrame>,
    pub frames_sent: usize,
    pub fail_with: Option<BusError>,
}

impl CanBus for MockBus {
    fn send_frame(&mut self, _frame: &CanFrame) -> Result<(), BusError> {
        match self.fail_with {
            Some(e) => Err(e),
            None => {
                self.frames_sent += 1;
                Ok(())
            }
        }
    }

    fn next_inbound_frame(&mut self) -> Option<CanFrame> {
        self.rx.pop_front()
    }
}

// ── Entropy, firmware sink, events ────────────────────────────

#[derive(Debug, Default)]
pub struct FixedRng(pub u32);

impl RandomSource for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }
}

/// Keeps the pulled image in memory.
#[derive(Debug, Default)]
pub struct MemImage {
    pub image: Vec<u8>,
    pub open: bool,
    pub complete: bool,
    pub aborts: usize,
}

impl FirmwareSink for MemImage {
    fn begin(&mut self) -> Result<(), FirmwareSinkError> {
        self.image.clear();
        self.open = true;
        self.complete = false;
        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<ChunkOutcome, FirmwareSinkError> {
        if !self.open {
            return Err(FirmwareSinkError::NotReceiving);
        }
        if offset as usize != self.image.len() {
            return Err(FirmwareSinkError::NonSequential);
        }
        self.image.extend_from_slice(data);
        if is_final_chunk(data.len()) {
            self.open = false;
            self.complete = true;
            Ok(ChunkOutcome::Complete)
        } else {
            Ok(ChunkOutcome::More)
        }
    }

    fn abort(&mut self) {
        self.open = false;
        self.aborts += 1;
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

// ── Harness ───────────────────────────────────────────────────

pub fn test_uid() -> UniqueId {
    let mut raw = [0u8; UNIQUE_ID_LEN];
    for (i, b) in raw.iter_mut().enumerate() {
        *b = 0x10 + i as u8;
    }
    UniqueId(raw)
}

pub struct Harness {
    pub node: NodeService,
    pub bus: MockBus,
    pub transport: LoopbackTransport,
    pub storage: NvsAdapter,
    pub image: MemImage,
    pub rng: FixedRng,
    pub events: RecordingEvents,
}

#[allow(dead_code)]
impl Harness {
    /// Boot through [`runtime::boot`] with `config` already stored in NVS.
    pub fn boot(config: NodeConfig) -> Self {
        let storage = NvsAdapter::new().unwrap();
        cannode::app::ports::ConfigPort::save(&storage, &config).unwrap();
        Self::boot_with_storage(storage)
    }

    pub fn boot_with_storage(storage: NvsAdapter) -> Self {
        let node = runtime::boot(&storage, &storage, test_uid()).unwrap();
        let mut harness = Self {
            node,
            bus: MockBus::default(),
            transport: LoopbackTransport::default(),
            storage,
            image: MemImage::default(),
            rng: FixedRng::default(),
            events: RecordingEvents::default(),
        };
        harness.node.start(&mut harness.transport, &mut harness.events);
        harness
    }

    pub fn allocated(node_id: u8) -> Self {
        Self::boot(NodeConfig {
            static_node_id: Some(node_id),
            ..NodeConfig::default()
        })
    }

    /// Queue `transfer` for the next tick.
    pub fn inject(&mut self, transfer: RxTransfer) {
        self.transport.inbound.push_back(transfer);
        self.bus.rx.push_back(CanFrame::default());
    }

    pub fn tick_at(&mut self, ms: u64) -> Result<(), Fatal> {
        let mut io = NodeIo {
            bus: &mut self.bus,
            transport: &mut self.transport,
            storage: &mut self.storage,
            firmware: &mut self.image,
            rng: &mut self.rng,
            events: &mut self.events,
        };
        self.node.tick(Instant::from_millis(ms), &mut io)
    }

    /// Outbound transfers of one data type, oldest first.
    pub fn sent(&self, data_type: DataType, kind: TransferKind) -> Vec<&Sent> {
        self.transport
            .sent
            .iter()
            .filter(|s| s.data_type == data_type && s.kind == kind)
            .collect()
    }

    pub fn clear_sent(&mut self) {
        self.transport.sent.clear();
    }
}

pub fn request(data_type: DataType, from: u8, tid: u8, payload: &[u8]) -> RxTransfer {
    RxTransfer::new(
        TransferKind::Request,
        data_type.id,
        NodeId::new(from),
        TransferId::new(tid),
        Priority::MEDIUM,
        payload,
    )
}

pub fn response(data_type: DataType, from: u8, tid: u8, payload: &[u8]) -> RxTransfer {
    RxTransfer::new(
        TransferKind::Response,
        data_type.id,
        NodeId::new(from),
        TransferId::new(tid),
        Priority::MEDIUM,
        payload,
    )
}

pub fn broadcast(data_type: DataType, from: Option<u8>, payload: &[u8]) -> RxTransfer {
    RxTransfer::new(
        TransferKind::Broadcast,
        data_type.id,
        from.and_then(NodeId::new),
        TransferId::default(),
        Priority::LOW,
        payload,
    )
}
