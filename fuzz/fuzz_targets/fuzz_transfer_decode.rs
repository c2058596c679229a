//! Fuzz target: message decoders and the dispatch path
//!
//! Decodes arbitrary payloads as every message kind the node speaks, then
//! pushes the same bytes through `NodeService::dispatch` as each routed
//! transfer. Nothing may panic, and a response is only ever produced for
//! a request.
//!
//! cargo fuzz run fuzz_transfer_decode

#![no_main]

use cannode::app::events::NodeEvent;
use cannode::app::ports::{
    ChunkOutcome, EventSink, FirmwareSink, FirmwareSinkError, ParamStorage, RandomSource,
    StorageError,
};
use cannode::app::service::{NodeIo, NodeService};
use cannode::config::NodeConfig;
use cannode::dronecan::messages::{
    Allocation, BeginFirmwareUpdateRequest, ExecuteOpcodeRequest, GetSetRequest, Message,
    NodeStatus, ReadResponse, RestartNodeRequest, UNIQUE_ID_LEN,
};
use cannode::dronecan::transport::{AcceptFilter, NullBus, Transport};
use cannode::dronecan::{
    CanFrame, NodeId, Priority, RxTransfer, TransferId, TransferKind, TxTransfer, data_types,
};
use cannode::error::TransportError;
use cannode::node::identity::UniqueId;
use cannode::node::params::ParamTable;
use cannode::scheduler::Instant;
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct Tx {
    local: Option<NodeId>,
    responses: usize,
}

impl Transport for Tx {
    fn local_node_id(&self) -> Option<NodeId> {
        self.local
    }
    fn set_local_node_id(&mut self, node_id: NodeId) {
        self.local = Some(node_id);
    }
    fn enqueue(&mut self, transfer: &TxTransfer<'_>) -> Result<(), TransportError> {
        if transfer.kind == TransferKind::Response {
            self.responses += 1;
        }
        Ok(())
    }
    fn peek_tx(&self) -> Option<&CanFrame> {
        None
    }
    fn pop_tx(&mut self) {}
    fn feed(
        &mut self,
        _frame: &CanFrame,
        _timestamp_us: u64,
        _filter: &dyn AcceptFilter,
    ) -> Result<Option<RxTransfer>, TransportError> {
        Ok(None)
    }
    fn purge_stale(&mut self, _timestamp_us: u64) {}
}

struct NoStorage;

impl ParamStorage for NoStorage {
    fn read_slot(&self, _offset: usize) -> Result<f32, StorageError> {
        Err(StorageError::NotFound)
    }
    fn write_slot(&mut self, _offset: usize, _value: f32) -> Result<(), StorageError> {
        Ok(())
    }
}

struct Discard;

impl FirmwareSink for Discard {
    fn begin(&mut self) -> Result<(), FirmwareSinkError> {
        Ok(())
    }
    fn write_chunk(&mut self, _offset: u32, _data: &[u8]) -> Result<ChunkOutcome, FirmwareSinkError> {
        Ok(ChunkOutcome::More)
    }
    fn abort(&mut self) {}
}

struct Zero;

impl RandomSource for Zero {
    fn next_u32(&mut self) -> u32 {
        0
    }
}

struct Quiet;

impl EventSink for Quiet {
    fn emit(&mut self, _event: &NodeEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let _ = Allocation::decode(data);
    let _ = NodeStatus::decode(data);
    let _ = GetSetRequest::decode(data);
    let _ = ExecuteOpcodeRequest::decode(data);
    let _ = BeginFirmwareUpdateRequest::decode(data);
    let _ = ReadResponse::decode(data);
    let _ = RestartNodeRequest::decode(data);

    let config = NodeConfig {
        static_node_id: Some(20),
        ..NodeConfig::default()
    };
    let mut node = NodeService::new(config, UniqueId([0x5A; UNIQUE_ID_LEN]), ParamTable::default());
    let mut transport = Tx::default();
    let mut events = Quiet;
    node.start(&mut transport, &mut events);

    let routed = [
        (TransferKind::Broadcast, data_types::ALLOCATION.id),
        (TransferKind::Request, data_types::GET_NODE_INFO.id),
        (TransferKind::Request, data_types::PARAM_GET_SET.id),
        (TransferKind::Request, data_types::PARAM_EXECUTE_OPCODE.id),
        (TransferKind::Request, data_types::FILE_BEGIN_FIRMWARE_UPDATE.id),
        (TransferKind::Response, data_types::FILE_READ.id),
    ];
    for (kind, id) in routed {
        let transfer = RxTransfer::new(kind, id, NodeId::new(9), TransferId::new(1), Priority::MEDIUM, data);
        let before = transport.responses;
        let mut io = NodeIo {
            bus: &mut NullBus,
            transport: &mut transport,
            storage: &mut NoStorage,
            firmware: &mut Discard,
            rng: &mut Zero,
            events: &mut events,
        };
        let _ = node.dispatch(&transfer, Instant::from_millis(1_000), &mut io);
        if kind != TransferKind::Request {
            assert_eq!(transport.responses, before, "responded to a non-request");
        }
    }
});
