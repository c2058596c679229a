//! Node service: the frame pump and the hexagonal core.
//!
//! [`NodeService`] owns every piece of node state: identity, allocation
//! client, status broadcaster, parameter server and firmware client. It
//! exposes a hardware-agnostic API. All I/O flows through the collaborators
//! bundled in [`NodeIo`], which are borrowed per call so the whole engine
//! runs against mocks in tests.
//!
//! ```text
//!   CanBus ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!              │          NodeService         │
//! Transport ◀─▶│ Allocation · Status · Params │ ──▶ ParamStorage
//!              │      Firmware · Router       │ ──▶ FirmwareSink
//!              └──────────────────────────────┘
//! ```

use log::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::dronecan::messages::{
    BeginFirmwareUpdateRequest, BeginFirmwareUpdateResponse, ExecuteOpcodeRequest,
    GetNodeInfoResponse, GetSetRequest, Health, HardwareVersion, Message, SoftwareVersion,
    begin_fw_error,
};
use crate::dronecan::transport::{CanBus, Transport};
use crate::dronecan::{NodeId, RxTransfer, TransferKind, TxTransfer, truncated};
use crate::error::{BusError, Error, Fatal, FirmwareError};
use crate::node::allocation::{AllocationClient, AllocationProgress, AllocationTiming};
use crate::node::dispatch::{Route, Router};
use crate::node::firmware::{FirmwareClient, ReadOutcome};
use crate::node::identity::{NodeIdentity, UniqueId};
use crate::node::param_service::{OpcodeAction, ParamService};
use crate::node::params::ParamTable;
use crate::node::status::StatusBroadcaster;
use crate::scheduler::{Instant, PeriodicTimer};

use super::events::{FirmwareFailure, NodeEvent};
use super::ports::{EventSink, FirmwareSink, ParamStorage, RandomSource};

/// Collaborators borrowed for the duration of one pump call.
pub struct NodeIo<'a> {
    pub bus: &'a mut dyn CanBus,
    pub transport: &'a mut dyn Transport,
    pub storage: &'a mut dyn ParamStorage,
    pub firmware: &'a mut dyn FirmwareSink,
    pub rng: &'a mut dyn RandomSource,
    pub events: &'a mut dyn EventSink,
}

/// Address to request from the allocator: the `NODEID` parameter when it
/// holds a valid address, else the configured preference.
pub fn preferred_node_id(params: &ParamTable, config: &NodeConfig) -> NodeId {
    params
        .by_name("NODEID")
        .and_then(|p| NodeId::new(p.value as u8))
        .or_else(|| NodeId::new(config.preferred_node_id))
        .unwrap_or(NodeId::DEFAULT_PREFERRED)
}

// ───────────────────────────────────────────────────────────────
// NodeService
// ───────────────────────────────────────────────────────────────

pub struct NodeService {
    config: NodeConfig,
    identity: NodeIdentity,
    allocation: AllocationClient,
    status: StatusBroadcaster,
    params: ParamService,
    firmware: FirmwareClient,
    router: Router,
    slow_timer: PeriodicTimer,
    tick_count: u64,
}

impl NodeService {
    /// Build the service from configuration, the hardware unique ID and an
    /// already-loaded parameter table.
    ///
    /// Does **not** touch the transport; call [`start`](Self::start) next.
    pub fn new(config: NodeConfig, unique_id: UniqueId, params: ParamTable) -> Self {
        let static_id = config.static_node_id.and_then(NodeId::new);
        let preferred = preferred_node_id(&params, &config);
        let timing = AllocationTiming {
            min_request_period_ms: config.allocation_min_request_period_ms,
            max_followup_delay_ms: config.allocation_max_followup_delay_ms,
        };

        Self {
            identity: NodeIdentity::new(unique_id, static_id),
            allocation: AllocationClient::new(preferred, static_id, timing),
            status: StatusBroadcaster::new(),
            params: ParamService::new(params),
            firmware: FirmwareClient::new(config.firmware_retry_interval_ms),
            router: Router,
            slow_timer: PeriodicTimer::new(config.slow_task_period_ms),
            tick_count: 0,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Push a static address into the transport and announce startup.
    pub fn start(&mut self, transport: &mut dyn Transport, events: &mut dyn EventSink) {
        let node_id = self.identity.local_address();
        if let Some(id) = node_id {
            transport.set_local_node_id(id);
        }
        events.emit(&NodeEvent::Started { node_id });
        match node_id {
            Some(id) => info!("NodeService started as node {}", id),
            None => info!(
                "NodeService started unallocated, requesting node {}",
                self.allocation.preferred()
            ),
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One pump iteration:
    /// 1. drain the TX queue to the bus
    /// 2. feed one inbound frame and dispatch a completed transfer
    /// 3. allocation and firmware deadlines
    /// 4. the slow group (stale purge, NodeStatus) when its timer fires
    pub fn tick(&mut self, now: Instant, io: &mut NodeIo<'_>) -> Result<(), Fatal> {
        self.tick_count += 1;

        self.drain_tx(io);

        if let Some(frame) = io.bus.next_inbound_frame() {
            match io.transport.feed(&frame, now.as_micros(), &self.router) {
                Ok(Some(transfer)) => self.dispatch(&transfer, now, io)?,
                Ok(None) => {}
                Err(e) => debug!("NodeService: frame dropped: {}", e),
            }
        }

        self.run_allocation(now, io);

        if let Err(error) = self.firmware.tick(now.millis(), io.transport) {
            io.events.emit(&NodeEvent::TransmitFailed {
                what: "file.Read",
                error,
            });
        }

        if self.slow_timer.poll(now.millis()) {
            io.transport.purge_stale(now.as_micros());
            self.broadcast_status(now, io);
        }
        Ok(())
    }

    fn drain_tx(&mut self, io: &mut NodeIo<'_>) {
        loop {
            let sent = match io.transport.peek_tx() {
                Some(frame) => io.bus.send_frame(frame),
                None => break,
            };
            match sent {
                Ok(()) => io.transport.pop_tx(),
                Err(BusError::Busy) => {
                    trace!("NodeService: bus busy, TX deferred");
                    break;
                }
                Err(e) => {
                    warn!("NodeService: bus send failed: {}", e);
                    io.events.emit(&NodeEvent::BusError(e));
                    break;
                }
            }
        }
    }

    fn run_allocation(&mut self, now: Instant, io: &mut NodeIo<'_>) {
        match self
            .allocation
            .tick(now.millis(), self.identity.unique_id(), io.transport, io.rng)
        {
            Ok(Some(req)) => io.events.emit(&NodeEvent::AllocationRequested {
                preferred: req.preferred,
                offset: req.offset,
            }),
            Ok(None) => {}
            Err(error) => io.events.emit(&NodeEvent::TransmitFailed {
                what: "Allocation",
                error,
            }),
        }
    }

    fn broadcast_status(&mut self, now: Instant, io: &mut NodeIo<'_>) {
        match self
            .status
            .broadcast_status(now, self.firmware.progress(), io.transport)
        {
            Ok(_) | Err(Error::NotAllocated) => {}
            Err(Error::Transport(error)) => io.events.emit(&NodeEvent::TransmitFailed {
                what: "NodeStatus",
                error,
            }),
            Err(e) => warn!("NodeService: status broadcast failed: {}", e),
        }
    }

    // ── Inbound dispatch ──────────────────────────────────────

    /// Route one reassembled transfer to its owner. Unknown transfers and
    /// undecodable payloads are dropped without a response.
    pub fn dispatch(
        &mut self,
        transfer: &RxTransfer,
        now: Instant,
        io: &mut NodeIo<'_>,
    ) -> Result<(), Fatal> {
        let Some(route) = Router::route(transfer.kind, transfer.data_type_id) else {
            trace!(
                "NodeService: ignoring {:?} {}",
                transfer.kind, transfer.data_type_id
            );
            return Ok(());
        };

        match route {
            Route::Allocation => self.on_allocation(transfer, now, io),
            Route::GetNodeInfo => {
                let payload = self.node_info(now).encode();
                self.respond(route, transfer, &payload, io);
            }
            Route::ParamGetSet => self.on_get_set(transfer, io),
            Route::ParamExecuteOpcode => self.on_execute_opcode(transfer, io),
            Route::BeginFirmwareUpdate => self.on_begin_firmware_update(transfer, io),
            Route::FileReadResponse => self.on_read_response(transfer, io),
            Route::RestartNode => {
                warn!("NodeService: restart requested by {:?}", transfer.source);
                io.events.emit(&NodeEvent::RestartRequested {
                    requester: transfer.source,
                });
                return Err(Fatal::RestartRequested {
                    requester: transfer.source,
                });
            }
        }
        Ok(())
    }

    fn respond(&self, route: Route, request: &RxTransfer, payload: &[u8], io: &mut NodeIo<'_>) {
        let Some(destination) = request.source else {
            debug!("NodeService: anonymous request, no response");
            return;
        };
        let result = io.transport.enqueue(&TxTransfer {
            data_type: route.data_type(),
            kind: TransferKind::Response,
            destination: Some(destination),
            transfer_id: request.transfer_id,
            priority: request.priority,
            payload,
        });
        if let Err(error) = result {
            warn!("NodeService: {:?} response to {} not queued: {}", route, destination, error);
            io.events.emit(&NodeEvent::TransmitFailed {
                what: "response",
                error,
            });
        }
    }

    fn on_allocation(&mut self, transfer: &RxTransfer, now: Instant, io: &mut NodeIo<'_>) {
        let progress = self.allocation.on_allocation_broadcast(
            transfer,
            self.identity.unique_id(),
            now.millis(),
            io.rng,
        );
        match progress {
            AllocationProgress::Partial { matched } => {
                io.events.emit(&NodeEvent::AllocationProgress { matched });
            }
            AllocationProgress::Allocated(id) => {
                if self.identity.assign(id) {
                    io.transport.set_local_node_id(id);
                    io.events.emit(&NodeEvent::AddressAllocated(id));
                }
            }
            AllocationProgress::Ignored
            | AllocationProgress::Collision
            | AllocationProgress::Mismatch => {}
        }
    }

    fn on_get_set(&mut self, transfer: &RxTransfer, io: &mut NodeIo<'_>) {
        let request = match GetSetRequest::decode(&transfer.payload) {
            Ok(r) => r,
            Err(e) => {
                debug!("NodeService: bad GetSet request: {}", e);
                return;
            }
        };
        let reply = self.params.handle_get_set(&request, io.storage);
        if let Some(write) = reply.write {
            match write.persisted {
                Ok(()) => io.events.emit(&NodeEvent::ParamWritten {
                    index: write.index,
                    value: write.value,
                }),
                Err(error) => io.events.emit(&NodeEvent::StorageFailed {
                    index: write.index,
                    error,
                }),
            }
        }
        self.respond(Route::ParamGetSet, transfer, &reply.response.encode(), io);
    }

    fn on_execute_opcode(&mut self, transfer: &RxTransfer, io: &mut NodeIo<'_>) {
        let request = match ExecuteOpcodeRequest::decode(&transfer.payload) {
            Ok(r) => r,
            Err(e) => {
                debug!("NodeService: bad ExecuteOpcode request: {}", e);
                return;
            }
        };
        let reply = self.params.handle_execute_opcode(&request, io.storage);
        if let Some(failure) = reply.failure {
            io.events.emit(&NodeEvent::StorageFailed {
                index: failure.index,
                error: failure.error,
            });
        }
        match reply.action {
            OpcodeAction::Saved => io.events.emit(&NodeEvent::ParamsSaved),
            OpcodeAction::Erased => io.events.emit(&NodeEvent::ParamsErased),
            OpcodeAction::Unknown(_) => {}
        }
        self.respond(Route::ParamExecuteOpcode, transfer, &reply.response.encode(), io);
    }

    fn on_begin_firmware_update(&mut self, transfer: &RxTransfer, io: &mut NodeIo<'_>) {
        let request = match BeginFirmwareUpdateRequest::decode(&transfer.payload) {
            Ok(r) => r,
            Err(e) => {
                debug!("NodeService: bad BeginFirmwareUpdate request: {}", e);
                return;
            }
        };
        let Some(server) = NodeId::new(request.source_node_id).or(transfer.source) else {
            return;
        };

        let response = match self.firmware.begin_update(
            server,
            &request.image_file_remote_path,
            io.firmware,
        ) {
            Ok(()) => {
                io.events.emit(&NodeEvent::FirmwareUpdateStarted { server });
                BeginFirmwareUpdateResponse::new(begin_fw_error::OK, "")
            }
            Err(FirmwareError::AlreadyInProgress) => {
                BeginFirmwareUpdateResponse::new(begin_fw_error::IN_PROGRESS, "update in progress")
            }
            Err(e) => {
                warn!("NodeService: firmware update refused: {}", e);
                BeginFirmwareUpdateResponse::new(begin_fw_error::UNKNOWN, "sink unavailable")
            }
        };
        self.respond(Route::BeginFirmwareUpdate, transfer, &response.encode(), io);
    }

    fn on_read_response(&mut self, transfer: &RxTransfer, io: &mut NodeIo<'_>) {
        match self.firmware.on_read_response(transfer, io.firmware) {
            ReadOutcome::Discarded => {}
            ReadOutcome::Advanced { offset } => trace!("NodeService: firmware at {}", offset),
            ReadOutcome::Complete { bytes } => {
                io.events.emit(&NodeEvent::FirmwareUpdateComplete { bytes });
            }
            ReadOutcome::Failed { offset, reason } => {
                io.events.emit(&NodeEvent::FirmwareUpdateFailed { offset, reason });
            }
        }
    }

    /// The GetNodeInfo response for `now`.
    pub fn node_info(&self, now: Instant) -> GetNodeInfoResponse {
        let (sw_major, sw_minor) = self.config.software_version;
        let (hw_major, hw_minor) = self.config.hardware_version;
        let optional_field_flags = if self.config.vcs_commit == 0 {
            0
        } else {
            SoftwareVersion::FLAG_VCS_COMMIT
        };
        let name = truncated(self.config.node_name.as_bytes());

        GetNodeInfoResponse {
            status: self.status.snapshot(now, self.firmware.progress()),
            software_version: SoftwareVersion {
                major: sw_major,
                minor: sw_minor,
                optional_field_flags,
                vcs_commit: self.config.vcs_commit,
                image_crc: 0,
            },
            hardware_version: HardwareVersion {
                major: hw_major,
                minor: hw_minor,
                unique_id: *self.identity.unique_id().as_bytes(),
                certificate_of_authenticity: heapless::Vec::new(),
            },
            name,
        }
    }

    // ── Application commands ──────────────────────────────────

    /// Start a firmware pull without a BeginFirmwareUpdate request.
    pub fn begin_firmware_update(
        &mut self,
        server: NodeId,
        path: &[u8],
        sink: &mut dyn FirmwareSink,
        events: &mut dyn EventSink,
    ) -> Result<(), FirmwareError> {
        self.firmware.begin_update(server, path, sink)?;
        events.emit(&NodeEvent::FirmwareUpdateStarted { server });
        Ok(())
    }

    /// Abort an active firmware session. Returns the offset reached.
    pub fn cancel_firmware_update(
        &mut self,
        sink: &mut dyn FirmwareSink,
        events: &mut dyn EventSink,
    ) -> Option<u32> {
        let offset = self.firmware.cancel(sink)?;
        events.emit(&NodeEvent::FirmwareUpdateFailed {
            offset,
            reason: FirmwareFailure::Cancelled,
        });
        Some(offset)
    }

    /// Report `health` in NodeStatus instead of OK.
    pub fn set_health(&mut self, health: Health) {
        self.status.set_health(health);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn local_node_id(&self) -> Option<NodeId> {
        self.identity.local_address()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn allocation(&self) -> &AllocationClient {
        &self.allocation
    }

    pub fn firmware(&self) -> &FirmwareClient {
        &self.firmware
    }

    pub fn params(&self) -> &ParamTable {
        self.params.table()
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Pump iterations since construction.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
