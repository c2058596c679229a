//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing node events to the logger (UART /
//! USB-CDC in production).

use log::{info, warn};

use crate::app::events::{FirmwareFailure, NodeEvent};
use crate::app::ports::EventSink;

/// Adapter that logs every [`NodeEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent) {
        match event {
            NodeEvent::Started { node_id: Some(id) } => info!("START | static node {}", id),
            NodeEvent::Started { node_id: None } => info!("START | awaiting allocation"),
            NodeEvent::AllocationRequested { preferred, offset } => {
                info!("ALLOC | request preferred={} uid_offset={}", preferred, offset);
            }
            NodeEvent::AllocationProgress { matched } => {
                info!("ALLOC | {}/16 unique-ID bytes confirmed", matched);
            }
            NodeEvent::AddressAllocated(id) => info!("ALLOC | node ID {}", id),
            NodeEvent::ParamWritten { index, value } => {
                info!("PARAM | [{}] = {}", index, value);
            }
            NodeEvent::ParamsSaved => info!("PARAM | saved"),
            NodeEvent::ParamsErased => info!("PARAM | reset to defaults"),
            NodeEvent::StorageFailed { index, error } => {
                warn!("PARAM | slot {} not persisted: {}", index, error);
            }
            NodeEvent::FirmwareUpdateStarted { server } => {
                info!("FW    | pulling image from node {}", server);
            }
            NodeEvent::FirmwareUpdateComplete { bytes } => {
                info!("FW    | image complete, {} bytes", bytes);
            }
            NodeEvent::FirmwareUpdateFailed { offset, reason } => match reason {
                FirmwareFailure::ServerError(code) => {
                    warn!("FW    | server error {} at offset {}", code, offset);
                }
                FirmwareFailure::Sink(e) => warn!("FW    | {} at offset {}", e, offset),
                FirmwareFailure::Cancelled => info!("FW    | cancelled at offset {}", offset),
            },
            NodeEvent::TransmitFailed { what, error } => {
                warn!("TX    | {} dropped: {}", what, error);
            }
            NodeEvent::BusError(e) => warn!("BUS   | {}", e),
            NodeEvent::RestartRequested { requester } => {
                warn!("RESET | requested by {:?}", requester.map(|id| id.get()));
            }
        }
    }
}
