//! `NodeStatus` heartbeat publisher.

use log::trace;

use crate::dronecan::messages::{Health, Message, Mode, NodeStatus};
use crate::dronecan::transport::Transport;
use crate::dronecan::{Priority, TransferId, TransferKind, TxTransfer};
use crate::error::{Error, Result};
use crate::scheduler::Instant;

/// Firmware bytes per unit of the vendor status code while updating.
pub const PROGRESS_UNIT_BYTES: u32 = 1024;

#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    transfer_id: TransferId,
    health: Health,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            transfer_id: TransferId::default(),
            health: Health::Ok,
        }
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Override the reported health. `Health::Ok` clears the override.
    pub fn set_health(&mut self, health: Health) {
        self.health = health;
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }

    /// Fresh status for `now`. `firmware_offset` is the byte offset of an
    /// active firmware session, if any.
    pub fn snapshot(&self, now: Instant, firmware_offset: Option<u32>) -> NodeStatus {
        let (mode, vendor_specific_status_code) = match firmware_offset {
            Some(offset) => (
                Mode::SoftwareUpdate,
                u16::try_from(offset / PROGRESS_UNIT_BYTES).unwrap_or(u16::MAX),
            ),
            None => (Mode::Operational, 0),
        };
        NodeStatus {
            uptime_sec: now.uptime_secs(),
            health: self.health,
            mode,
            sub_mode: 0,
            vendor_specific_status_code,
        }
    }

    /// Publish one heartbeat. The transfer ID advances only when the
    /// transport accepts it; unallocated nodes do not publish.
    pub fn broadcast_status(
        &mut self,
        now: Instant,
        firmware_offset: Option<u32>,
        transport: &mut dyn Transport,
    ) -> Result<NodeStatus> {
        if transport.local_node_id().is_none() {
            return Err(Error::NotAllocated);
        }
        let status = self.snapshot(now, firmware_offset);
        let payload = status.encode();
        transport.enqueue(&TxTransfer {
            data_type: NodeStatus::DATA_TYPE,
            kind: TransferKind::Broadcast,
            destination: None,
            transfer_id: self.transfer_id,
            priority: Priority::LOW,
            payload: &payload,
        })?;
        self.transfer_id = self.transfer_id.next();
        trace!(
            "Status: uptime {} s, {:?}/{:?}, code {}",
            status.uptime_sec, status.health, status.mode, status.vendor_specific_status_code
        );
        Ok(status)
    }
}
