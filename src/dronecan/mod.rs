//! DroneCAN (UAVCAN v0) protocol vocabulary.
//!
//! ```text
//!   CanBus ──frames──▶ Transport (reassembly) ──RxTransfer──▶ NodeService
//!   CanBus ◀─frames─── Transport (splitting)  ◀─TxTransfer─── NodeService
//! ```
//!
//! This module owns the value types that cross that boundary, the DSDL
//! bit codec ([`dsdl`]), the typed messages the node speaks ([`messages`])
//! and the collaborator traits ([`transport`]). Frame splitting, tail bytes
//! and transfer CRCs are the transport implementation's business.

pub mod dsdl;
pub mod messages;
pub mod transport;

use core::fmt;

pub use dsdl::{MAX_PAYLOAD, Payload, truncated};

// ───────────────────────────────────────────────────────────────
// Node ID
// ───────────────────────────────────────────────────────────────

/// A 7-bit node address in `1..=127`. Zero means "anonymous" on the wire
/// and is represented as `Option::<NodeId>::None` everywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u8);

impl NodeId {
    pub const MAX: u8 = 127;

    /// Fallback preferred address when nothing better is configured.
    pub const DEFAULT_PREFERRED: NodeId = NodeId(69);

    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= 1 && raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Transfer ID
// ───────────────────────────────────────────────────────────────

/// 5-bit transfer sequence number, wraps at 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TransferId(u8);

impl TransferId {
    pub const MODULO: u8 = 32;

    pub const fn new(raw: u8) -> Self {
        Self(raw % Self::MODULO)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// The following sequence number (mod 32).
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % Self::MODULO)
    }
}

// ───────────────────────────────────────────────────────────────
// Priority
// ───────────────────────────────────────────────────────────────

/// 5-bit transfer priority; lower value wins arbitration.
/// Advisory metadata for the transport, never enforced by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(0);
    pub const HIGH: Priority = Priority(8);
    pub const MEDIUM: Priority = Priority(16);
    pub const LOW: Priority = Priority(24);
    pub const LOWEST: Priority = Priority(31);

    pub const fn new(raw: u8) -> Self {
        if raw > 31 { Self(31) } else { Self(raw) }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

// ───────────────────────────────────────────────────────────────
// Transfer kind and data types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Message broadcast to every node.
    Broadcast,
    /// Service request addressed to one node.
    Request,
    /// Service response addressed to the requester.
    Response,
}

/// A DSDL data type: numeric ID plus the 64-bit signature that seeds the
/// multi-frame transfer CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    pub id: u16,
    pub signature: u64,
}

impl DataType {
    pub const fn new(id: u16, signature: u64) -> Self {
        Self { id, signature }
    }
}

/// The data types this node publishes, subscribes to, or serves.
pub mod data_types {
    use super::DataType;

    // Messages
    pub const ALLOCATION: DataType = DataType::new(1, 0x0B2A_8126_20A1_1D40);
    pub const NODE_STATUS: DataType = DataType::new(341, 0x0F08_68D0_C1A7_C6F1);

    // Services
    pub const GET_NODE_INFO: DataType = DataType::new(1, 0xEE46_8A81_21C4_6A9E);
    pub const RESTART_NODE: DataType = DataType::new(5, 0x569E_0539_4A30_17F0);
    pub const PARAM_EXECUTE_OPCODE: DataType = DataType::new(10, 0x3B13_1AC5_EB69_D2CD);
    pub const PARAM_GET_SET: DataType = DataType::new(11, 0xA7B6_22F9_39D1_A4D5);
    pub const FILE_BEGIN_FIRMWARE_UPDATE: DataType = DataType::new(40, 0xB7D7_25DF_7272_4126);
    pub const FILE_READ: DataType = DataType::new(48, 0x8DCD_CA93_9F33_F678);
}

// ───────────────────────────────────────────────────────────────
// Frames and transfers
// ───────────────────────────────────────────────────────────────

/// One extended-ID CAN 2.0B frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanFrame {
    /// 29-bit identifier.
    pub id: u32,
    pub data: heapless::Vec<u8, 8>,
}

/// A fully reassembled inbound transfer.
///
/// Produced by [`Transport::feed`](transport::Transport::feed) and borrowed
/// read-only for one dispatch; never kept across ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct RxTransfer {
    pub kind: TransferKind,
    pub data_type_id: u16,
    /// `None` for anonymous broadcasts.
    pub source: Option<NodeId>,
    pub transfer_id: TransferId,
    pub priority: Priority,
    pub timestamp_us: u64,
    pub payload: Payload,
}

impl RxTransfer {
    /// Build a transfer from raw parts, truncating the payload at
    /// [`MAX_PAYLOAD`].
    pub fn new(
        kind: TransferKind,
        data_type_id: u16,
        source: Option<NodeId>,
        transfer_id: TransferId,
        priority: Priority,
        payload: &[u8],
    ) -> Self {
        Self {
            kind,
            data_type_id,
            source,
            transfer_id,
            priority,
            timestamp_us: 0,
            payload: truncated(payload),
        }
    }
}

/// An outbound transfer handed to the transport for splitting and queueing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxTransfer<'a> {
    pub data_type: DataType,
    pub kind: TransferKind,
    /// Required for requests and responses, `None` for broadcasts.
    pub destination: Option<NodeId>,
    pub transfer_id: TransferId,
    pub priority: Priority,
    pub payload: &'a [u8],
}
