//! Unified error types for the node protocol engine.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! pump's error handling uniform. All variants are `Copy` so they can be
//! handed to the event sink without allocation.
//!
//! [`Fatal`] is not a variant of [`Error`]. It stops the node loop, and
//! the outer scheduler handles it separately.

use core::fmt;

use crate::dronecan::NodeId;

// ---------------------------------------------------------------------------
// Top-level node error
// ---------------------------------------------------------------------------

/// Every recoverable failure in the protocol engine funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A payload could not be decoded as the expected message kind.
    Decode(DecodeError),
    /// The transfer layer refused an outbound transfer.
    Transport(TransportError),
    /// The bus driver refused a frame.
    Bus(BusError),
    /// The firmware pull client rejected an operation.
    Firmware(FirmwareError),
    /// The operation needs a node ID and none has been allocated yet.
    NotAllocated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Firmware(e) => write!(f, "firmware: {e}"),
            Self::NotAllocated => write!(f, "node ID not allocated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload ended before all fixed fields were read.
    Truncated,
    /// A union tag selected a field that does not exist.
    InvalidUnionTag(u8),
    /// A dynamic array is longer than its declared bound.
    ArrayTooLong,
    /// An enumerated field holds a value with no meaning.
    InvalidValue,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "payload truncated"),
            Self::InvalidUnionTag(tag) => write!(f, "invalid union tag {tag}"),
            Self::ArrayTooLong => write!(f, "array exceeds its bound"),
            Self::InvalidValue => write!(f, "invalid enumerated value"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Transfer-layer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Outbound frame queue is full.
    QueueFull,
    /// A non-anonymous transfer was attempted before a node ID was set.
    NodeIdNotSet,
    /// Payload does not fit an anonymous (single-frame) transfer.
    PayloadTooLarge,
    /// A received frame was malformed or out of sequence.
    InvalidFrame,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "TX queue full"),
            Self::NodeIdNotSet => write!(f, "local node ID not set"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::InvalidFrame => write!(f, "invalid frame"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Bus driver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// All hardware TX mailboxes are occupied.
    Busy,
    /// Controller is in bus-off or error-passive state.
    Offline,
    /// Driver-level failure with a platform error code.
    Driver(i32),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "TX mailboxes busy"),
            Self::Offline => write!(f, "controller offline"),
            Self::Driver(code) => write!(f, "driver error {code}"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Firmware pull errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    /// A session is already running.
    AlreadyInProgress,
    /// Remote image path exceeds the `file.Path` bound.
    PathTooLong,
    /// The image sink could not be opened.
    SinkUnavailable,
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "firmware update already in progress"),
            Self::PathTooLong => write!(f, "image path too long"),
            Self::SinkUnavailable => write!(f, "firmware sink unavailable"),
        }
    }
}

impl From<FirmwareError> for Error {
    fn from(e: FirmwareError) -> Self {
        Self::Firmware(e)
    }
}

// ---------------------------------------------------------------------------
// Fatal outcome
// ---------------------------------------------------------------------------

/// Unrecoverable protocol command. The node loop must stop servicing the bus
/// and let the hardware watchdog reset the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// A peer asked this node to restart.
    RestartRequested { requester: Option<NodeId> },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestartRequested {
                requester: Some(id),
            } => write!(f, "restart requested by node {id}"),
            Self::RestartRequested { requester: None } => write!(f, "restart requested"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
