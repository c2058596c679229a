//! Port traits: the hexagonal boundary between the protocol engine and the
//! platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! Driven adapters (persistence, clock, entropy, firmware sink, event sink,
//! watchdog) implement these traits. The bus-facing collaborators
//! ([`CanBus`](crate::dronecan::transport::CanBus) and
//! [`Transport`](crate::dronecan::transport::Transport)) live with the
//! protocol vocabulary in [`crate::dronecan::transport`].
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **ParamStorage** writes are synchronous; the parameter service relies on
//!   a returned `Ok` meaning the value is durable.

use crate::config::NodeConfig;
use crate::scheduler::Instant;

use super::events::NodeEvent;

// ───────────────────────────────────────────────────────────────
// Parameter persistence (domain ↔ NVS / EEPROM)
// ───────────────────────────────────────────────────────────────

/// Slot-addressed scalar storage for the parameter table.
///
/// Slots are addressed by byte offset (`index * PARAM_SLOT_STRIDE`); no
/// transactionality is assumed.
pub trait ParamStorage {
    /// Read the value stored at `offset`.
    fn read_slot(&self, offset: usize) -> Result<f32, StorageError>;

    /// Persist `value` at `offset` before returning.
    fn write_slot(&mut self, offset: usize, value: f32) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`NodeConfig`].
///
/// Implementations MUST validate config values before persisting.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Firmware sink (domain → OTA partition)
// ───────────────────────────────────────────────────────────────

/// What the sink concluded after storing a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Keep pulling.
    More,
    /// The image is complete and finalised.
    Complete,
}

/// Consumer of the bytes pulled by the firmware client.
///
/// The pull client ends the session on a chunk shorter than the `file.Read`
/// maximum whatever the sink returns, so a sink must finalise on that chunk.
pub trait FirmwareSink {
    /// Prepare for a new image.
    fn begin(&mut self) -> Result<(), FirmwareSinkError>;

    /// Store `data` at `offset` (always sequential).
    fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<ChunkOutcome, FirmwareSinkError>;

    /// Throw away a partial image.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Entropy, clock, watchdog
// ───────────────────────────────────────────────────────────────

/// Source of randomness for allocation-request jitter.
pub trait RandomSource {
    fn next_u32(&mut self) -> u32;
}

/// Monotonic platform clock.
pub trait ClockPort {
    fn now(&self) -> Instant;
}

/// Hardware watchdog that resets the device unless fed.
pub trait WatchdogPort {
    fn feed(&self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`NodeEvent`]s through this port. Adapters
/// decide where they go (serial log, counters, a debug topic…).
pub trait EventSink {
    fn emit(&mut self, event: &NodeEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`ParamStorage`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Slot was never written.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`FirmwareSink`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareSinkError {
    /// No partition or buffer available for the image.
    NoSpace,
    /// Chunk offset does not follow the previous chunk.
    NonSequential,
    /// Flash write failed.
    WriteFailed,
    /// Image failed verification when finalising.
    VerifyFailed,
    /// Operation needs an open image.
    NotReceiving,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for FirmwareSinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no space for image"),
            Self::NonSequential => write!(f, "chunk offset out of sequence"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::VerifyFailed => write!(f, "image verification failed"),
            Self::NotReceiving => write!(f, "no image open"),
        }
    }
}
