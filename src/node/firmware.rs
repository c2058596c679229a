//! Firmware pull client over `file.Read`.
//!
//! A session starts from a `BeginFirmwareUpdate` request and then walks the
//! remote image one chunk at a time:
//!
//! ```text
//!   tick ──(due)──▶ file.Read{offset, path} ──▶ server
//!                                                  │
//!   on_read_response ◀─────── {error, data} ───────┘
//!        │ error != 0         → session ends (no retry)
//!        │ len < 256          → session ends (image done)
//!        └ otherwise          → offset += len, next tick fires at once
//! ```
//!
//! An unanswered request is repeated after the retry interval. Each request
//! uses a fresh transfer ID, so a late answer to an earlier attempt fails
//! the sequence check and is dropped.

use log::{debug, info, warn};

use crate::app::events::FirmwareFailure;
use crate::app::ports::{ChunkOutcome, FirmwareSink};
use crate::dronecan::messages::{
    MAX_PATH_LEN, MAX_READ_CHUNK, Message, PathBytes, ReadRequest, ReadResponse, file_error,
};
use crate::dronecan::transport::Transport;
use crate::dronecan::{NodeId, Priority, RxTransfer, TransferId, TransferKind, TxTransfer};
use crate::error::{FirmwareError, TransportError};
use crate::scheduler::Millis;

/// Default delay before an unanswered `file.Read` is repeated.
pub const FIRMWARE_RETRY_INTERVAL_MS: u32 = 750;

/// A chunk shorter than the largest `file.Read` payload is the last one.
pub const fn is_final_chunk(len: usize) -> bool {
    len < MAX_READ_CHUNK
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareSession {
    pub server: NodeId,
    pub path: PathBytes,
    pub offset: u32,
    last_request_at: Option<Millis>,
    awaiting_response: bool,
}

/// What a `file.Read` response did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Foreign, stale or malformed; nothing changed.
    Discarded,
    /// Chunk stored, more to pull.
    Advanced { offset: u32 },
    /// Last chunk stored; the session is closed.
    Complete { bytes: u32 },
    /// Session closed without completing.
    Failed { offset: u32, reason: FirmwareFailure },
}

#[derive(Debug, Clone)]
pub struct FirmwareClient {
    session: Option<FirmwareSession>,
    next_transfer_id: TransferId,
    retry_interval_ms: u32,
}

impl Default for FirmwareClient {
    fn default() -> Self {
        Self::new(FIRMWARE_RETRY_INTERVAL_MS)
    }
}

impl FirmwareClient {
    pub fn new(retry_interval_ms: u32) -> Self {
        Self {
            session: None,
            next_transfer_id: TransferId::default(),
            retry_interval_ms,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&FirmwareSession> {
        self.session.as_ref()
    }

    /// Byte offset of the active session.
    pub fn progress(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.offset)
    }

    /// Open a session pulling `path` from `server`, starting at offset 0.
    pub fn begin_update(
        &mut self,
        server: NodeId,
        path: &[u8],
        sink: &mut dyn FirmwareSink,
    ) -> Result<(), FirmwareError> {
        if self.session.is_some() {
            return Err(FirmwareError::AlreadyInProgress);
        }
        if path.len() > MAX_PATH_LEN {
            return Err(FirmwareError::PathTooLong);
        }
        let mut stored = PathBytes::new();
        stored
            .extend_from_slice(path)
            .map_err(|()| FirmwareError::PathTooLong)?;
        sink.begin().map_err(|e| {
            warn!("Firmware: sink refused new image: {}", e);
            FirmwareError::SinkUnavailable
        })?;

        info!("Firmware: pulling {} bytes of path from node {}", stored.len(), server);
        self.session = Some(FirmwareSession {
            server,
            path: stored,
            offset: 0,
            last_request_at: None,
            awaiting_response: false,
        });
        Ok(())
    }

    /// Drop the session and discard the partial image. Returns the offset
    /// reached, or `None` if nothing was running.
    pub fn cancel(&mut self, sink: &mut dyn FirmwareSink) -> Option<u32> {
        let session = self.session.take()?;
        sink.abort();
        info!("Firmware: cancelled at offset {}", session.offset);
        Some(session.offset)
    }

    /// Request the next chunk when one is due. Returns `Ok(true)` when a
    /// request was queued.
    pub fn tick(&mut self, now: Millis, transport: &mut dyn Transport) -> Result<bool, TransportError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        if let Some(sent) = session.last_request_at {
            if now.elapsed_since(sent) < self.retry_interval_ms {
                return Ok(false);
            }
            debug!("Firmware: retrying read at offset {}", session.offset);
        }

        let payload = ReadRequest {
            offset: u64::from(session.offset),
            path: session.path.clone(),
        }
        .encode();
        session.last_request_at = Some(now);

        transport.enqueue(&TxTransfer {
            data_type: ReadRequest::DATA_TYPE,
            kind: TransferKind::Request,
            destination: Some(session.server),
            transfer_id: self.next_transfer_id,
            priority: Priority::HIGH,
            payload: &payload,
        })?;
        self.next_transfer_id = self.next_transfer_id.next();
        session.awaiting_response = true;
        Ok(true)
    }

    /// Handle a `file.Read` response.
    pub fn on_read_response(
        &mut self,
        transfer: &RxTransfer,
        sink: &mut dyn FirmwareSink,
    ) -> ReadOutcome {
        let Some(session) = self.session.as_mut() else {
            return ReadOutcome::Discarded;
        };
        if !session.awaiting_response
            || transfer.transfer_id.next() != self.next_transfer_id
            || transfer.source != Some(session.server)
        {
            debug!(
                "Firmware: dropping read response tid {} from {:?}",
                transfer.transfer_id.get(),
                transfer.source
            );
            return ReadOutcome::Discarded;
        }
        let Ok(response) = ReadResponse::decode(&transfer.payload) else {
            debug!("Firmware: malformed read response");
            return ReadOutcome::Discarded;
        };

        let offset = session.offset;
        if response.error != file_error::OK {
            warn!("Firmware: server error {} at offset {}", response.error, offset);
            return self.fail(offset, FirmwareFailure::ServerError(response.error), sink);
        }

        let last = is_final_chunk(response.data.len());
        match sink.write_chunk(offset, &response.data) {
            Ok(ChunkOutcome::More) if !last => {
                session.offset = offset.saturating_add(response.data.len() as u32);
                session.last_request_at = None;
                session.awaiting_response = false;
                ReadOutcome::Advanced {
                    offset: session.offset,
                }
            }
            Ok(outcome) => {
                if outcome == ChunkOutcome::More {
                    warn!("Firmware: sink still open after final chunk at {}", offset);
                }
                let bytes = offset.saturating_add(response.data.len() as u32);
                info!("Firmware: image complete, {} bytes", bytes);
                self.session = None;
                ReadOutcome::Complete { bytes }
            }
            Err(e) => {
                warn!("Firmware: sink rejected chunk at {}: {}", offset, e);
                self.fail(offset, FirmwareFailure::Sink(e), sink)
            }
        }
    }

    fn fail(&mut self, offset: u32, reason: FirmwareFailure, sink: &mut dyn FirmwareSink) -> ReadOutcome {
        self.session = None;
        sink.abort();
        ReadOutcome::Failed { offset, reason }
    }
}
