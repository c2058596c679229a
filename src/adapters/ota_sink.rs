//! OTA partition sink for pulled firmware images, backed by `esp-ota`.
//!
//! Flow: begin → N × write_chunk → (short chunk) finalize → boot partition set
//!
//! The image size is not known up front; the pull ends when the file server
//! returns a chunk shorter than the `file.Read` maximum. On simulation
//! targets the bytes are only counted.

use log::{info, warn};

use crate::app::ports::{ChunkOutcome, FirmwareSink, FirmwareSinkError};
use crate::node::firmware::is_final_chunk;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving { bytes_written: u32 },
    /// Finalised and marked bootable; takes effect on the next reset.
    ReadyToReboot { image_size: u32 },
    Failed,
}

// ── Sink ──────────────────────────────────────────────────────

pub struct OtaSink {
    state: OtaState,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaSink {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn ready_to_reboot(&self) -> bool {
        matches!(self.state, OtaState::ReadyToReboot { .. })
    }

    fn finalize(&mut self, image_size: u32) -> Result<(), FirmwareSinkError> {
        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(FirmwareSinkError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                FirmwareSinkError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                FirmwareSinkError::VerifyFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot { image_size };
        info!("OTA: image finalised ({} bytes), ready to reboot", image_size);
        Ok(())
    }
}

impl Default for OtaSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareSink for OtaSink {
    fn begin(&mut self) -> Result<(), FirmwareSinkError> {
        if matches!(self.state, OtaState::Receiving { .. }) {
            // A new session replaces the partial image.
            self.abort();
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                FirmwareSinkError::NoSpace
            })?;
            self.ota_update = Some(update);
        }

        self.state = OtaState::Receiving { bytes_written: 0 };
        info!("OTA: begin");
        Ok(())
    }

    fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<ChunkOutcome, FirmwareSinkError> {
        let OtaState::Receiving { bytes_written } = self.state else {
            return Err(FirmwareSinkError::NotReceiving);
        };

        if offset != bytes_written {
            return Err(FirmwareSinkError::NonSequential);
        }
        let new_written = bytes_written.saturating_add(data.len() as u32);
        if new_written > MAX_FIRMWARE_SIZE {
            self.abort();
            return Err(FirmwareSinkError::NoSpace);
        }

        #[cfg(target_os = "espidf")]
        if !data.is_empty() {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(FirmwareSinkError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(FirmwareSinkError::WriteFailed);
            }
        }

        if is_final_chunk(data.len()) {
            if new_written == 0 {
                self.abort();
                return Err(FirmwareSinkError::VerifyFailed);
            }
            self.finalize(new_written)?;
            return Ok(ChunkOutcome::Complete);
        }

        self.state = OtaState::Receiving {
            bytes_written: new_written,
        };
        Ok(ChunkOutcome::More)
    }

    fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts the partition write when OtaUpdate is dropped
            self.ota_update.take();
        }
        if self.state != OtaState::Idle {
            warn!("OTA: aborted");
        }
        self.state = OtaState::Idle;
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
