//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`ParamStorage`].
//!
//! - The node config is one postcard blob (`cannode::nodecfg`), range-checked
//!   before every save.
//! - Parameter slots live in the `params` namespace, one `u32` entry per slot
//!   holding the `f32` bit pattern, keyed by the slot's byte offset.
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`; the simulation
//!   backend is an in-memory map.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, ParamStorage, StorageError};
use crate::config::NodeConfig;
use crate::dronecan::NodeId;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "cannode";
const CONFIG_KEY: &str = "nodecfg";
const PARAM_NAMESPACE: &str = "params";

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 512;

/// NUL-terminated NVS key or namespace (15 characters max).
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn nvs_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

fn slot_key(offset: usize) -> heapless::String<16> {
    use core::fmt::Write;
    let mut key = heapless::String::new();
    let _ = write!(key, "s{}", offset);
    key
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On a full partition or a version mismatch the partition is erased and
    /// re-initialised. Returns `Err(ConfigError::IoError)` if that fails too.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS
            // access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = nvs_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        // Last-resort fallback when flash init failed: nothing persists.
        Self::new().unwrap_or(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

/// Range-check a config before it is persisted.
pub fn validate_config(cfg: &NodeConfig) -> Result<(), ConfigError> {
    if cfg.node_name.is_empty() {
        return Err(ConfigError::ValidationFailed("node_name must not be empty"));
    }
    if cfg.static_node_id.is_some_and(|id| NodeId::new(id).is_none()) {
        return Err(ConfigError::ValidationFailed(
            "static_node_id must be 1–127",
        ));
    }
    if NodeId::new(cfg.preferred_node_id).is_none() {
        return Err(ConfigError::ValidationFailed(
            "preferred_node_id must be 1–127",
        ));
    }
    if !(100..=10_000).contains(&cfg.slow_task_period_ms) {
        return Err(ConfigError::ValidationFailed(
            "slow_task_period_ms must be 100–10000",
        ));
    }
    if !(50..=10_000).contains(&cfg.firmware_retry_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "firmware_retry_interval_ms must be 50–10000",
        ));
    }
    if !(100..=10_000).contains(&cfg.allocation_min_request_period_ms) {
        return Err(ConfigError::ValidationFailed(
            "allocation_min_request_period_ms must be 100–10000",
        ));
    }
    if cfg.allocation_max_followup_delay_ms > 10_000 {
        return Err(ConfigError::ValidationFailed(
            "allocation_max_followup_delay_ms must be 0–10000",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            match self.store.borrow().get(&key) {
                Some(bytes) => {
                    let cfg = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from store");
                    Ok(cfg)
                }
                None => Err(ConfigError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key = nvs_name(CONFIG_KEY);
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }
                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(ConfigError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(ConfigError::Corrupted),
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            info!("NvsAdapter: config saved ({} bytes, simulation)", bytes.len());
            self.store.borrow_mut().insert(key, bytes);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key = nvs_name(CONFIG_KEY);
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    ESP_OK => Ok(()),
                    e => Err(e),
                }
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl ParamStorage for NvsAdapter {
    fn read_slot(&self, offset: usize) -> Result<f32, StorageError> {
        let key = slot_key(offset);

        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(PARAM_NAMESPACE, &key);
            let store = self.store.borrow();
            let bytes = store.get(&composite).ok_or(StorageError::NotFound)?;
            let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| StorageError::IoError)?;
            Ok(f32::from_le_bytes(raw))
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(PARAM_NAMESPACE, false, |handle| {
                let key = nvs_name(&key);
                let mut raw: u32 = 0;
                match unsafe { nvs_get_u32(handle, key.as_ptr().cast(), &mut raw) } {
                    ESP_OK => Ok(raw),
                    e => Err(e),
                }
            });
            match result {
                Ok(raw) => Ok(f32::from_bits(raw)),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write_slot(&mut self, offset: usize, value: f32) -> Result<(), StorageError> {
        let key = slot_key(offset);

        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(PARAM_NAMESPACE, &key);
            self.store
                .borrow_mut()
                .insert(composite, value.to_le_bytes().to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(PARAM_NAMESPACE, true, |handle| {
                let key = nvs_name(&key);
                let ret = unsafe { nvs_set_u32(handle, key.as_ptr().cast(), value.to_bits()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    ESP_OK => Ok(()),
                    e => Err(e),
                }
            });
            result.map_err(|e| {
                warn!("NvsAdapter: slot {} write error {}", offset, e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }
}
