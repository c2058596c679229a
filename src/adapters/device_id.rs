//! Hardware unique ID derived from the ESP32 factory MAC address.
//!
//! The 16-byte DroneCAN unique ID is the 6-byte eFuse MAC followed by ten
//! zero bytes. It is stable across reboots and firmware updates.

use crate::dronecan::messages::UNIQUE_ID_LEN;
use crate::node::identity::UniqueId;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn unique_id_from_mac(mac: &MacAddress) -> UniqueId {
    let mut raw = [0u8; UNIQUE_ID_LEN];
    raw[..mac.len()].copy_from_slice(mac);
    UniqueId(raw)
}

/// This device's unique ID.
pub fn read_unique_id() -> UniqueId {
    unique_id_from_mac(&read_mac())
}

/// Short label for logs: `CN-XXYYZZ` from the last three MAC bytes.
pub fn short_id(mac: &MacAddress) -> heapless::String<16> {
    use core::fmt::Write;
    let mut id = heapless::String::new();
    let _ = write!(id, "CN-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}
