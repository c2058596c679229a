//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements    | Connects to                  |
//! |--------------|---------------|------------------------------|
//! | `device_id`  | (boot input)  | eFuse factory MAC            |
//! | `entropy`    | RandomSource  | ESP32 hardware RNG           |
//! | `log_sink`   | EventSink     | Serial log output            |
//! | `nvs`        | ConfigPort    | NVS / in-memory store        |
//! |              | ParamStorage  |                              |
//! | `ota_sink`   | FirmwareSink  | Inactive OTA app partition   |
//! | `time`       | ClockPort     | ESP32 system timer           |

pub mod device_id;
pub mod entropy;
pub mod log_sink;
pub mod nvs;
pub mod ota_sink;
pub mod time;
