//! DroneCAN (UAVCAN v0) node protocol engine.
//!
//! Dynamic node ID allocation, NodeStatus, GetNodeInfo, the parameter
//! server, RestartNode, and a firmware-update pull client, pumped from one
//! cooperative loop. ESP-IDF code is guarded by
//! `#[cfg(target_os = "espidf")]` inside each adapter; everything else runs
//! on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod dronecan;
pub mod drivers;
pub mod error;
pub mod node;
pub mod runtime;
pub mod scheduler;
