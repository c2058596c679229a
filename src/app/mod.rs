//! Application core: protocol orchestration, zero direct I/O.
//!
//! [`service::NodeService`] owns every piece of node state and runs the
//! frame pump. All interaction with the platform happens through the
//! **port traits** in [`ports`] and the bus collaborators in
//! [`crate::dronecan::transport`], so the whole engine runs on the host
//! against mocks.

pub mod events;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
