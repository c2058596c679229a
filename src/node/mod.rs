//! Node protocol components.
//!
//! Each component owns its own slice of state and is driven by the
//! [`NodeService`](crate::app::service::NodeService) pump through plain
//! method calls. None of them hold a reference to the transport or the
//! platform ports; those are passed in per call.

pub mod allocation;
pub mod dispatch;
pub mod firmware;
pub mod identity;
pub mod param_service;
pub mod params;
pub mod status;

pub use allocation::{AllocationClient, AllocationProgress, AllocationState, AllocationTiming};
pub use dispatch::{Route, Router};
pub use firmware::{FirmwareClient, FirmwareSession, ReadOutcome};
pub use identity::{NodeIdentity, UniqueId};
pub use param_service::ParamService;
pub use params::{ParamKind, ParamTable, Parameter};
pub use status::StatusBroadcaster;
