//! Inbound routing table.
//!
//! [`Router`] is both the transport's accept filter and the classifier the
//! service switches on, so the set of reassembled transfers and the set of
//! handled transfers cannot drift apart.

use crate::dronecan::transport::AcceptFilter;
use crate::dronecan::{DataType, TransferKind, data_types};

/// Owner of an accepted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Allocation,
    GetNodeInfo,
    ParamGetSet,
    ParamExecuteOpcode,
    BeginFirmwareUpdate,
    RestartNode,
    FileReadResponse,
}

impl Route {
    pub const fn data_type(self) -> DataType {
        match self {
            Self::Allocation => data_types::ALLOCATION,
            Self::GetNodeInfo => data_types::GET_NODE_INFO,
            Self::ParamGetSet => data_types::PARAM_GET_SET,
            Self::ParamExecuteOpcode => data_types::PARAM_EXECUTE_OPCODE,
            Self::BeginFirmwareUpdate => data_types::FILE_BEGIN_FIRMWARE_UPDATE,
            Self::RestartNode => data_types::RESTART_NODE,
            Self::FileReadResponse => data_types::FILE_READ,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    /// Classify `(kind, data type ID)`. `None` means the node ignores it.
    pub const fn route(kind: TransferKind, data_type_id: u16) -> Option<Route> {
        const ALLOCATION: u16 = data_types::ALLOCATION.id;
        const GET_NODE_INFO: u16 = data_types::GET_NODE_INFO.id;
        const GET_SET: u16 = data_types::PARAM_GET_SET.id;
        const EXECUTE_OPCODE: u16 = data_types::PARAM_EXECUTE_OPCODE.id;
        const BEGIN_FW: u16 = data_types::FILE_BEGIN_FIRMWARE_UPDATE.id;
        const RESTART: u16 = data_types::RESTART_NODE.id;
        const FILE_READ: u16 = data_types::FILE_READ.id;

        match (kind, data_type_id) {
            (TransferKind::Broadcast, ALLOCATION) => Some(Route::Allocation),
            (TransferKind::Request, GET_NODE_INFO) => Some(Route::GetNodeInfo),
            (TransferKind::Request, GET_SET) => Some(Route::ParamGetSet),
            (TransferKind::Request, EXECUTE_OPCODE) => Some(Route::ParamExecuteOpcode),
            (TransferKind::Request, BEGIN_FW) => Some(Route::BeginFirmwareUpdate),
            (TransferKind::Request, RESTART) => Some(Route::RestartNode),
            (TransferKind::Response, FILE_READ) => Some(Route::FileReadResponse),
            _ => None,
        }
    }
}

impl AcceptFilter for Router {
    fn accept(&self, kind: TransferKind, data_type_id: u16) -> Option<DataType> {
        Self::route(kind, data_type_id).map(Route::data_type)
    }
}
