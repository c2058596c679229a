//! `param.GetSet` / `param.ExecuteOpcode` server over the [`ParamTable`].
//!
//! Lookup rules for GetSet:
//! - a non-empty name selects the first parameter with exactly that name,
//!   and nothing else (no index fallback on a miss)
//! - an empty name selects by index when in range
//!
//! Writes happen only for name-resolved parameters with a non-empty value
//! whose tag matches the parameter kind. An accepted write reaches storage
//! before the handler returns, so the response can never overtake it.

use log::{debug, info, warn};

use crate::app::ports::{ParamStorage, StorageError};
use crate::dronecan::messages::{
    ExecuteOpcodeRequest, ExecuteOpcodeResponse, GetSetRequest, GetSetResponse, OPCODE_ERASE,
    OPCODE_SAVE, ParamName,
};
use crate::dronecan::truncated;

use super::params::ParamTable;

/// A parameter write accepted by [`ParamService::handle_get_set`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamWrite {
    pub index: usize,
    pub value: f32,
    /// Outcome of the synchronous slot write. The in-memory value keeps the
    /// new value either way.
    pub persisted: Result<(), StorageError>,
}

/// Result of a GetSet request.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamReply {
    /// Index of the resolved parameter, `None` if nothing matched.
    pub index: Option<usize>,
    pub write: Option<ParamWrite>,
    pub response: GetSetResponse,
}

/// A slot that could not be written during SAVE or ERASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFailure {
    pub index: usize,
    pub error: StorageError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeAction {
    Saved,
    Erased,
    Unknown(u8),
}

/// Result of an ExecuteOpcode request.
#[derive(Debug, Clone, PartialEq)]
pub struct OpcodeReply {
    pub action: OpcodeAction,
    /// First slot write that failed, if any.
    pub failure: Option<SlotFailure>,
    pub response: ExecuteOpcodeResponse,
}

#[derive(Debug, Clone, Default)]
pub struct ParamService {
    table: ParamTable,
}

impl ParamService {
    pub fn new(table: ParamTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ParamTable {
        &self.table
    }

    fn resolve(&self, request: &GetSetRequest) -> (Option<usize>, bool) {
        if !request.name.is_empty() {
            return (self.table.find(&request.name), true);
        }
        let index = usize::from(request.index);
        ((index < self.table.len()).then_some(index), false)
    }

    /// Serve one GetSet request.
    pub fn handle_get_set(
        &mut self,
        request: &GetSetRequest,
        storage: &mut dyn ParamStorage,
    ) -> ParamReply {
        let (index, by_name) = self.resolve(request);
        let Some(index) = index else {
            debug!(
                "ParamService: nothing at index {} (name length {})",
                request.index,
                request.name.len()
            );
            return ParamReply {
                index: None,
                write: None,
                response: GetSetResponse::empty(),
            };
        };

        let mut write = None;
        if by_name {
            let accepted = self.table.get(index).and_then(|p| p.accept(&request.value));
            if let Some(value) = accepted {
                self.table.set(index, value);
                let persisted = self.table.persist(index, storage);
                if let Err(e) = persisted {
                    warn!("ParamService: persisting index {} failed: {}", index, e);
                }
                write = Some(ParamWrite {
                    index,
                    value,
                    persisted,
                });
            }
        }

        ParamReply {
            index: Some(index),
            write,
            response: self.describe(index),
        }
    }

    fn describe(&self, index: usize) -> GetSetResponse {
        let Some(p) = self.table.get(index) else {
            return GetSetResponse::empty();
        };
        let name: ParamName = truncated(p.name.as_bytes());
        GetSetResponse {
            value: p.value_message(),
            default_value: p.default_message(),
            max_value: p.max_message(),
            min_value: p.min_message(),
            name,
        }
    }

    /// Serve one ExecuteOpcode request. SAVE and ERASE are always
    /// acknowledged; slot failures are reported alongside.
    pub fn handle_execute_opcode(
        &mut self,
        request: &ExecuteOpcodeRequest,
        storage: &mut dyn ParamStorage,
    ) -> OpcodeReply {
        let action = match request.opcode {
            OPCODE_SAVE => OpcodeAction::Saved,
            OPCODE_ERASE => {
                self.table.reset_to_defaults();
                OpcodeAction::Erased
            }
            other => OpcodeAction::Unknown(other),
        };

        let failure = match action {
            OpcodeAction::Saved | OpcodeAction::Erased => self.save_all(storage),
            OpcodeAction::Unknown(op) => {
                debug!("ParamService: unknown opcode {}", op);
                None
            }
        };
        if failure.is_none() && !matches!(action, OpcodeAction::Unknown(_)) {
            info!("ParamService: {:?}, {} slots committed", action, self.table.len());
        }

        OpcodeReply {
            action,
            failure,
            response: ExecuteOpcodeResponse {
                argument: 0,
                ok: !matches!(action, OpcodeAction::Unknown(_)),
            },
        }
    }

    fn save_all(&self, storage: &mut dyn ParamStorage) -> Option<SlotFailure> {
        let mut first = None;
        for index in 0..self.table.len() {
            if let Err(error) = self.table.persist(index, storage) {
                warn!("ParamService: slot {} not saved: {}", index, error);
                first.get_or_insert(SlotFailure { index, error });
            }
        }
        first
    }
}
