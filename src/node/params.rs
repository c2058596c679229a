//! Typed parameter table.
//!
//! A fixed, ordered set of named scalars. The table index doubles as the
//! persistence slot: parameter `i` lives at byte offset
//! `i * PARAM_SLOT_STRIDE` in [`ParamStorage`]. Values are held as `f32`
//! regardless of kind, matching the slot format.

use log::{debug, info, warn};

use crate::app::ports::{ParamStorage, StorageError};
use crate::dronecan::messages::{NumericValue, ParamValue};

/// Bytes per persisted slot.
pub const PARAM_SLOT_STRIDE: usize = 4;

/// Table capacity.
pub const MAX_PARAMS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ParamKind,
    pub value: f32,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

impl Parameter {
    pub const fn integer(name: &'static str, default: i32, min: i32, max: i32) -> Self {
        Self {
            name,
            kind: ParamKind::Integer,
            value: default as f32,
            default: default as f32,
            min: min as f32,
            max: max as f32,
        }
    }

    pub const fn real(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            kind: ParamKind::Real,
            value: default,
            default,
            min,
            max,
        }
    }

    fn tagged(&self, v: f32) -> ParamValue {
        match self.kind {
            ParamKind::Integer => ParamValue::Integer(v as i64),
            ParamKind::Real => ParamValue::Real(v),
        }
    }

    fn numeric(&self, v: f32) -> NumericValue {
        match self.kind {
            ParamKind::Integer => NumericValue::Integer(v as i64),
            ParamKind::Real => NumericValue::Real(v),
        }
    }

    /// Current value in wire form.
    pub fn value_message(&self) -> ParamValue {
        self.tagged(self.value)
    }

    pub fn default_message(&self) -> ParamValue {
        self.tagged(self.default)
    }

    pub fn min_message(&self) -> NumericValue {
        self.numeric(self.min)
    }

    pub fn max_message(&self) -> NumericValue {
        self.numeric(self.max)
    }

    /// The storable value carried by `value`, if its tag matches this
    /// parameter's kind. Empty and mismatched values yield `None`.
    pub fn accept(&self, value: &ParamValue) -> Option<f32> {
        match (self.kind, value) {
            (ParamKind::Integer, ParamValue::Integer(v)) => Some(*v as f32),
            (ParamKind::Real, ParamValue::Real(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Factory table: the node ID request plus seven general-purpose reals.
pub const DEFAULT_PARAMETERS: [Parameter; 8] = [
    Parameter::integer("NODEID", 0, 0, 127),
    Parameter::real("PARM_1", 0.0, 0.0, 1.0),
    Parameter::real("PARM_2", 0.0, 0.0, 2.0),
    Parameter::real("PARM_3", 0.0, 0.0, 3.0),
    Parameter::real("PARM_4", 0.0, 0.0, 4.0),
    Parameter::real("PARM_5", 0.0, 0.0, 5.0),
    Parameter::real("PARM_6", 0.0, 0.0, 6.0),
    Parameter::real("PARM_7", 0.0, 0.0, 7.0),
];

#[derive(Debug, Clone)]
pub struct ParamTable {
    params: heapless::Vec<Parameter, MAX_PARAMS>,
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new(&DEFAULT_PARAMETERS)
    }
}

impl ParamTable {
    /// Build a table from definitions; entries beyond [`MAX_PARAMS`] and
    /// duplicate names are dropped.
    pub fn new(definitions: &[Parameter]) -> Self {
        let mut params: heapless::Vec<Parameter, MAX_PARAMS> = heapless::Vec::new();
        for def in definitions {
            if params.iter().any(|p| p.name == def.name) {
                warn!("ParamTable: duplicate name '{}' dropped", def.name);
                continue;
            }
            if params.push(*def).is_err() {
                warn!("ParamTable: capacity {} reached, '{}' dropped", MAX_PARAMS, def.name);
            }
        }
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Index of the first parameter whose name equals `name` byte-for-byte.
    pub fn find(&self, name: &[u8]) -> Option<usize> {
        self.params.iter().position(|p| p.name.as_bytes() == name)
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.find(name.as_bytes()).and_then(|i| self.params.get(i))
    }

    /// Update the in-memory value. Returns `false` for an unknown index.
    pub fn set(&mut self, index: usize, value: f32) -> bool {
        match self.params.get_mut(index) {
            Some(p) => {
                p.value = value;
                true
            }
            None => false,
        }
    }

    /// Byte offset of `index` in the persistence backend.
    pub const fn slot_offset(index: usize) -> usize {
        index * PARAM_SLOT_STRIDE
    }

    /// Write parameter `index` to its slot.
    pub fn persist(&self, index: usize, storage: &mut dyn ParamStorage) -> Result<(), StorageError> {
        let Some(p) = self.params.get(index) else {
            return Err(StorageError::NotFound);
        };
        storage.write_slot(Self::slot_offset(index), p.value)
    }

    /// Restore every value to its declared default (in memory only).
    pub fn reset_to_defaults(&mut self) {
        for p in &mut self.params {
            p.value = p.default;
        }
    }

    /// Populate values from storage. Missing or non-finite slots keep the
    /// default. Returns how many slots were loaded.
    pub fn load(&mut self, storage: &dyn ParamStorage) -> usize {
        let mut loaded = 0;
        for (index, p) in self.params.iter_mut().enumerate() {
            match storage.read_slot(Self::slot_offset(index)) {
                Ok(v) if v.is_finite() => {
                    p.value = v;
                    loaded += 1;
                }
                Ok(_) => {
                    debug!("ParamTable: slot {} holds no number, keeping default", index);
                    p.value = p.default;
                }
                Err(StorageError::NotFound) => p.value = p.default,
                Err(e) => {
                    warn!("ParamTable: reading '{}' failed: {}", p.name, e);
                    p.value = p.default;
                }
            }
        }
        info!("ParamTable: loaded {}/{} parameters", loaded, self.params.len());
        loaded
    }
}
