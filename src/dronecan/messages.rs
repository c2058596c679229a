//! Typed DSDL messages spoken by this node.
//!
//! Each type implements [`Message`] with the exact v0 layout of its
//! definition, so payloads interoperate with any DroneCAN peer. Service
//! requests and responses share their service's [`DataType`].

use super::dsdl::{BitReader, BitWriter, Payload, truncated};
use super::{DataType, data_types};
use crate::error::DecodeError;

/// A DSDL type with a fixed data type ID and signature.
pub trait Message: Sized {
    const DATA_TYPE: DataType;

    /// Serialise as a top-level payload (tail-array rules apply).
    fn encode(&self) -> Payload;

    /// Parse a top-level payload.
    fn decode(payload: &[u8]) -> Result<Self, DecodeError>;
}

/// Length of the hardware unique ID in bytes.
pub const UNIQUE_ID_LEN: usize = 16;

/// Bound of `uavcan.protocol.file.Path.path`.
pub const MAX_PATH_LEN: usize = 200;

/// Bound of `uavcan.protocol.file.Read.Response.data`.
pub const MAX_READ_CHUNK: usize = 256;

/// Bound of `uavcan.protocol.param.GetSet` names.
pub const MAX_PARAM_NAME_LEN: usize = 92;

pub type UniqueIdBytes = heapless::Vec<u8, UNIQUE_ID_LEN>;
pub type PathBytes = heapless::Vec<u8, MAX_PATH_LEN>;
pub type ParamName = heapless::Vec<u8, MAX_PARAM_NAME_LEN>;

// ═══════════════════════════════════════════════════════════════
//  uavcan.protocol.dynamic_node_id.Allocation
// ═══════════════════════════════════════════════════════════════

/// Dynamic node ID allocation message. Allocatees send it anonymously with
/// a slice of their unique ID; the allocator echoes the accumulated prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub node_id: u8,
    pub first_part_of_unique_id: bool,
    pub unique_id: UniqueIdBytes,
}

impl Message for Allocation {
    const DATA_TYPE: DataType = data_types::ALLOCATION;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(u64::from(self.node_id), 7);
        w.write_bool(self.first_part_of_unique_id);
        w.write_bytes(&self.unique_id);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            node_id: r.read_unsigned(7)? as u8,
            first_part_of_unique_id: r.read_bool()?,
            unique_id: r.read_tail_bytes()?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  uavcan.protocol.NodeStatus
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Health {
    Ok = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl Health {
    fn from_bits(raw: u8) -> Self {
        match raw & 0b11 {
            0 => Self::Ok,
            1 => Self::Warning,
            2 => Self::Error,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Operational = 0,
    Initialization = 1,
    Maintenance = 2,
    SoftwareUpdate = 3,
    Offline = 7,
}

impl Mode {
    fn from_bits(raw: u8) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Operational),
            1 => Ok(Self::Initialization),
            2 => Ok(Self::Maintenance),
            3 => Ok(Self::SoftwareUpdate),
            7 => Ok(Self::Offline),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Heartbeat published by every allocated node once per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub uptime_sec: u32,
    pub health: Health,
    pub mode: Mode,
    pub sub_mode: u8,
    pub vendor_specific_status_code: u16,
}

impl NodeStatus {
    fn encode_into(&self, w: &mut BitWriter) {
        w.write_unsigned(u64::from(self.uptime_sec), 32);
        w.write_unsigned(self.health as u64, 2);
        w.write_unsigned(self.mode as u64, 3);
        w.write_unsigned(u64::from(self.sub_mode), 3);
        w.write_unsigned(u64::from(self.vendor_specific_status_code), 16);
    }

    fn decode_from(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            uptime_sec: r.read_unsigned(32)? as u32,
            health: Health::from_bits(r.read_unsigned(2)? as u8),
            mode: Mode::from_bits(r.read_unsigned(3)? as u8)?,
            sub_mode: r.read_unsigned(3)? as u8,
            vendor_specific_status_code: r.read_unsigned(16)? as u16,
        })
    }
}

impl Message for NodeStatus {
    const DATA_TYPE: DataType = data_types::NODE_STATUS;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        self.encode_into(&mut w);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_from(&mut BitReader::new(payload))
    }
}

// ═══════════════════════════════════════════════════════════════
//  uavcan.protocol.param.{Value, NumericValue, GetSet, ExecuteOpcode}
// ═══════════════════════════════════════════════════════════════

/// `uavcan.protocol.param.Value` (5-way union, 3 tag bits).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Empty,
    Integer(i64),
    Real(f32),
    Boolean(bool),
    String(heapless::Vec<u8, 128>),
}

impl ParamValue {
    fn encode_into(&self, w: &mut BitWriter) {
        match self {
            Self::Empty => w.write_unsigned(0, 3),
            Self::Integer(v) => {
                w.write_unsigned(1, 3);
                w.write_signed(*v, 64);
            }
            Self::Real(v) => {
                w.write_unsigned(2, 3);
                w.write_f32(*v);
            }
            Self::Boolean(v) => {
                w.write_unsigned(3, 3);
                w.write_unsigned(u64::from(*v), 8);
            }
            Self::String(s) => {
                w.write_unsigned(4, 3);
                w.write_prefixed_bytes(s, 8);
            }
        }
    }

    fn decode_from(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        match r.read_unsigned(3)? as u8 {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Integer(r.read_signed(64)?)),
            2 => Ok(Self::Real(r.read_f32()?)),
            3 => Ok(Self::Boolean(r.read_u8()? != 0)),
            4 => Ok(Self::String(r.read_prefixed_bytes(8)?)),
            tag => Err(DecodeError::InvalidUnionTag(tag)),
        }
    }
}

/// `uavcan.protocol.param.NumericValue` (3-way union, 2 tag bits).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Empty,
    Integer(i64),
    Real(f32),
}

impl NumericValue {
    fn encode_into(self, w: &mut BitWriter) {
        match self {
            Self::Empty => w.write_unsigned(0, 2),
            Self::Integer(v) => {
                w.write_unsigned(1, 2);
                w.write_signed(v, 64);
            }
            Self::Real(v) => {
                w.write_unsigned(2, 2);
                w.write_f32(v);
            }
        }
    }

    fn decode_from(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        match r.read_unsigned(2)? as u8 {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Integer(r.read_signed(64)?)),
            2 => Ok(Self::Real(r.read_f32()?)),
            tag => Err(DecodeError::InvalidUnionTag(tag)),
        }
    }
}

/// GetSet request: read by index or name, write when a value is present.
#[derive(Debug, Clone, PartialEq)]
pub struct GetSetRequest {
    /// 13-bit parameter index.
    pub index: u16,
    pub value: ParamValue,
    pub name: ParamName,
}

impl Message for GetSetRequest {
    const DATA_TYPE: DataType = data_types::PARAM_GET_SET;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(u64::from(self.index), 13);
        self.value.encode_into(&mut w);
        w.write_bytes(&self.name);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            index: r.read_unsigned(13)? as u16,
            value: ParamValue::decode_from(&mut r)?,
            name: r.read_tail_bytes()?,
        })
    }
}

/// GetSet response. An empty `name` means "no such parameter".
#[derive(Debug, Clone, PartialEq)]
pub struct GetSetResponse {
    pub value: ParamValue,
    pub default_value: ParamValue,
    pub max_value: NumericValue,
    pub min_value: NumericValue,
    pub name: ParamName,
}

impl GetSetResponse {
    /// The all-empty reply for an unresolved lookup.
    pub fn empty() -> Self {
        Self {
            value: ParamValue::Empty,
            default_value: ParamValue::Empty,
            max_value: NumericValue::Empty,
            min_value: NumericValue::Empty,
            name: ParamName::new(),
        }
    }
}

impl Message for GetSetResponse {
    const DATA_TYPE: DataType = data_types::PARAM_GET_SET;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_void(5);
        self.value.encode_into(&mut w);
        w.write_void(5);
        self.default_value.encode_into(&mut w);
        w.write_void(6);
        self.max_value.encode_into(&mut w);
        w.write_void(6);
        self.min_value.encode_into(&mut w);
        w.write_bytes(&self.name);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        r.skip(5)?;
        let value = ParamValue::decode_from(&mut r)?;
        r.skip(5)?;
        let default_value = ParamValue::decode_from(&mut r)?;
        r.skip(6)?;
        let max_value = NumericValue::decode_from(&mut r)?;
        r.skip(6)?;
        let min_value = NumericValue::decode_from(&mut r)?;
        Ok(Self {
            value,
            default_value,
            max_value,
            min_value,
            name: r.read_tail_bytes()?,
        })
    }
}

/// Commit the in-memory parameter table to storage.
pub const OPCODE_SAVE: u8 = 0;
/// Restore every parameter to its default and commit.
pub const OPCODE_ERASE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOpcodeRequest {
    pub opcode: u8,
    /// 48-bit signed argument, unused by the standard opcodes.
    pub argument: i64,
}

impl Message for ExecuteOpcodeRequest {
    const DATA_TYPE: DataType = data_types::PARAM_EXECUTE_OPCODE;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(u64::from(self.opcode), 8);
        w.write_signed(self.argument, 48);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            opcode: r.read_u8()?,
            argument: r.read_signed(48)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOpcodeResponse {
    pub argument: i64,
    pub ok: bool,
}

impl Message for ExecuteOpcodeResponse {
    const DATA_TYPE: DataType = data_types::PARAM_EXECUTE_OPCODE;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_signed(self.argument, 48);
        w.write_bool(self.ok);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            argument: r.read_signed(48)?,
            ok: r.read_bool()?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  uavcan.protocol.file.{Read, BeginFirmwareUpdate}
// ═══════════════════════════════════════════════════════════════

/// `uavcan.protocol.file.Error` codes (errno-like).
pub mod file_error {
    pub const OK: i16 = 0;
    pub const NOT_FOUND: i16 = 2;
    pub const IO_ERROR: i16 = 5;
    pub const ACCESS_DENIED: i16 = 13;
    pub const IS_DIRECTORY: i16 = 21;
    pub const INVALID_VALUE: i16 = 22;
    pub const FILE_TOO_LARGE: i16 = 27;
    pub const OUT_OF_SPACE: i16 = 28;
    pub const NOT_IMPLEMENTED: i16 = 38;
    pub const UNKNOWN_ERROR: i16 = 32767;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// 40-bit byte offset.
    pub offset: u64,
    pub path: PathBytes,
}

impl Message for ReadRequest {
    const DATA_TYPE: DataType = data_types::FILE_READ;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(self.offset, 40);
        w.write_bytes(&self.path);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            offset: r.read_unsigned(40)?,
            path: r.read_tail_bytes()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub error: i16,
    pub data: heapless::Vec<u8, MAX_READ_CHUNK>,
}

impl Message for ReadResponse {
    const DATA_TYPE: DataType = data_types::FILE_READ;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_signed(i64::from(self.error), 16);
        w.write_bytes(&self.data);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            error: r.read_signed(16)? as i16,
            data: r.read_tail_bytes()?,
        })
    }
}

pub mod begin_fw_error {
    pub const OK: u8 = 0;
    pub const INVALID_MODE: u8 = 1;
    pub const IN_PROGRESS: u8 = 2;
    pub const UNKNOWN: u8 = 255;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginFirmwareUpdateRequest {
    /// Node serving the image; 0 means "the requester".
    pub source_node_id: u8,
    pub image_file_remote_path: PathBytes,
}

impl Message for BeginFirmwareUpdateRequest {
    const DATA_TYPE: DataType = data_types::FILE_BEGIN_FIRMWARE_UPDATE;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(u64::from(self.source_node_id), 8);
        w.write_bytes(&self.image_file_remote_path);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            source_node_id: r.read_u8()?,
            image_file_remote_path: r.read_tail_bytes()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginFirmwareUpdateResponse {
    pub error: u8,
    pub optional_error_message: heapless::Vec<u8, 127>,
}

impl BeginFirmwareUpdateResponse {
    pub fn new(error: u8, message: &str) -> Self {
        let optional_error_message = truncated(message.as_bytes());
        Self {
            error,
            optional_error_message,
        }
    }
}

impl Message for BeginFirmwareUpdateResponse {
    const DATA_TYPE: DataType = data_types::FILE_BEGIN_FIRMWARE_UPDATE;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(u64::from(self.error), 8);
        w.write_bytes(&self.optional_error_message);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            error: r.read_u8()?,
            optional_error_message: r.read_tail_bytes()?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  uavcan.protocol.{GetNodeInfo, RestartNode}
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftwareVersion {
    pub major: u8,
    pub minor: u8,
    pub optional_field_flags: u8,
    pub vcs_commit: u32,
    pub image_crc: u64,
}

impl SoftwareVersion {
    pub const FLAG_VCS_COMMIT: u8 = 1;
    pub const FLAG_IMAGE_CRC: u8 = 2;

    fn encode_into(&self, w: &mut BitWriter) {
        w.write_unsigned(u64::from(self.major), 8);
        w.write_unsigned(u64::from(self.minor), 8);
        w.write_unsigned(u64::from(self.optional_field_flags), 8);
        w.write_unsigned(u64::from(self.vcs_commit), 32);
        w.write_unsigned(self.image_crc, 64);
    }

    fn decode_from(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            major: r.read_u8()?,
            minor: r.read_u8()?,
            optional_field_flags: r.read_u8()?,
            vcs_commit: r.read_unsigned(32)? as u32,
            image_crc: r.read_unsigned(64)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareVersion {
    pub major: u8,
    pub minor: u8,
    pub unique_id: [u8; UNIQUE_ID_LEN],
    pub certificate_of_authenticity: heapless::Vec<u8, 255>,
}

impl HardwareVersion {
    fn encode_into(&self, w: &mut BitWriter) {
        w.write_unsigned(u64::from(self.major), 8);
        w.write_unsigned(u64::from(self.minor), 8);
        w.write_bytes(&self.unique_id);
        w.write_prefixed_bytes(&self.certificate_of_authenticity, 8);
    }

    fn decode_from(r: &mut BitReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            major: r.read_u8()?,
            minor: r.read_u8()?,
            unique_id: r.read_array()?,
            certificate_of_authenticity: r.read_prefixed_bytes(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNodeInfoResponse {
    pub status: NodeStatus,
    pub software_version: SoftwareVersion,
    pub hardware_version: HardwareVersion,
    pub name: heapless::Vec<u8, 80>,
}

impl Message for GetNodeInfoResponse {
    const DATA_TYPE: DataType = data_types::GET_NODE_INFO;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        self.status.encode_into(&mut w);
        self.software_version.encode_into(&mut w);
        self.hardware_version.encode_into(&mut w);
        w.write_bytes(&self.name);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            status: NodeStatus::decode_from(&mut r)?,
            software_version: SoftwareVersion::decode_from(&mut r)?,
            hardware_version: HardwareVersion::decode_from(&mut r)?,
            name: r.read_tail_bytes()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartNodeRequest {
    /// 40-bit magic; peers send [`RestartNodeRequest::MAGIC`].
    pub magic_number: u64,
}

impl RestartNodeRequest {
    pub const MAGIC: u64 = 0xAC_CE55_1B1E;
}

impl Message for RestartNodeRequest {
    const DATA_TYPE: DataType = data_types::RESTART_NODE;

    fn encode(&self) -> Payload {
        let mut w = BitWriter::new();
        w.write_unsigned(self.magic_number, 40);
        w.finish()
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BitReader::new(payload);
        Ok(Self {
            magic_number: r.read_unsigned(40)?,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Copy a string into a bounded byte vector, truncating at `N`.
pub fn bounded_bytes<const N: usize>(s: &str) -> heapless::Vec<u8, N> {
    truncated(s.as_bytes())
}
