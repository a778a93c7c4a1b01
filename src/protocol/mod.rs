//! SimConnect wire protocol: message-kind codes, request enumerations, and
//! the inbound message codec.
//!
//! The wire format belongs to the vendor DLL; this module only describes it.
//! Every inbound buffer begins with a twelve-byte [`RecvHeader`] (total size,
//! protocol version, message-kind code); the tail layout depends on the kind.
//! Parsing goes through the bounds-checked [`ByteReader`] — the declared size
//! is validated against the buffer before any field read, and fixed-width
//! C strings are truncated at the first NUL byte.

mod messages;
mod reader;

pub use messages::{
    DataSample, EventRecord, ExceptionNotice, Message, OpenConfirmation, SystemEventKind,
    SystemStateRecord,
};
pub use reader::ByteReader;

use serde::{Deserialize, Serialize};

use crate::{FlightdeckError, Result};

/// Message-kind codes carried in [`RecvHeader::kind`].
pub const RECV_ID_NULL: u32 = 0x0000_0000;
pub const RECV_ID_EXCEPTION: u32 = 0x0000_0001;
pub const RECV_ID_OPEN: u32 = 0x0000_0002;
pub const RECV_ID_QUIT: u32 = 0x0000_0003;
pub const RECV_ID_EVENT: u32 = 0x0000_0004;
pub const RECV_ID_EVENT_OBJECT_ADDREMOVE: u32 = 0x0000_0005;
pub const RECV_ID_EVENT_FILENAME: u32 = 0x0000_0006;
pub const RECV_ID_EVENT_FRAME: u32 = 0x0000_0007;
pub const RECV_ID_SIMOBJECT_DATA: u32 = 0x0000_0008;
pub const RECV_ID_SYSTEM_STATE: u32 = 0x0000_000F;

/// Fixed path width used by filename events and system-state strings
/// (Windows MAX_PATH).
pub const MAX_PATH: usize = 260;

/// System state names accepted by `request_system_state`.
pub mod system_state {
    /// Full path of the last loaded aircraft flight dynamics file.
    pub const AIRCRAFT_LOADED: &str = "AircraftLoaded";
    /// Whether the simulation is in dialog mode.
    pub const DIALOG_MODE: &str = "DialogMode";
    /// Full path of the last loaded flight.
    pub const FLIGHT_LOADED: &str = "FlightLoaded";
    /// Full path of the active flight plan (empty when none is active).
    pub const FLIGHT_PLAN: &str = "FlightPlan";
    /// 1 when the user is in control of the aircraft, 0 when navigating UI.
    pub const SIM: &str = "Sim";
}

/// Datum types accepted by the host for data-definition fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum DatumType {
    Int32 = 1,
    Int64 = 2,
    Float32 = 3,
    Float64 = 4,
    String8 = 5,
    String32 = 6,
    String64 = 7,
    String128 = 8,
    String256 = 9,
    String260 = 10,
}

impl DatumType {
    /// Raw wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Delivery cadence for an armed data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum Period {
    Never = 0,
    Once = 1,
    VisualFrame = 2,
    SimFrame = 3,
    Second = 4,
}

impl Period {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Delivery filter for an armed data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum DataRequestFlag {
    /// Deliver on every period boundary.
    Default = 0,
    /// Deliver only when the value changed since the last delivery.
    Changed = 1,
}

impl DataRequestFlag {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Simulation object selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The player's aircraft.
    pub const USER: ObjectId = ObjectId(0);

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// On/off switch for a subscribed system event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventState {
    Off = 0,
    On = 1,
}

impl EventState {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Common header at the start of every inbound message.
///
/// Three 32-bit little-endian fields in declaration order: total size in
/// bytes, protocol version, message-kind code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvHeader {
    /// Total message size in bytes, header included.
    pub size: u32,
    /// Protocol version reported by the host.
    pub version: u32,
    /// Message-kind code (one of the `RECV_ID_*` constants).
    pub kind: u32,
}

impl RecvHeader {
    /// Encoded size of the header in bytes.
    pub const SIZE: usize = 12;

    /// Parse the header from the front of an inbound buffer.
    ///
    /// Rejects buffers shorter than the header and messages whose declared
    /// size is smaller than the header itself.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(buffer, "message header");
        let size = reader.read_u32()?;
        let version = reader.read_u32()?;
        let kind = reader.read_u32()?;

        if (size as usize) < Self::SIZE {
            return Err(FlightdeckError::malformed(
                "message header",
                format!("declared size {size} is smaller than the {}-byte header", Self::SIZE),
            ));
        }

        Ok(Self { size, version, kind })
    }

    /// Encode the header into its twelve-byte wire form.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.kind.to_le_bytes());
        out
    }
}
