//! Typed decoding of inbound message tails.
//!
//! [`Message::parse`] identifies the message kind from the common header and
//! decodes the tail into one record per kind. Kinds the library does not
//! handle decode to [`Message::Unknown`] so the dispatcher can skip them
//! without failing.

use serde::{Deserialize, Serialize};

use super::{
    ByteReader, RecvHeader, MAX_PATH, RECV_ID_EVENT, RECV_ID_EVENT_FILENAME,
    RECV_ID_EVENT_FRAME, RECV_ID_EVENT_OBJECT_ADDREMOVE, RECV_ID_EXCEPTION, RECV_ID_OPEN,
    RECV_ID_QUIT, RECV_ID_SIMOBJECT_DATA, RECV_ID_SYSTEM_STATE,
};
use crate::{FlightdeckError, Result};

/// A fully decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server-side exception raised for an earlier request.
    Exception(ExceptionNotice),
    /// Confirmation of a successful open, carrying the host application name.
    Open(OpenConfirmation),
    /// The host is shutting the session down.
    Quit,
    /// A system event (basic, filename, object-lifecycle, or frame).
    Event(EventRecord),
    /// Current value(s) for an armed data request.
    SimObjectData(DataSample),
    /// Response to a system-state request.
    SystemState(SystemStateRecord),
    /// A kind this library does not decode.
    Unknown(u32),
}

/// Exception notice: the host rejected or failed an earlier call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionNotice {
    /// Vendor exception code.
    pub code: u32,
    /// Send ID of the offending call.
    pub send_id: u32,
    /// Index of the offending parameter, when applicable.
    pub index: u32,
}

/// Open confirmation sent once after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenConfirmation {
    /// Name of the host application.
    pub application_name: String,
}

/// The variant-specific tail of a system event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemEventKind {
    /// Event ID and datum only.
    Basic,
    /// Carries the path of the file the event refers to.
    Filename { path: String },
    /// Carries the ID of the object that was added or removed.
    ObjectLifecycle { object_id: u32 },
    /// Carries the current frame rate.
    Frame { frame_rate: f32 },
}

/// A decoded system event, before subscription lookup fills in the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Client event ID assigned at subscription time.
    pub event_id: u32,
    /// 32-bit event payload; meaning depends on the event.
    pub datum: u32,
    /// Variant discriminator and variant-specific fields.
    pub kind: SystemEventKind,
}

/// A decoded data sample for an armed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSample {
    /// Request ID the sample answers.
    pub request_id: u32,
    /// Object the sample describes.
    pub object_id: u32,
    /// Data definition the payload follows.
    pub definition_id: u32,
    /// Delivery flags echoed by the host.
    pub flags: u32,
    /// Reserved by the host.
    pub entry_number: u32,
    /// Reserved by the host.
    pub out_of: u32,
    /// Number of definition entries in the payload.
    pub define_count: u32,
    /// Raw payload bytes following the fixed fields.
    pub payload: Vec<u8>,
}

impl DataSample {
    /// First 64-bit little-endian float of the payload, or `None` when the
    /// payload is shorter than 8 bytes.
    pub fn first_value(&self) -> Option<f64> {
        let bytes: [u8; 8] = self.payload.get(..8)?.try_into().ok()?;
        Some(f64::from_le_bytes(bytes))
    }
}

/// Response to a system-state request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateRecord {
    /// Request ID the response answers.
    pub request_id: u32,
    /// Integer/boolean value of the state.
    pub integer: u32,
    /// Float value of the state.
    pub float: f32,
    /// String value of the state.
    pub string: String,
}

impl Message {
    /// Decode an inbound buffer into a typed message.
    ///
    /// The declared size must fit inside the buffer; the tail is decoded with
    /// bounds checks on every field.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let header = RecvHeader::parse(buffer)?;
        let declared = header.size as usize;
        if declared > buffer.len() {
            return Err(FlightdeckError::malformed(
                "message header",
                format!("declared size {declared} exceeds buffer of {} bytes", buffer.len()),
            ));
        }
        let body = &buffer[RecvHeader::SIZE..declared];

        match header.kind {
            RECV_ID_EXCEPTION => {
                let mut reader = ByteReader::new(body, "exception notice");
                Ok(Message::Exception(ExceptionNotice {
                    code: reader.read_u32()?,
                    send_id: reader.read_u32()?,
                    index: reader.read_u32()?,
                }))
            }
            RECV_ID_OPEN => {
                let mut reader = ByteReader::new(body, "open confirmation");
                let application_name = reader.read_cstring(256)?;
                Ok(Message::Open(OpenConfirmation { application_name }))
            }
            RECV_ID_QUIT => Ok(Message::Quit),
            RECV_ID_EVENT => {
                let mut reader = ByteReader::new(body, "event");
                Ok(Message::Event(EventRecord {
                    event_id: reader.read_u32()?,
                    datum: reader.read_u32()?,
                    kind: SystemEventKind::Basic,
                }))
            }
            RECV_ID_EVENT_FILENAME => {
                let mut reader = ByteReader::new(body, "filename event");
                let event_id = reader.read_u32()?;
                let datum = reader.read_u32()?;
                let path = reader.read_cstring(MAX_PATH)?;
                Ok(Message::Event(EventRecord {
                    event_id,
                    datum,
                    kind: SystemEventKind::Filename { path },
                }))
            }
            RECV_ID_EVENT_OBJECT_ADDREMOVE => {
                let mut reader = ByteReader::new(body, "object lifecycle event");
                let event_id = reader.read_u32()?;
                let datum = reader.read_u32()?;
                let object_id = reader.read_u32()?;
                Ok(Message::Event(EventRecord {
                    event_id,
                    datum,
                    kind: SystemEventKind::ObjectLifecycle { object_id },
                }))
            }
            RECV_ID_EVENT_FRAME => {
                let mut reader = ByteReader::new(body, "frame event");
                let event_id = reader.read_u32()?;
                let datum = reader.read_u32()?;
                let frame_rate = reader.read_f32()?;
                Ok(Message::Event(EventRecord {
                    event_id,
                    datum,
                    kind: SystemEventKind::Frame { frame_rate },
                }))
            }
            RECV_ID_SIMOBJECT_DATA => {
                let mut reader = ByteReader::new(body, "data sample");
                let request_id = reader.read_u32()?;
                let object_id = reader.read_u32()?;
                let definition_id = reader.read_u32()?;
                let flags = reader.read_u32()?;
                let entry_number = reader.read_u32()?;
                let out_of = reader.read_u32()?;
                let define_count = reader.read_u32()?;
                let payload = reader.remaining().to_vec();
                Ok(Message::SimObjectData(DataSample {
                    request_id,
                    object_id,
                    definition_id,
                    flags,
                    entry_number,
                    out_of,
                    define_count,
                    payload,
                }))
            }
            RECV_ID_SYSTEM_STATE => {
                let mut reader = ByteReader::new(body, "system state");
                Ok(Message::SystemState(SystemStateRecord {
                    request_id: reader.read_u32()?,
                    integer: reader.read_u32()?,
                    float: reader.read_f32()?,
                    string: reader.read_cstring(MAX_PATH)?,
                }))
            }
            other => Ok(Message::Unknown(other)),
        }
    }
}
