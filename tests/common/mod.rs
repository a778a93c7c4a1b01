//! Shared test fixtures: a scripted stand-in for the native bridge and
//! builders for synthetic inbound messages.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use flightdeck::protocol::{
    MAX_PATH, RECV_ID_EVENT, RECV_ID_EVENT_FILENAME, RECV_ID_EVENT_FRAME,
    RECV_ID_EVENT_OBJECT_ADDREMOVE, RECV_ID_EXCEPTION, RECV_ID_OPEN, RECV_ID_QUIT,
    RECV_ID_SIMOBJECT_DATA,
};
use flightdeck::{
    DataRequestFlag, DatumType, EventState, FlightdeckError, ObjectId, Period, RecvHeader, Result,
    SimClient,
};

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddToDataDefinition {
        definition_id: u32,
        variable_name: String,
        units: String,
        datum_type: DatumType,
    },
    RequestDataOnSimObject {
        request_id: u32,
        definition_id: u32,
        object_id: u32,
        period: Period,
        flags: DataRequestFlag,
    },
    SetDataOnSimObject { definition_id: u32, object_id: u32, payload: Vec<u8> },
    SubscribeToSystemEvent { event_id: u32, event_name: String },
    UnsubscribeFromSystemEvent { event_id: u32 },
    SetSystemEventState { event_id: u32, state: EventState },
    RequestSystemState { request_id: u32, state_name: String },
}

/// Scripted [`SimClient`]: records every outbound call and serves pulls from
/// a queue of hand-built buffers.
#[derive(Default)]
pub struct MockClient {
    closed: AtomicBool,
    calls: Mutex<Vec<Call>>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    /// Request IDs whose arming call should fail.
    fail_requests: Mutex<Vec<u32>>,
    /// Event names whose subscribe call should fail.
    fail_subscribes: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a synthetic inbound message for the next pulls.
    pub fn push_message(&self, buffer: Vec<u8>) {
        self.queue.lock().unwrap().push_back(buffer);
    }

    /// Make the arming call for `request_id` fail with a native error.
    pub fn fail_request(&self, request_id: u32) {
        self.fail_requests.lock().unwrap().push(request_id);
    }

    /// Make subscribing to `event_name` fail with a native error.
    pub fn fail_subscribe(&self, event_name: &str) {
        self.fail_subscribes.lock().unwrap().push(event_name.to_string());
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded writes, in order.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::SetDataOnSimObject { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn guard(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(FlightdeckError::NotOpen)
        } else {
            Ok(())
        }
    }
}

impl SimClient for MockClient {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn add_to_data_definition(
        &self,
        definition_id: u32,
        variable_name: &str,
        units: &str,
        datum_type: DatumType,
    ) -> Result<()> {
        self.guard()?;
        self.record(Call::AddToDataDefinition {
            definition_id,
            variable_name: variable_name.to_string(),
            units: units.to_string(),
            datum_type,
        });
        Ok(())
    }

    fn request_data_on_sim_object(
        &self,
        request_id: u32,
        definition_id: u32,
        object_id: ObjectId,
        period: Period,
        flags: DataRequestFlag,
        _origin: u32,
        _interval: u32,
        _limit: u32,
    ) -> Result<()> {
        self.guard()?;
        if self.fail_requests.lock().unwrap().contains(&request_id) {
            return Err(FlightdeckError::native(
                "SimConnect_RequestDataOnSimObject",
                0x80070057,
                "invalid argument",
            ));
        }
        self.record(Call::RequestDataOnSimObject {
            request_id,
            definition_id,
            object_id: object_id.as_u32(),
            period,
            flags,
        });
        Ok(())
    }

    fn set_data_on_sim_object(
        &self,
        definition_id: u32,
        object_id: ObjectId,
        payload: &[u8],
    ) -> Result<()> {
        self.guard()?;
        self.record(Call::SetDataOnSimObject {
            definition_id,
            object_id: object_id.as_u32(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn subscribe_to_system_event(&self, event_id: u32, event_name: &str) -> Result<()> {
        self.guard()?;
        if self.fail_subscribes.lock().unwrap().iter().any(|name| name == event_name) {
            return Err(FlightdeckError::native(
                "SimConnect_SubscribeToSystemEvent",
                0x80004005,
                "general failure",
            ));
        }
        self.record(Call::SubscribeToSystemEvent {
            event_id,
            event_name: event_name.to_string(),
        });
        Ok(())
    }

    fn unsubscribe_from_system_event(&self, event_id: u32) -> Result<()> {
        self.guard()?;
        self.record(Call::UnsubscribeFromSystemEvent { event_id });
        Ok(())
    }

    fn set_system_event_state(&self, event_id: u32, state: EventState) -> Result<()> {
        self.guard()?;
        self.record(Call::SetSystemEventState { event_id, state });
        Ok(())
    }

    fn request_system_state(&self, request_id: u32, state_name: &str) -> Result<()> {
        self.guard()?;
        self.record(Call::RequestSystemState {
            request_id,
            state_name: state_name.to_string(),
        });
        Ok(())
    }

    fn pull_raw_message(&self) -> Result<Option<Vec<u8>>> {
        self.guard()?;
        Ok(self.queue.lock().unwrap().pop_front())
    }

    fn mark_disconnected(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn frame(kind: u32, body: &[u8]) -> Vec<u8> {
    let header =
        RecvHeader { size: (RecvHeader::SIZE + body.len()) as u32, version: 1, kind };
    let mut out = header.encode().to_vec();
    out.extend_from_slice(body);
    out
}

/// Data sample carrying little-endian f64 values.
pub fn sim_object_data(
    request_id: u32,
    object_id: u32,
    definition_id: u32,
    values: &[f64],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(values.len() * 8);
    for value in values {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    sim_object_data_raw(request_id, object_id, definition_id, &payload)
}

/// Data sample with an arbitrary raw payload.
pub fn sim_object_data_raw(
    request_id: u32,
    object_id: u32,
    definition_id: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&request_id.to_le_bytes());
    body.extend_from_slice(&object_id.to_le_bytes());
    body.extend_from_slice(&definition_id.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes()); // flags
    body.extend_from_slice(&0u32.to_le_bytes()); // entry number
    body.extend_from_slice(&0u32.to_le_bytes()); // out of
    body.extend_from_slice(&1u32.to_le_bytes()); // define count
    body.extend_from_slice(payload);
    frame(RECV_ID_SIMOBJECT_DATA, &body)
}

pub fn basic_event(event_id: u32, datum: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&event_id.to_le_bytes());
    body.extend_from_slice(&datum.to_le_bytes());
    frame(RECV_ID_EVENT, &body)
}

pub fn filename_event(event_id: u32, datum: u32, path: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&event_id.to_le_bytes());
    body.extend_from_slice(&datum.to_le_bytes());
    let mut fixed = [0u8; MAX_PATH];
    fixed[..path.len()].copy_from_slice(path.as_bytes());
    body.extend_from_slice(&fixed);
    frame(RECV_ID_EVENT_FILENAME, &body)
}

pub fn object_event(event_id: u32, datum: u32, object_id: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&event_id.to_le_bytes());
    body.extend_from_slice(&datum.to_le_bytes());
    body.extend_from_slice(&object_id.to_le_bytes());
    frame(RECV_ID_EVENT_OBJECT_ADDREMOVE, &body)
}

pub fn frame_event(event_id: u32, datum: u32, frame_rate: f32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&event_id.to_le_bytes());
    body.extend_from_slice(&datum.to_le_bytes());
    body.extend_from_slice(&frame_rate.to_le_bytes());
    frame(RECV_ID_EVENT_FRAME, &body)
}

pub fn quit() -> Vec<u8> {
    frame(RECV_ID_QUIT, &[])
}

pub fn exception(code: u32, send_id: u32, index: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&code.to_le_bytes());
    body.extend_from_slice(&send_id.to_le_bytes());
    body.extend_from_slice(&index.to_le_bytes());
    frame(RECV_ID_EXCEPTION, &body)
}

pub fn open_confirmation(application_name: &str) -> Vec<u8> {
    let mut name = [0u8; 256];
    name[..application_name.len()].copy_from_slice(application_name.as_bytes());
    frame(RECV_ID_OPEN, &name)
}
