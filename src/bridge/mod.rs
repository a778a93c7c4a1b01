//! Safe, typed bridge over the vendor C ABI.
//!
//! [`Connection`] owns the loaded DLL image and the native connection handle
//! and guards every entry point behind the connection lifecycle:
//!
//! ```text
//! Closed --open()--> Open --close()--> Closed
//!                      |
//!                      +-- quit / remote disconnect --> Lost (terminal)
//! ```
//!
//! Native calls against anything but `Open` fail with the distinct
//! [`FlightdeckError::NotOpen`] state error rather than a native error, so
//! callers can always tell "host not available" from "host rejected the
//! call". A remote-disconnect status on any call transitions the connection
//! to `Lost`.
//!
//! No lock is held across a native call: the raw handle is copied out under
//! the state lock, the lock is released, and only then does the FFI call run.

pub mod hresult;
mod library;

pub use library::DEFAULT_LIBRARY_NAME;

use std::ffi::{c_void, CString};
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, trace, warn};

use crate::client::SimClient;
use crate::protocol::{DataRequestFlag, DatumType, EventState, ObjectId, Period};
use crate::{FlightdeckError, Result};

use hresult::Status;
use library::SimConnectLibrary;

/// Connection lifecycle. The raw handle is stored as `usize` so the state is
/// plain data under the mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Closed,
    /// `open` is in flight; native calls are rejected until it commits.
    Opening,
    Open(usize),
    /// The host went away; terminal until the value is dropped.
    Lost,
}

/// A connection to the simulator host over the vendor DLL.
///
/// Exactly one native handle per value. Multiple `Connection` values may
/// coexist in a process; each owns its own handle and dispatcher, and they
/// all re-enter the same process-wide library image.
pub struct Connection {
    library: SimConnectLibrary,
    client_name: String,
    state: Mutex<HandleState>,
}

impl Connection {
    /// Load the default `SimConnect.dll` through the system search path.
    /// The connection starts closed; call [`open`](Connection::open).
    pub fn new(client_name: impl Into<String>) -> Result<Self> {
        Self::with_library_path(client_name, Path::new(DEFAULT_LIBRARY_NAME))
    }

    /// Load the vendor DLL from an explicit path. Callers that need a
    /// configurable image location own that policy; the library never probes
    /// the filesystem itself.
    pub fn with_library_path(client_name: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self {
            library: SimConnectLibrary::load(path)?,
            client_name: client_name.into(),
            state: Mutex::new(HandleState::Closed),
        })
    }

    /// Name this client identifies itself with to the host.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Open the native channel. Fails with [`FlightdeckError::AlreadyOpen`]
    /// when a handle is live and [`FlightdeckError::Disconnected`] after the
    /// host has gone away.
    pub fn open(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("connection state lock poisoned");
            match *state {
                HandleState::Closed => *state = HandleState::Opening,
                HandleState::Opening | HandleState::Open(_) => {
                    return Err(FlightdeckError::AlreadyOpen)
                }
                HandleState::Lost => return Err(FlightdeckError::Disconnected),
            }
        }

        let name = match CString::new(self.client_name.as_str()) {
            Ok(name) => name,
            Err(err) => {
                self.set_state(HandleState::Closed);
                return Err(err.into());
            }
        };

        match self.library.open(&name) {
            Ok((code, handle)) if hresult::classify(code) == Status::Ok => {
                debug!(client = %self.client_name, "connection opened");
                self.set_state(HandleState::Open(handle as usize));
                Ok(())
            }
            Ok((code, _)) => {
                self.set_state(HandleState::Closed);
                Err(FlightdeckError::native("SimConnect_Open", code, hresult::message(code)))
            }
            Err(err) => {
                self.set_state(HandleState::Closed);
                Err(err)
            }
        }
    }

    /// Close the native channel. Fails with [`FlightdeckError::NotOpen`] on a
    /// connection that is not open; on a lost connection there is nothing
    /// native left to release and only the bookkeeping transitions.
    pub fn close(&self) -> Result<()> {
        let handle = {
            let mut state = self.state.lock().expect("connection state lock poisoned");
            match *state {
                HandleState::Open(handle) => handle,
                HandleState::Lost => {
                    *state = HandleState::Closed;
                    return Ok(());
                }
                HandleState::Closed | HandleState::Opening => {
                    return Err(FlightdeckError::NotOpen)
                }
            }
        };

        let code = self.library.close(handle as *mut c_void)?;
        match hresult::classify(code) {
            Status::Ok | Status::RemoteDisconnect => {
                debug!(client = %self.client_name, "connection closed");
                self.set_state(HandleState::Closed);
                Ok(())
            }
            _ => Err(FlightdeckError::native("SimConnect_Close", code, hresult::message(code))),
        }
    }

    fn set_state(&self, next: HandleState) {
        *self.state.lock().expect("connection state lock poisoned") = next;
    }

    /// Copy the raw handle out for a native call, enforcing the live-handle
    /// invariant.
    fn handle(&self) -> Result<*mut c_void> {
        match *self.state.lock().expect("connection state lock poisoned") {
            HandleState::Open(handle) => Ok(handle as *mut c_void),
            _ => Err(FlightdeckError::NotOpen),
        }
    }

    /// Classify a non-pull HRESULT, driving the disconnect transition.
    fn finish(&self, function: &'static str, code: u32) -> Result<()> {
        if hresult::classify(code) == Status::RemoteDisconnect {
            warn!(function, "remote disconnect; connection lost");
            self.mark_disconnected();
        }
        hresult::check(function, code)
    }
}

impl SimClient for Connection {
    fn is_open(&self) -> bool {
        matches!(
            *self.state.lock().expect("connection state lock poisoned"),
            HandleState::Open(_)
        )
    }

    fn add_to_data_definition(
        &self,
        definition_id: u32,
        variable_name: &str,
        units: &str,
        datum_type: DatumType,
    ) -> Result<()> {
        let handle = self.handle()?;
        let datum_name = CString::new(variable_name)?;
        let units_name = CString::new(units)?;
        let code = self.library.add_to_data_definition(
            handle,
            definition_id,
            &datum_name,
            &units_name,
            datum_type.as_u32(),
        )?;
        self.finish("SimConnect_AddToDataDefinition", code)
    }

    fn request_data_on_sim_object(
        &self,
        request_id: u32,
        definition_id: u32,
        object_id: ObjectId,
        period: Period,
        flags: DataRequestFlag,
        origin: u32,
        interval: u32,
        limit: u32,
    ) -> Result<()> {
        let handle = self.handle()?;
        let code = self.library.request_data_on_sim_object(
            handle,
            request_id,
            definition_id,
            object_id.as_u32(),
            period.as_u32(),
            flags.as_u32(),
            origin,
            interval,
            limit,
        )?;
        self.finish("SimConnect_RequestDataOnSimObject", code)
    }

    fn set_data_on_sim_object(
        &self,
        definition_id: u32,
        object_id: ObjectId,
        payload: &[u8],
    ) -> Result<()> {
        let handle = self.handle()?;
        let code = self.library.set_data_on_sim_object(
            handle,
            definition_id,
            object_id.as_u32(),
            payload,
        )?;
        self.finish("SimConnect_SetDataOnSimObject", code)
    }

    fn subscribe_to_system_event(&self, event_id: u32, event_name: &str) -> Result<()> {
        let handle = self.handle()?;
        let name = CString::new(event_name)?;
        let code = self.library.subscribe_to_system_event(handle, event_id, &name)?;
        self.finish("SimConnect_SubscribeToSystemEvent", code)
    }

    fn unsubscribe_from_system_event(&self, event_id: u32) -> Result<()> {
        let handle = self.handle()?;
        let code = self.library.unsubscribe_from_system_event(handle, event_id)?;
        self.finish("SimConnect_UnsubscribeFromSystemEvent", code)
    }

    fn set_system_event_state(&self, event_id: u32, state: EventState) -> Result<()> {
        let handle = self.handle()?;
        let code = self.library.set_system_event_state(handle, event_id, state.as_u32())?;
        self.finish("SimConnect_SetSystemEventState", code)
    }

    fn request_system_state(&self, request_id: u32, state_name: &str) -> Result<()> {
        let handle = self.handle()?;
        let state = CString::new(state_name)?;
        let code = self.library.request_system_state(handle, request_id, &state)?;
        self.finish("SimConnect_RequestSystemState", code)
    }

    fn pull_raw_message(&self) -> Result<Option<Vec<u8>>> {
        let handle = self.handle()?;
        let pull = self.library.get_next_dispatch(handle)?;

        match hresult::classify(pull.code) {
            Status::Ok => {
                if let Some(buffer) = &pull.buffer {
                    trace!(bytes = buffer.len(), "pulled dispatch message");
                }
                Ok(pull.buffer)
            }
            // The dedicated empty-queue status; absence of a message, not an
            // error.
            Status::Failure => Ok(None),
            Status::RemoteDisconnect => {
                warn!("remote disconnect on dispatch pull; connection lost");
                self.mark_disconnected();
                Err(FlightdeckError::native(
                    "SimConnect_GetNextDispatch",
                    pull.code,
                    hresult::message(pull.code),
                ))
            }
            _ => Err(FlightdeckError::native(
                "SimConnect_GetNextDispatch",
                pull.code,
                hresult::message(pull.code),
            )),
        }
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.lock().expect("connection state lock poisoned");
        if matches!(*state, HandleState::Open(_) | HandleState::Opening) {
            *state = HandleState::Lost;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Best-effort release of a still-open handle; the image itself is
        // process-wide and unloads with the last Library reference.
        if let HandleState::Open(handle) =
            *self.state.lock().expect("connection state lock poisoned")
        {
            let _ = self.library.close(handle as *mut c_void);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_reports_library_load_error() {
        let result =
            Connection::with_library_path("T1", Path::new("/nonexistent/SimConnect.dll"));
        match result {
            Err(FlightdeckError::LibraryLoad { path, .. }) => {
                assert!(path.contains("nonexistent"));
            }
            other => panic!("expected LibraryLoad error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn handle_state_is_plain_data() {
        // The state enum must stay Copy so the guard copies it out instead of
        // holding the lock across native calls.
        fn assert_copy<T: Copy>() {}
        assert_copy::<HandleState>();
    }

    #[test]
    #[ignore = "simulator_required"]
    fn open_then_close_round_trip() {
        let connection = Connection::new("T1").expect("SimConnect.dll must be installed");

        connection.open().expect("open should succeed with the simulator running");
        assert!(connection.is_open());
        assert!(matches!(connection.open(), Err(FlightdeckError::AlreadyOpen)));

        connection.close().expect("close should succeed");
        assert!(!connection.is_open());
        assert!(matches!(connection.close(), Err(FlightdeckError::NotOpen)));

        // A closed connection can be reopened.
        connection.open().expect("reopen should succeed");
        connection.close().expect("close after reopen should succeed");
    }

    #[test]
    #[ignore = "simulator_required"]
    fn calls_against_a_closed_connection_are_state_errors() {
        let connection = Connection::new("T1").expect("SimConnect.dll must be installed");

        let err = connection
            .add_to_data_definition(1, "Plane Altitude", "feet", DatumType::Float64)
            .unwrap_err();
        assert!(err.is_state_error());
        assert!(matches!(connection.pull_raw_message(), Err(FlightdeckError::NotOpen)));
    }
}
