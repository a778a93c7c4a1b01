//! Error types for SimConnect operations.
//!
//! All errors flow through a single [`FlightdeckError`] enum so callers can
//! match on the failure class. The taxonomy follows how the errors reach the
//! caller:
//!
//! - **Configuration errors**: rejected synchronously by the managers
//!   (duplicate variable, frozen variable set, non-writable target, ...).
//! - **Native errors**: a non-success HRESULT from the vendor DLL, wrapped
//!   with the function name and raw code.
//! - **State errors**: operations against a closed, already-open, or lost
//!   connection. Kept distinct from native errors so callers can branch on
//!   "host not available" vs "host rejected the call".
//! - **Dispatch-time errors**: malformed messages, unknown IDs, callback
//!   panics. These surface asynchronously on the bounded error channels and
//!   never terminate the dispatcher.
//!
//! ```rust
//! use flightdeck::FlightdeckError;
//!
//! let err = FlightdeckError::native("SimConnect_Open", 0x80004005, "general failure");
//! assert!(err.is_native_error());
//! assert!(!err.is_state_error());
//! ```

use thiserror::Error;

/// Result type alias for SimConnect operations.
pub type Result<T, E = FlightdeckError> = std::result::Result<T, E>;

/// Main error type for SimConnect operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FlightdeckError {
    /// The connection has not been opened, or was closed/lost.
    #[error("connection is not open")]
    NotOpen,

    /// `open` was called on a connection that is already open.
    #[error("connection is already open")]
    AlreadyOpen,

    /// The host ended the session; the connection is terminally lost.
    #[error("simulator closed the connection")]
    Disconnected,

    /// The vendor DLL could not be loaded.
    #[error("failed to load SimConnect library '{path}'")]
    LibraryLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is missing from the loaded DLL image.
    #[error("SimConnect library is missing entry point '{symbol}'")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// A native call returned a non-success HRESULT.
    #[error("{function} failed: {message} (HRESULT 0x{code:08X})")]
    Native { function: &'static str, code: u32, message: &'static str },

    /// A string argument contains an interior NUL byte and cannot cross the
    /// C ABI boundary.
    #[error("string {value:?} contains an interior nul byte")]
    InvalidString { value: String },

    /// A variable with this name is already registered.
    #[error("variable '{name}' is already registered")]
    DuplicateVariable { name: String },

    /// No variable with this name exists.
    #[error("variable '{name}' not found")]
    VariableNotFound { name: String },

    /// A variable index is outside the registered range.
    #[error("variable index {index} out of range ({len} registered)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The variable was registered read-only.
    #[error("variable '{name}' is not writable")]
    NotWritable { name: String },

    /// The variable set is frozen while the manager is running.
    #[error("cannot add variables while the manager is running")]
    ManagerRunning,

    /// The manager is already running.
    #[error("manager is already running")]
    AlreadyRunning,

    /// `start` was called with no variables registered.
    #[error("no variables registered")]
    NoVariables,

    /// Arming a periodic request failed partway through `start`; requests
    /// armed before the failure remain armed on the host side.
    #[error("failed to arm '{variable}' ({armed} of {total} requests armed)")]
    Arm {
        variable: String,
        armed: usize,
        total: usize,
        #[source]
        source: Box<FlightdeckError>,
    },

    /// An inbound buffer failed structural validation.
    #[error("malformed message in {context}: {details}")]
    Malformed { context: &'static str, details: String },

    /// A data sample arrived for a request ID nobody registered.
    #[error("data sample for unknown request ID {request_id}")]
    UnknownRequest { request_id: u32 },

    /// An event arrived for an event ID nobody subscribed.
    #[error("event for unknown event ID {event_id}")]
    UnknownEvent { event_id: u32 },

    /// The event ID is not currently subscribed.
    #[error("event ID {event_id} is not subscribed")]
    NotSubscribed { event_id: u32 },

    /// A user event callback panicked; caught at the worker boundary.
    #[error("event callback for '{event_name}' panicked: {reason}")]
    CallbackPanic { event_name: String, reason: String },

    /// The host reported a server-side exception for an earlier request.
    #[error("simulator exception {code} (send ID {send_id}, index {index})")]
    SimException { code: u32, send_id: u32, index: u32 },
}

impl FlightdeckError {
    /// Helper constructor for native-call failures.
    pub fn native(function: &'static str, code: u32, message: &'static str) -> Self {
        FlightdeckError::Native { function, code, message }
    }

    /// Helper constructor for malformed-message failures.
    pub fn malformed(context: &'static str, details: impl Into<String>) -> Self {
        FlightdeckError::Malformed { context, details: details.into() }
    }

    /// Returns whether this error reflects the connection's lifecycle state
    /// rather than a host rejection.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            FlightdeckError::NotOpen
                | FlightdeckError::AlreadyOpen
                | FlightdeckError::Disconnected
        )
    }

    /// Returns whether this error originated from a non-success HRESULT.
    pub fn is_native_error(&self) -> bool {
        match self {
            FlightdeckError::Native { .. } => true,
            FlightdeckError::Arm { source, .. } => source.is_native_error(),
            _ => false,
        }
    }

    /// Returns whether this error was produced on the dispatch path and
    /// delivered through an error channel rather than a return value.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            FlightdeckError::Malformed { .. }
                | FlightdeckError::UnknownRequest { .. }
                | FlightdeckError::UnknownEvent { .. }
                | FlightdeckError::CallbackPanic { .. }
                | FlightdeckError::SimException { .. }
        )
    }
}

impl From<std::ffi::NulError> for FlightdeckError {
    fn from(err: std::ffi::NulError) -> Self {
        let bytes = err.into_vec();
        FlightdeckError::InvalidString { value: String::from_utf8_lossy(&bytes).into_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: FlightdeckError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<FlightdeckError>();

        let error = FlightdeckError::NotOpen;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn category_predicates_partition_variants() {
        assert!(FlightdeckError::NotOpen.is_state_error());
        assert!(FlightdeckError::AlreadyOpen.is_state_error());
        assert!(FlightdeckError::Disconnected.is_state_error());
        assert!(!FlightdeckError::NotOpen.is_native_error());

        let native = FlightdeckError::native("SimConnect_Close", 0x80004005, "general failure");
        assert!(native.is_native_error());
        assert!(!native.is_state_error());

        let dispatch = FlightdeckError::UnknownRequest { request_id: 99999 };
        assert!(dispatch.is_dispatch_error());
        assert!(!dispatch.is_state_error());
    }

    #[test]
    fn arm_error_chains_to_native_source() {
        let source =
            FlightdeckError::native("SimConnect_RequestDataOnSimObject", 0x80070057, "invalid argument");
        let arm = FlightdeckError::Arm {
            variable: "Altitude".to_string(),
            armed: 2,
            total: 5,
            source: Box::new(source),
        };

        assert!(arm.is_native_error());
        assert!(std::error::Error::source(&arm).is_some());
        let rendered = arm.to_string();
        assert!(rendered.contains("Altitude"));
        assert!(rendered.contains("2 of 5"));
    }

    #[test]
    fn nul_error_converts_to_invalid_string() {
        let err = std::ffi::CString::new("Plane\0Altitude").unwrap_err();
        let converted: FlightdeckError = err.into();
        match converted {
            FlightdeckError::InvalidString { value } => assert!(value.contains("Plane")),
            other => panic!("expected InvalidString, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn native_errors_format_function_and_code(
            code in any::<u32>(),
        ) {
            let err = FlightdeckError::native("SimConnect_Open", code, "test");
            let rendered = err.to_string();
            let expected_code = format!("{:08X}", code);
            prop_assert!(rendered.contains("SimConnect_Open"));
            prop_assert!(rendered.contains(&expected_code));
        }

        #[test]
        fn dispatch_errors_carry_their_ids(id in any::<u32>()) {
            let req = FlightdeckError::UnknownRequest { request_id: id };
            let ev = FlightdeckError::UnknownEvent { event_id: id };
            prop_assert!(req.to_string().contains(&id.to_string()));
            prop_assert!(ev.to_string().contains(&id.to_string()));
        }
    }
}
