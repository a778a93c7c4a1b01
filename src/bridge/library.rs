//! Raw entry points of the vendor DLL.
//!
//! [`SimConnectLibrary`] owns the loaded image and performs the per-call
//! symbol resolution and argument marshalling. Methods here return the raw
//! HRESULT; classification into typed errors happens one layer up so the
//! pull's empty-queue sentinel and the disconnect transition stay out of the
//! marshalling code.

use std::ffi::{c_char, c_void, CStr};
use std::path::Path;

use libloading::{Library, Symbol};
use tracing::debug;

use crate::{FlightdeckError, Result};

/// Default image name resolved through the system loader search path.
pub const DEFAULT_LIBRARY_NAME: &str = "SimConnect.dll";

type HResult = u32;

type OpenFn = unsafe extern "system" fn(
    *mut *mut c_void, // phSimConnect
    *const c_char,    // szName
    *mut c_void,      // hWnd
    u32,              // UserEventWin32
    *mut c_void,      // hEventHandle
    u32,              // ConfigIndex
) -> HResult;

type CloseFn = unsafe extern "system" fn(*mut c_void) -> HResult;

type AddToDataDefinitionFn = unsafe extern "system" fn(
    *mut c_void,   // hSimConnect
    u32,           // DefineID
    *const c_char, // DatumName
    *const c_char, // UnitsName
    u32,           // DatumType
    f32,           // fEpsilon
    u32,           // DatumID
) -> HResult;

type RequestDataOnSimObjectFn = unsafe extern "system" fn(
    *mut c_void, // hSimConnect
    u32,         // RequestID
    u32,         // DefineID
    u32,         // ObjectID
    u32,         // Period
    u32,         // Flags
    u32,         // origin
    u32,         // interval
    u32,         // limit
) -> HResult;

type SetDataOnSimObjectFn = unsafe extern "system" fn(
    *mut c_void,   // hSimConnect
    u32,           // DefineID
    u32,           // ObjectID
    u32,           // Flags
    u32,           // ArrayCount
    u32,           // cbUnitSize
    *const c_void, // pDataSet
) -> HResult;

type SubscribeToSystemEventFn =
    unsafe extern "system" fn(*mut c_void, u32, *const c_char) -> HResult;

type UnsubscribeFromSystemEventFn = unsafe extern "system" fn(*mut c_void, u32) -> HResult;

type SetSystemEventStateFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HResult;

type RequestSystemStateFn =
    unsafe extern "system" fn(*mut c_void, u32, *const c_char) -> HResult;

type GetNextDispatchFn =
    unsafe extern "system" fn(*mut c_void, *mut *const u8, *mut u32) -> HResult;

/// Result of a raw dispatch pull before classification.
pub struct RawPull {
    /// HRESULT of the call.
    pub code: HResult,
    /// Copy of the native-owned message buffer, when one was returned.
    pub buffer: Option<Vec<u8>>,
}

/// The loaded vendor DLL image.
///
/// The image is process-wide; this type is just a handle to it. Symbols are
/// resolved per call, mirroring lazy procedure lookup, so a partially
/// exported image fails on the operation that needs the missing entry point
/// rather than at load time.
pub struct SimConnectLibrary {
    library: Library,
}

impl SimConnectLibrary {
    /// Load the vendor DLL from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading SimConnect library");
        // SAFETY: loading a DLL runs its initialization routines; the vendor
        // image is trusted by construction of this library.
        let library = unsafe { Library::new(path) }.map_err(|source| {
            FlightdeckError::LibraryLoad { path: path.display().to_string(), source }
        })?;
        Ok(Self { library })
    }

    fn symbol<T>(&self, name: &'static str, raw: &'static [u8]) -> Result<Symbol<'_, T>> {
        // SAFETY: the function pointer types above match the vendor ABI
        // declarations for the named entry points.
        unsafe { self.library.get(raw) }
            .map_err(|source| FlightdeckError::MissingSymbol { symbol: name, source })
    }

    /// `SimConnect_Open`: writes the connection handle through the out-param.
    pub fn open(&self, name: &CStr) -> Result<(HResult, *mut c_void)> {
        let open: Symbol<'_, OpenFn> = self.symbol("SimConnect_Open", b"SimConnect_Open\0")?;
        let mut handle: *mut c_void = std::ptr::null_mut();
        // SAFETY: out-param points at a live local; strings are
        // null-terminated; remaining parameters follow the documented
        // local-connection defaults.
        let code = unsafe {
            open(&mut handle, name.as_ptr(), std::ptr::null_mut(), 0, std::ptr::null_mut(), 0)
        };
        Ok((code, handle))
    }

    pub fn close(&self, handle: *mut c_void) -> Result<HResult> {
        let close: Symbol<'_, CloseFn> = self.symbol("SimConnect_Close", b"SimConnect_Close\0")?;
        // SAFETY: handle came from a successful open on this image.
        Ok(unsafe { close(handle) })
    }

    pub fn add_to_data_definition(
        &self,
        handle: *mut c_void,
        definition_id: u32,
        datum_name: &CStr,
        units_name: &CStr,
        datum_type: u32,
    ) -> Result<HResult> {
        let add: Symbol<'_, AddToDataDefinitionFn> =
            self.symbol("SimConnect_AddToDataDefinition", b"SimConnect_AddToDataDefinition\0")?;
        // Epsilon 0.0 requests exact change detection; datum ID 0 lets the
        // host assign one.
        // SAFETY: strings are null-terminated and outlive the call.
        Ok(unsafe {
            add(handle, definition_id, datum_name.as_ptr(), units_name.as_ptr(), datum_type, 0.0, 0)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn request_data_on_sim_object(
        &self,
        handle: *mut c_void,
        request_id: u32,
        definition_id: u32,
        object_id: u32,
        period: u32,
        flags: u32,
        origin: u32,
        interval: u32,
        limit: u32,
    ) -> Result<HResult> {
        let request: Symbol<'_, RequestDataOnSimObjectFn> = self.symbol(
            "SimConnect_RequestDataOnSimObject",
            b"SimConnect_RequestDataOnSimObject\0",
        )?;
        // SAFETY: all parameters are plain integers.
        Ok(unsafe {
            request(handle, request_id, definition_id, object_id, period, flags, origin, interval, limit)
        })
    }

    pub fn set_data_on_sim_object(
        &self,
        handle: *mut c_void,
        definition_id: u32,
        object_id: u32,
        payload: &[u8],
    ) -> Result<HResult> {
        let set: Symbol<'_, SetDataOnSimObjectFn> =
            self.symbol("SimConnect_SetDataOnSimObject", b"SimConnect_SetDataOnSimObject\0")?;
        // Non-tagged whole-payload replace: flags 0, array count 0, unit size
        // = payload length.
        // SAFETY: the payload pointer is valid for its length for the
        // duration of the call; the host copies before returning.
        Ok(unsafe {
            set(
                handle,
                definition_id,
                object_id,
                0,
                0,
                payload.len() as u32,
                payload.as_ptr() as *const c_void,
            )
        })
    }

    pub fn subscribe_to_system_event(
        &self,
        handle: *mut c_void,
        event_id: u32,
        event_name: &CStr,
    ) -> Result<HResult> {
        let subscribe: Symbol<'_, SubscribeToSystemEventFn> = self.symbol(
            "SimConnect_SubscribeToSystemEvent",
            b"SimConnect_SubscribeToSystemEvent\0",
        )?;
        // SAFETY: the name is null-terminated and outlives the call.
        Ok(unsafe { subscribe(handle, event_id, event_name.as_ptr()) })
    }

    pub fn unsubscribe_from_system_event(
        &self,
        handle: *mut c_void,
        event_id: u32,
    ) -> Result<HResult> {
        let unsubscribe: Symbol<'_, UnsubscribeFromSystemEventFn> = self.symbol(
            "SimConnect_UnsubscribeFromSystemEvent",
            b"SimConnect_UnsubscribeFromSystemEvent\0",
        )?;
        // SAFETY: plain integer parameters.
        Ok(unsafe { unsubscribe(handle, event_id) })
    }

    pub fn set_system_event_state(
        &self,
        handle: *mut c_void,
        event_id: u32,
        state: u32,
    ) -> Result<HResult> {
        let set_state: Symbol<'_, SetSystemEventStateFn> =
            self.symbol("SimConnect_SetSystemEventState", b"SimConnect_SetSystemEventState\0")?;
        // SAFETY: plain integer parameters.
        Ok(unsafe { set_state(handle, event_id, state) })
    }

    pub fn request_system_state(
        &self,
        handle: *mut c_void,
        request_id: u32,
        state: &CStr,
    ) -> Result<HResult> {
        let request: Symbol<'_, RequestSystemStateFn> =
            self.symbol("SimConnect_RequestSystemState", b"SimConnect_RequestSystemState\0")?;
        // SAFETY: the state name is null-terminated and outlives the call.
        Ok(unsafe { request(handle, request_id, state.as_ptr()) })
    }

    /// `SimConnect_GetNextDispatch`: the returned buffer is owned by the
    /// native library and only valid until the next call, so it is copied
    /// into a library-owned `Vec` before this function returns.
    pub fn get_next_dispatch(&self, handle: *mut c_void) -> Result<RawPull> {
        let pull: Symbol<'_, GetNextDispatchFn> =
            self.symbol("SimConnect_GetNextDispatch", b"SimConnect_GetNextDispatch\0")?;

        let mut data: *const u8 = std::ptr::null();
        let mut size: u32 = 0;
        // SAFETY: out-params point at live locals.
        let code = unsafe { pull(handle, &mut data, &mut size) };

        let buffer = if code == super::hresult::S_OK && !data.is_null() && size > 0 {
            // SAFETY: on success the host guarantees `data` is valid for
            // `size` bytes until the next dispatch call; we copy immediately
            // while still holding the queue.
            Some(unsafe { std::slice::from_raw_parts(data, size as usize) }.to_vec())
        } else {
            None
        };

        Ok(RawPull { code, buffer })
    }
}
