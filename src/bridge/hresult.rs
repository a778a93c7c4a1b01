//! HRESULT classification for the vendor ABI.
//!
//! Every entry point returns a 32-bit status code. The bridge partitions the
//! code space into the handful of outcomes the library distinguishes; the
//! dedicated "queue empty" code is only meaningful for the dispatch pull and
//! is surfaced there as the absence of a message, never as an error.

use crate::{FlightdeckError, Result};

/// Success.
pub const S_OK: u32 = 0x0000_0000;
/// General failure; on the dispatch pull this means the queue is empty.
pub const E_FAIL: u32 = 0x8000_4005;
/// An argument was rejected by the host.
pub const E_INVALIDARG: u32 = 0x8007_0057;
/// The host dropped the connection.
pub const STATUS_REMOTE_DISCONNECT: u32 = 0xC000_013C;

/// Classified outcome of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// `E_FAIL` — a generic failure everywhere except the pull, where it is
    /// the empty-queue sentinel.
    Failure,
    InvalidArgument,
    RemoteDisconnect,
    Unknown,
}

/// Partition a raw HRESULT into a [`Status`].
pub fn classify(code: u32) -> Status {
    match code {
        S_OK => Status::Ok,
        E_FAIL => Status::Failure,
        E_INVALIDARG => Status::InvalidArgument,
        STATUS_REMOTE_DISCONNECT => Status::RemoteDisconnect,
        _ => Status::Unknown,
    }
}

/// Short human-readable message for a raw HRESULT.
pub fn message(code: u32) -> &'static str {
    match classify(code) {
        Status::Ok => "success",
        Status::Failure => "general failure",
        Status::InvalidArgument => "invalid argument",
        Status::RemoteDisconnect => "remote connection lost",
        Status::Unknown => "unknown error",
    }
}

/// Map a non-pull call's HRESULT to a result, wrapping failures with the
/// function name and raw code.
pub fn check(function: &'static str, code: u32) -> Result<()> {
    match classify(code) {
        Status::Ok => Ok(()),
        _ => Err(FlightdeckError::native(function, code, message(code))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_vendor_abi() {
        assert_eq!(S_OK, 0);
        assert_eq!(E_FAIL, 0x80004005);
        assert_eq!(E_INVALIDARG, 0x80070057);
        assert_eq!(STATUS_REMOTE_DISCONNECT, 0xC000013C);
    }

    #[test]
    fn classification_partitions_the_code_space() {
        assert_eq!(classify(S_OK), Status::Ok);
        assert_eq!(classify(E_FAIL), Status::Failure);
        assert_eq!(classify(E_INVALIDARG), Status::InvalidArgument);
        assert_eq!(classify(STATUS_REMOTE_DISCONNECT), Status::RemoteDisconnect);
        assert_eq!(classify(0xDEAD_BEEF), Status::Unknown);
    }

    #[test]
    fn check_wraps_function_and_code() {
        assert!(check("SimConnect_Open", S_OK).is_ok());

        let err = check("SimConnect_Open", E_INVALIDARG).unwrap_err();
        match err {
            FlightdeckError::Native { function, code, message } => {
                assert_eq!(function, "SimConnect_Open");
                assert_eq!(code, E_INVALIDARG);
                assert_eq!(message, "invalid argument");
            }
            other => panic!("expected Native, got {other:?}"),
        }
    }
}
