//! The seam between the native bridge and the subscriber subsystems.

use crate::protocol::{DataRequestFlag, DatumType, EventState, ObjectId, Period};
use crate::Result;

/// Typed surface over the SimConnect ABI.
///
/// [`Connection`](crate::Connection) implements this over the vendor DLL; the
/// managers and the dispatcher only ever see the trait, which keeps them
/// testable against a scripted fake and keeps every native concern on one
/// side of the boundary.
///
/// The dispatch queue behind [`pull_raw_message`](SimClient::pull_raw_message)
/// is strictly single-consumer: while a dispatcher is running it owns the
/// pull, and calling it from anywhere else is unsupported.
pub trait SimClient: Send + Sync {
    /// Whether the connection currently holds a live handle.
    fn is_open(&self) -> bool;

    /// Register one field of a data definition with the host.
    fn add_to_data_definition(
        &self,
        definition_id: u32,
        variable_name: &str,
        units: &str,
        datum_type: DatumType,
    ) -> Result<()>;

    /// Arm a periodic or one-shot data request for an object.
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<()>;

    /// Write a whole definition payload to an object. Writes always replace
    /// the full payload; tagged (sparse) mode is not supported.
    fn set_data_on_sim_object(
        &self,
        definition_id: u32,
        object_id: ObjectId,
        payload: &[u8],
    ) -> Result<()>;

    /// Subscribe to a named system event under a client-chosen event ID.
    fn subscribe_to_system_event(&self, event_id: u32, event_name: &str) -> Result<()>;

    /// Remove a system event subscription.
    fn unsubscribe_from_system_event(&self, event_id: u32) -> Result<()>;

    /// Toggle delivery of a subscribed system event.
    fn set_system_event_state(&self, event_id: u32, state: EventState) -> Result<()>;

    /// Ask the host for a named system state; the answer arrives on the
    /// dispatch queue as a system-state message.
    fn request_system_state(&self, request_id: u32, state_name: &str) -> Result<()>;

    /// Pull the next message from the dispatch queue.
    ///
    /// Returns `Ok(None)` when the queue is empty. The returned buffer is
    /// owned by the caller; the native-owned original is copied before this
    /// returns.
    fn pull_raw_message(&self) -> Result<Option<Vec<u8>>>;

    /// Transition the connection to its terminal lost state. Invoked by the
    /// dispatcher when the host announces quit.
    fn mark_disconnected(&self);
}
