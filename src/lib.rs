//! Typed, concurrent SimConnect client library for flight simulator
//! telemetry.
//!
//! Flightdeck brokers a thread-safe, multi-subscriber interface on top of the
//! vendor-supplied SimConnect DLL. The native queue is strictly
//! single-consumer; one background [`Dispatcher`] per connection pulls every
//! inbound message and fans it out to two independent subsystems:
//!
//! - [`VariableManager`] — polled simulation variables, each backed by its
//!   own data definition, with read/write access and update statistics.
//! - [`EventManager`] — push-style system event subscriptions with isolated
//!   callback workers.
//!
//! # Features
//!
//! - **Typed ABI bridge**: HRESULT classification into state, native, and
//!   dispatch-time errors callers can branch on
//! - **Checked codec**: every inbound buffer is decoded through a
//!   bounds-checked reader, never pointer arithmetic
//! - **Stable identifiers**: definition, request, and event IDs are unique
//!   for the life of a connection and never reused
//! - **Isolated callbacks**: a slow or panicking event callback cannot stall
//!   the dispatcher or other subscriptions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flightdeck::{Connection, Dispatcher, EventManager, Registry, SimClient, VariableManager};
//!
//! fn main() -> flightdeck::Result<()> {
//!     let connection = Arc::new(Connection::new("flightdeck-demo")?);
//!     connection.open()?;
//!
//!     let client: Arc<dyn SimClient> = connection.clone();
//!     let registry = Arc::new(Registry::new());
//!
//!     let variables = VariableManager::new(client.clone(), registry.clone());
//!     variables.add_variable("Altitude", "Plane Altitude", "feet")?;
//!     variables.add_variable_writable(
//!         "Throttle",
//!         "General Eng Throttle Lever Position:1",
//!         "percent",
//!         true,
//!     )?;
//!     variables.start()?;
//!
//!     let events = EventManager::new(client.clone(), registry.clone());
//!     events.subscribe("Pause", Box::new(|event| {
//!         println!("pause state: {}", event.datum);
//!     }))?;
//!     events.start()?;
//!
//!     let dispatcher = Dispatcher::spawn(client, variables.clone(), events.clone());
//!
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     println!("altitude: {:?}", variables.variable("Altitude")?.value);
//!
//!     dispatcher.stop();
//!     connection.close()
//! }
//! ```

// Core types and error handling
pub mod bridge;
mod channel;
mod client;
mod error;
pub mod protocol;
mod registry;

// Subscriber subsystems and the pull loop
pub mod dispatch;
pub mod managers;

// Core exports
pub use bridge::Connection;
pub use channel::{ErrorChannel, ERROR_CHANNEL_CAPACITY};
pub use client::SimClient;
pub use error::{FlightdeckError, Result};
pub use registry::{Registry, EVENT_ID_BASE, REQUEST_ID_STRIDE};

// Protocol exports
pub use protocol::{
    DataRequestFlag, DataSample, DatumType, EventRecord, EventState, Message, ObjectId, Period,
    RecvHeader, SystemEventKind,
};

// Subsystem exports
pub use dispatch::{Dispatcher, Router, DISPATCH_TICK};
pub use managers::events::{EventCallback, EventManager, SystemEvent};
pub use managers::variables::{FlightVariable, ManagerStats, VariableManager};
