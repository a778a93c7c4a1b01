//! Subscriber subsystems fed by the dispatcher.
//!
//! The [`VariableManager`](variables::VariableManager) polls data-definition
//! values into a locked store; the [`EventManager`](events::EventManager)
//! pushes system events into per-subscription callback workers. Both hang
//! off the same [`SimClient`](crate::SimClient) seam and the same
//! per-connection [`Registry`](crate::Registry).

pub mod events;
pub mod variables;
