//! Push-style system event subscriptions.
//!
//! The [`EventManager`] owns the system-event subscriptions and their
//! callbacks. Every subscription gets a dedicated callback worker fed by a
//! channel: a slow or panicking callback can never stall the dispatcher or
//! the callbacks of other subscriptions, and within one subscription the
//! callbacks run in exactly the order the host delivered the events. No
//! ordering is guaranteed across subscriptions.
//!
//! Callback panics are caught at the worker boundary and published on the
//! error channel; the worker keeps serving later events.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::channel::ErrorChannel;
use crate::client::SimClient;
use crate::protocol::{EventRecord, EventState, SystemEventKind};
use crate::registry::Registry;
use crate::{FlightdeckError, Result};

/// A system event as delivered to a callback.
///
/// The [`kind`](SystemEvent::kind) discriminator tells the callback which
/// variant-specific fields are meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    /// Event ID assigned at subscription time.
    pub event_id: u32,
    /// Name the subscription was registered under.
    pub event_name: String,
    /// 32-bit event payload; meaning depends on the event.
    pub datum: u32,
    /// Variant discriminator and variant-specific fields.
    pub kind: SystemEventKind,
}

/// Callback invoked for each delivered event. The manager owns the callback
/// for the life of the subscription.
pub type EventCallback = Box<dyn FnMut(SystemEvent) + Send + 'static>;

struct SubscriptionSlot {
    event_id: u32,
    event_name: String,
    sender: mpsc::Sender<SystemEvent>,
}

struct SubscriptionTable {
    /// Arena of subscription slots; the registry maps event IDs to indices
    /// here. Freed slots are reused, the IDs never are.
    slots: Vec<Option<SubscriptionSlot>>,
    running: bool,
}

struct Inner {
    client: Arc<dyn SimClient>,
    registry: Arc<Registry>,
    errors: Arc<ErrorChannel>,
    table: RwLock<SubscriptionTable>,
}

/// Thread-safe manager for system-event subscriptions.
///
/// Cheap to clone; all clones share one subscription table. The dispatcher
/// holds a clone to deliver inbound events.
#[derive(Clone)]
pub struct EventManager {
    inner: Arc<Inner>,
}

impl EventManager {
    /// Create a manager over an open connection.
    pub fn new(client: Arc<dyn SimClient>, registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                registry,
                errors: Arc::new(ErrorChannel::new()),
                table: RwLock::new(SubscriptionTable { slots: Vec::new(), running: false }),
            }),
        }
    }

    /// Subscribe to a named system event; returns the assigned event ID.
    ///
    /// Fails when the connection is not open. The callback runs on the
    /// subscription's dedicated worker.
    pub fn subscribe(&self, event_name: &str, callback: EventCallback) -> Result<u32> {
        if !self.inner.client.is_open() {
            return Err(FlightdeckError::NotOpen);
        }

        let event_id = self.inner.registry.next_event_id();
        self.inner.client.subscribe_to_system_event(event_id, event_name)?;

        let (sender, receiver) = mpsc::channel::<SystemEvent>();
        let errors = Arc::clone(&self.inner.errors);
        thread::Builder::new()
            .name(format!("flightdeck-event-{event_id}"))
            .spawn(move || callback_worker(receiver, callback, errors))
            .expect("failed to spawn event callback worker");

        let mut table = self.write();
        let slot = match table.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                table.slots.push(None);
                table.slots.len() - 1
            }
        };
        table.slots[slot] = Some(SubscriptionSlot {
            event_id,
            event_name: event_name.to_string(),
            sender,
        });
        self.inner.registry.register_event_owner(event_id, slot as u32);

        debug!(event_name, event_id, "system event subscribed");
        Ok(event_id)
    }

    /// Subscribe to several events at once; on the first failure everything
    /// subscribed by this call is rolled back and the error is returned.
    pub fn subscribe_many(
        &self,
        subscriptions: impl IntoIterator<Item = (String, EventCallback)>,
    ) -> Result<Vec<u32>> {
        let mut subscribed = Vec::new();
        for (event_name, callback) in subscriptions {
            match self.subscribe(&event_name, callback) {
                Ok(event_id) => subscribed.push(event_id),
                Err(err) => {
                    for event_id in subscribed {
                        if let Err(rollback) = self.unsubscribe(event_id) {
                            warn!(event_id, error = %rollback, "rollback unsubscribe failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(subscribed)
    }

    /// Remove a subscription. The worker drains any queued events and exits
    /// on its own; in-flight callbacks are never interrupted.
    pub fn unsubscribe(&self, event_id: u32) -> Result<()> {
        let slot = self
            .inner
            .registry
            .lookup_event_owner(event_id)
            .ok_or(FlightdeckError::NotSubscribed { event_id })?;

        self.inner.client.unsubscribe_from_system_event(event_id)?;

        let mut table = self.write();
        self.inner.registry.release_event_owner(event_id);
        if let Some(entry) = table.slots.get_mut(slot as usize) {
            // Dropping the sender closes the worker's channel.
            *entry = None;
        }

        debug!(event_id, "system event unsubscribed");
        Ok(())
    }

    /// Remove every subscription, stopping at the first failure.
    pub fn unsubscribe_all(&self) -> Result<()> {
        let event_ids: Vec<u32> = {
            let table = self.read();
            table.slots.iter().flatten().map(|slot| slot.event_id).collect()
        };

        for event_id in event_ids {
            self.unsubscribe(event_id)?;
        }
        Ok(())
    }

    /// Toggle host-side delivery for a subscribed event.
    pub fn set_event_state(&self, event_id: u32, state: EventState) -> Result<()> {
        if !self.inner.client.is_open() {
            return Err(FlightdeckError::NotOpen);
        }
        if self.inner.registry.lookup_event_owner(event_id).is_none() {
            return Err(FlightdeckError::NotSubscribed { event_id });
        }
        self.inner.client.set_system_event_state(event_id, state)
    }

    /// Begin delivering events to callbacks. Fails when already running or
    /// when the connection is not open.
    pub fn start(&self) -> Result<()> {
        if !self.inner.client.is_open() {
            return Err(FlightdeckError::NotOpen);
        }
        let mut table = self.write();
        if table.running {
            return Err(FlightdeckError::AlreadyRunning);
        }
        table.running = true;
        debug!("event manager running");
        Ok(())
    }

    /// Stop delivering events. Idempotent; never interrupts a callback that
    /// is already running on its worker.
    pub fn stop(&self) {
        let mut table = self.write();
        if table.running {
            table.running = false;
            debug!("event manager stopped");
        }
    }

    /// Whether events are currently being delivered.
    pub fn is_running(&self) -> bool {
        self.read().running
    }

    /// Snapshot of the current subscriptions (event ID to event name).
    pub fn subscribed_events(&self) -> HashMap<u32, String> {
        self.read()
            .slots
            .iter()
            .flatten()
            .map(|slot| (slot.event_id, slot.event_name.clone()))
            .collect()
    }

    /// Channel of background dispatch errors (unknown IDs, callback panics).
    pub fn errors(&self) -> Arc<ErrorChannel> {
        Arc::clone(&self.inner.errors)
    }

    /// Deliver an inbound event to its subscription's worker.
    ///
    /// Called by the dispatcher in arrival order. Events for a stopped
    /// manager are dropped; events for an unknown ID are published on the
    /// error channel.
    pub fn deliver(&self, record: EventRecord) {
        let table = self.read();
        if !table.running {
            return;
        }

        let Some(slot) = self.inner.registry.lookup_event_owner(record.event_id) else {
            drop(table);
            warn!(event_id = record.event_id, "event for unknown event ID");
            self.inner.errors.publish(FlightdeckError::UnknownEvent { event_id: record.event_id });
            return;
        };

        if let Some(Some(subscription)) = table.slots.get(slot as usize) {
            let event = SystemEvent {
                event_id: record.event_id,
                event_name: subscription.event_name.clone(),
                datum: record.datum,
                kind: record.kind,
            };
            trace!(event_id = event.event_id, name = %event.event_name, "event delivered");
            if subscription.sender.send(event).is_err() {
                warn!(event_id = record.event_id, "callback worker gone; event dropped");
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SubscriptionTable> {
        self.inner.table.read().expect("subscription table lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SubscriptionTable> {
        self.inner.table.write().expect("subscription table lock poisoned")
    }
}

/// Per-subscription worker: invokes the callback for each queued event, in
/// order, catching panics at this boundary.
fn callback_worker(
    receiver: mpsc::Receiver<SystemEvent>,
    mut callback: EventCallback,
    errors: Arc<ErrorChannel>,
) {
    while let Ok(event) = receiver.recv() {
        let event_name = event.event_name.clone();
        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
        if let Err(payload) = outcome {
            let reason = panic_reason(payload.as_ref());
            warn!(event_name = %event_name, reason = %reason, "event callback panicked");
            errors.publish(FlightdeckError::CallbackPanic { event_name, reason });
        }
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
