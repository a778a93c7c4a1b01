//! Polled simulation-variable store.
//!
//! The [`VariableManager`] owns the set of registered simulation variables.
//! Every variable gets its OWN data definition and its own request: packing
//! several fields into one definition provokes schema exceptions on the host
//! side, so the one-variable-per-definition rule is load-bearing here, and
//! writes can replace a whole definition payload without clobbering
//! neighbors.
//!
//! Lifecycle:
//!
//! ```text
//! Configuring --start()--> Running --stop()--> Stopped --start()--> Running
//! ```
//!
//! Variables can only be added while configuring; once `start` has armed the
//! periodic requests the set is frozen. `start` arms every variable with a
//! once-per-second period and change-only delivery — continuous per-frame
//! delivery is wasteful for polled dashboards, and change-only keeps queue
//! pressure down without dropping meaningful updates.
//!
//! Inbound samples are applied by the dispatcher through
//! [`apply_sample`](VariableManager::apply_sample); readers take snapshots
//! through the read lock. No lock is ever held across a native call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::channel::ErrorChannel;
use crate::client::SimClient;
use crate::protocol::{DataRequestFlag, DataSample, DatumType, ObjectId, Period};
use crate::registry::Registry;
use crate::{FlightdeckError, Result};

/// Slot value marking a name reserved by an in-flight `add_variable`.
const RESERVED: usize = usize::MAX;

/// A registered simulation variable and its latest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightVariable {
    /// Human-readable name, unique within the manager.
    pub name: String,
    /// Vendor variable name (opaque to this library).
    pub sim_var: String,
    /// Vendor units string (opaque to this library).
    pub units: String,
    /// Data definition backing this variable.
    pub definition_id: u32,
    /// Periodic request delivering this variable.
    pub request_id: u32,
    /// Last received value.
    pub value: f64,
    /// When the last value arrived; `None` before the first sample.
    pub updated: Option<SystemTime>,
    /// Whether `set_variable` may write this variable back to the host.
    pub writable: bool,
}

/// Data-collection counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Samples applied since construction.
    pub total_updates: u64,
    /// Dispatch-time failures counted since construction.
    pub error_count: u64,
    /// When the most recent sample was applied.
    pub last_update: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Arming,
    Running,
    Stopped,
}

struct VariableState {
    phase: Phase,
    variables: Vec<FlightVariable>,
    by_name: HashMap<String, usize>,
    total_updates: u64,
    error_count: u64,
    last_update: Option<SystemTime>,
}

struct Inner {
    client: Arc<dyn SimClient>,
    registry: Arc<Registry>,
    errors: Arc<ErrorChannel>,
    state: RwLock<VariableState>,
}

/// Thread-safe manager for polled simulation variables.
///
/// Cheap to clone; all clones share one store. The dispatcher holds a clone
/// to deliver inbound samples while callers hold another to read values.
#[derive(Clone)]
pub struct VariableManager {
    inner: Arc<Inner>,
}

impl VariableManager {
    /// Create a manager over an open (or to-be-opened) connection.
    pub fn new(client: Arc<dyn SimClient>, registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                registry,
                errors: Arc::new(ErrorChannel::new()),
                state: RwLock::new(VariableState {
                    phase: Phase::Configuring,
                    variables: Vec::new(),
                    by_name: HashMap::new(),
                    total_updates: 0,
                    error_count: 0,
                    last_update: None,
                }),
            }),
        }
    }

    /// Register a read-only variable.
    pub fn add_variable(&self, name: &str, sim_var: &str, units: &str) -> Result<()> {
        self.add_variable_writable(name, sim_var, units, false)
    }

    /// Register a variable, optionally writable through
    /// [`set_variable`](VariableManager::set_variable).
    ///
    /// Allocates a fresh definition and request ID, registers the definition
    /// with the host, and records the variable. Fails once the manager has
    /// been started.
    pub fn add_variable_writable(
        &self,
        name: &str,
        sim_var: &str,
        units: &str,
        writable: bool,
    ) -> Result<()> {
        // Reserve the name under the write lock, then talk to the host
        // unlocked, then commit. The reservation keeps a concurrent add of
        // the same name out without holding the lock across the native call.
        {
            let mut state = self.write();
            if state.phase != Phase::Configuring {
                return Err(FlightdeckError::ManagerRunning);
            }
            if state.by_name.contains_key(name) {
                return Err(FlightdeckError::DuplicateVariable { name: name.to_string() });
            }
            state.by_name.insert(name.to_string(), RESERVED);
        }

        let definition_id = self.inner.registry.next_definition_id();
        let request_id = self.inner.registry.next_request_id();

        if let Err(err) = self.inner.client.add_to_data_definition(
            definition_id,
            sim_var,
            units,
            DatumType::Float64,
        ) {
            self.write().by_name.remove(name);
            return Err(err);
        }

        let mut state = self.write();
        let slot = state.variables.len();
        state.variables.push(FlightVariable {
            name: name.to_string(),
            sim_var: sim_var.to_string(),
            units: units.to_string(),
            definition_id,
            request_id,
            value: 0.0,
            updated: None,
            writable,
        });
        state.by_name.insert(name.to_string(), slot);
        self.inner.registry.register_request_owner(request_id, slot as u32);

        debug!(name, sim_var, definition_id, request_id, writable, "variable registered");
        Ok(())
    }

    /// Arm every registered variable and begin accepting inbound samples.
    ///
    /// On an arming failure the manager returns to its configuring state and
    /// reports how many requests were armed before the failure; those remain
    /// armed on the host side.
    pub fn start(&self) -> Result<()> {
        let to_arm: Vec<(u32, u32, String)> = {
            let mut state = self.write();
            match state.phase {
                Phase::Configuring | Phase::Stopped => {}
                Phase::Arming | Phase::Running => return Err(FlightdeckError::AlreadyRunning),
            }
            if state.variables.is_empty() {
                return Err(FlightdeckError::NoVariables);
            }
            state.phase = Phase::Arming;
            state
                .variables
                .iter()
                .map(|v| (v.request_id, v.definition_id, v.name.clone()))
                .collect()
        };

        let total = to_arm.len();
        for (armed, (request_id, definition_id, name)) in to_arm.into_iter().enumerate() {
            if let Err(err) = self.inner.client.request_data_on_sim_object(
                request_id,
                definition_id,
                ObjectId::USER,
                Period::Second,
                DataRequestFlag::Changed,
                0,
                0,
                0,
            ) {
                self.write().phase = Phase::Configuring;
                return Err(FlightdeckError::Arm {
                    variable: name,
                    armed,
                    total,
                    source: Box::new(err),
                });
            }
            trace!(name = %name, request_id, definition_id, "request armed");
        }

        self.write().phase = Phase::Running;
        debug!(variables = total, "variable manager running");
        Ok(())
    }

    /// Stop accepting inbound samples. Idempotent.
    pub fn stop(&self) {
        let mut state = self.write();
        if state.phase == Phase::Running {
            state.phase = Phase::Stopped;
            debug!("variable manager stopped");
        }
    }

    /// Whether the manager is currently collecting data.
    pub fn is_running(&self) -> bool {
        self.read().phase == Phase::Running
    }

    /// Snapshot of one variable by name.
    pub fn variable(&self, name: &str) -> Result<FlightVariable> {
        let state = self.read();
        state
            .by_name
            .get(name)
            .filter(|&&slot| slot != RESERVED)
            .and_then(|&slot| state.variables.get(slot))
            .cloned()
            .ok_or_else(|| FlightdeckError::VariableNotFound { name: name.to_string() })
    }

    /// Snapshot of every registered variable, in registration order.
    pub fn variables(&self) -> Vec<FlightVariable> {
        self.read().variables.clone()
    }

    /// Write a value to a writable variable by name.
    ///
    /// The write replaces the variable's whole definition payload. There is
    /// no ordering guarantee between the write and its echo in a later
    /// sample.
    pub fn set_variable(&self, name: &str, value: f64) -> Result<()> {
        let definition_id = {
            let state = self.read();
            let slot = state
                .by_name
                .get(name)
                .filter(|&&slot| slot != RESERVED)
                .copied()
                .ok_or_else(|| FlightdeckError::VariableNotFound { name: name.to_string() })?;
            let record = &state.variables[slot];
            if !record.writable {
                return Err(FlightdeckError::NotWritable { name: name.to_string() });
            }
            record.definition_id
        };

        self.write_value(definition_id, value)
    }

    /// Write a value to a writable variable by registration index.
    pub fn set_variable_by_index(&self, index: usize, value: f64) -> Result<()> {
        let definition_id = {
            let state = self.read();
            let record = state.variables.get(index).ok_or(FlightdeckError::IndexOutOfRange {
                index,
                len: state.variables.len(),
            })?;
            if !record.writable {
                return Err(FlightdeckError::NotWritable { name: record.name.clone() });
            }
            record.definition_id
        };

        self.write_value(definition_id, value)
    }

    fn write_value(&self, definition_id: u32, value: f64) -> Result<()> {
        let payload = value.to_le_bytes();
        self.inner.client.set_data_on_sim_object(definition_id, ObjectId::USER, &payload)
    }

    /// Data-collection counters.
    pub fn stats(&self) -> ManagerStats {
        let state = self.read();
        ManagerStats {
            total_updates: state.total_updates,
            error_count: state.error_count,
            last_update: state.last_update,
        }
    }

    /// Channel of background dispatch errors.
    pub fn errors(&self) -> Arc<ErrorChannel> {
        Arc::clone(&self.inner.errors)
    }

    /// Apply an inbound data sample.
    ///
    /// Called by the dispatcher in arrival order. Samples for a manager that
    /// is not running are ignored; samples with a payload shorter than one
    /// value are ignored entirely; samples for an unknown request ID are
    /// counted and published on the error channel without blocking.
    pub fn apply_sample(&self, sample: &DataSample) {
        if self.read().phase != Phase::Running {
            return;
        }

        let Some(value) = sample.first_value() else {
            trace!(
                request_id = sample.request_id,
                bytes = sample.payload.len(),
                "sample payload too short; ignored"
            );
            return;
        };

        match self.inner.registry.lookup_request_owner(sample.request_id) {
            Some(slot) => {
                let now = SystemTime::now();
                let mut state = self.write();
                match state.variables.get_mut(slot as usize) {
                    Some(record) => {
                        record.value = value;
                        record.updated = Some(now);
                        let name = record.name.clone();
                        state.total_updates += 1;
                        state.last_update = Some(now);
                        trace!(name = %name, value, "variable updated");
                    }
                    None => {
                        state.error_count += 1;
                        drop(state);
                        self.inner.errors.publish(FlightdeckError::UnknownRequest {
                            request_id: sample.request_id,
                        });
                    }
                }
            }
            None => {
                warn!(request_id = sample.request_id, "sample for unknown request ID");
                self.write().error_count += 1;
                self.inner
                    .errors
                    .publish(FlightdeckError::UnknownRequest { request_id: sample.request_id });
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VariableState> {
        self.inner.state.read().expect("variable state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VariableState> {
        self.inner.state.write().expect("variable state lock poisoned")
    }
}
