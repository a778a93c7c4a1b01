//! Bounded error channel for background failures.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::FlightdeckError;

/// Default capacity of a manager's error channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 10;

/// A bounded ring of background errors.
///
/// Dispatch-time failures (malformed messages, unknown IDs, callback panics)
/// are published here instead of being returned, because no caller is on the
/// stack when they happen. The ring is a fail-fast diagnostic, not a
/// reliable log: at capacity the OLDEST entry is dropped without
/// acknowledgment so the most recent failures are always visible.
#[derive(Debug)]
pub struct ErrorChannel {
    errors: Mutex<VecDeque<FlightdeckError>>,
    capacity: usize,
}

impl ErrorChannel {
    /// Channel with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(ERROR_CHANNEL_CAPACITY)
    }

    /// Channel with an explicit capacity (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            errors: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Publish an error, dropping the oldest entry when full. Never blocks.
    pub fn publish(&self, error: FlightdeckError) {
        let mut errors = self.errors.lock().expect("error channel lock poisoned");
        if errors.len() == self.capacity {
            errors.pop_front();
        }
        errors.push_back(error);
    }

    /// Take the oldest pending error, if any.
    pub fn try_recv(&self) -> Option<FlightdeckError> {
        self.errors.lock().expect("error channel lock poisoned").pop_front()
    }

    /// Take every pending error in arrival order.
    pub fn drain(&self) -> Vec<FlightdeckError> {
        self.errors.lock().expect("error channel lock poisoned").drain(..).collect()
    }

    /// Number of pending errors.
    pub fn len(&self) -> usize {
        self.errors.lock().expect("error channel lock poisoned").len()
    }

    /// Whether no errors are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: u32) -> FlightdeckError {
        FlightdeckError::UnknownRequest { request_id: id }
    }

    fn id_of(error: &FlightdeckError) -> u32 {
        match error {
            FlightdeckError::UnknownRequest { request_id } => *request_id,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn delivers_in_arrival_order() {
        let channel = ErrorChannel::new();
        channel.publish(marker(1));
        channel.publish(marker(2));

        assert_eq!(channel.len(), 2);
        assert_eq!(id_of(&channel.try_recv().unwrap()), 1);
        assert_eq!(id_of(&channel.try_recv().unwrap()), 2);
        assert!(channel.try_recv().is_none());
        assert!(channel.is_empty());
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let channel = ErrorChannel::new();
        for id in 0..15u32 {
            channel.publish(marker(id));
        }

        assert_eq!(channel.len(), ERROR_CHANNEL_CAPACITY);
        let drained = channel.drain();
        let ids: Vec<u32> = drained.iter().map(id_of).collect();
        assert_eq!(ids, (5..15).collect::<Vec<u32>>());
        assert!(channel.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let channel = ErrorChannel::with_capacity(0);
        channel.publish(marker(7));
        assert_eq!(channel.len(), 1);
    }
}
