//! Identifier allocation and inbound-message routing.
//!
//! One [`Registry`] per connection hands out identifiers in three
//! independent 32-bit spaces and maps inbound IDs back to the arena slot of
//! the consumer that registered them. Owner tokens are indices into the
//! owning manager's storage, never pointers — records move when their vector
//! grows, indices do not.
//!
//! Allocation policy:
//!
//! - Definition IDs count up from 1, one per logical variable.
//! - Request IDs are spaced in wide buckets (1000, 2000, 3000, ...). The
//!   vendor library has been observed to conflate adjacent request IDs; the
//!   stride keeps logically distinct requests far apart. Whether adjacent
//!   IDs actually misbehave is unverified upstream, so the stride stays a
//!   tunable constant.
//! - Event IDs count up from a high base (1000) so they can never collide
//!   with low user-chosen IDs.
//!
//! Identifiers are never reused within a connection's lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

/// Spacing between consecutive request IDs.
pub const REQUEST_ID_STRIDE: u32 = 1000;

/// First event ID handed out.
pub const EVENT_ID_BASE: u32 = 1000;

/// Per-connection identifier allocator and owner index.
#[derive(Debug, Default)]
pub struct Registry {
    definitions_allocated: AtomicU32,
    requests_allocated: AtomicU32,
    events_allocated: AtomicU32,
    request_owners: RwLock<HashMap<u32, u32>>,
    event_owners: RwLock<HashMap<u32, u32>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next definition ID: 1, 2, 3, ...
    pub fn next_definition_id(&self) -> u32 {
        self.definitions_allocated.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Next request ID in the wide-bucket sequence: 1000, 2000, 3000, ...
    pub fn next_request_id(&self) -> u32 {
        (self.requests_allocated.fetch_add(1, Ordering::Relaxed) + 1) * REQUEST_ID_STRIDE
    }

    /// Next event ID: 1000, 1001, 1002, ...
    pub fn next_event_id(&self) -> u32 {
        EVENT_ID_BASE + self.events_allocated.fetch_add(1, Ordering::Relaxed)
    }

    /// Route inbound data samples for `request_id` to the owner slot.
    pub fn register_request_owner(&self, request_id: u32, owner: u32) {
        self.request_owners
            .write()
            .expect("request owner lock poisoned")
            .insert(request_id, owner);
    }

    /// Owner slot for an inbound data sample, or `None` for an ID nobody
    /// registered.
    pub fn lookup_request_owner(&self, request_id: u32) -> Option<u32> {
        self.request_owners
            .read()
            .expect("request owner lock poisoned")
            .get(&request_id)
            .copied()
    }

    /// Route inbound events for `event_id` to the owner slot.
    pub fn register_event_owner(&self, event_id: u32, owner: u32) {
        self.event_owners
            .write()
            .expect("event owner lock poisoned")
            .insert(event_id, owner);
    }

    /// Owner slot for an inbound event, or `None` for an ID nobody
    /// subscribed.
    pub fn lookup_event_owner(&self, event_id: u32) -> Option<u32> {
        self.event_owners
            .read()
            .expect("event owner lock poisoned")
            .get(&event_id)
            .copied()
    }

    /// Drop the routing entry for an unsubscribed event. The ID itself is
    /// never handed out again.
    pub fn release_event_owner(&self, event_id: u32) -> Option<u32> {
        self.event_owners
            .write()
            .expect("event owner lock poisoned")
            .remove(&event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn definition_ids_count_from_one() {
        let registry = Registry::new();
        assert_eq!(registry.next_definition_id(), 1);
        assert_eq!(registry.next_definition_id(), 2);
        assert_eq!(registry.next_definition_id(), 3);
    }

    #[test]
    fn request_ids_use_wide_buckets() {
        let registry = Registry::new();
        assert_eq!(registry.next_request_id(), 1000);
        assert_eq!(registry.next_request_id(), 2000);
        assert_eq!(registry.next_request_id(), 3000);
    }

    #[test]
    fn event_ids_start_at_the_base() {
        let registry = Registry::new();
        assert_eq!(registry.next_event_id(), 1000);
        assert_eq!(registry.next_event_id(), 1001);
    }

    #[test]
    fn owner_lookup_round_trips_and_misses() {
        let registry = Registry::new();
        let request_id = registry.next_request_id();
        registry.register_request_owner(request_id, 0);
        assert_eq!(registry.lookup_request_owner(request_id), Some(0));
        assert_eq!(registry.lookup_request_owner(99999), None);

        let event_id = registry.next_event_id();
        registry.register_event_owner(event_id, 4);
        assert_eq!(registry.lookup_event_owner(event_id), Some(4));
        assert_eq!(registry.release_event_owner(event_id), Some(4));
        assert_eq!(registry.lookup_event_owner(event_id), None);
        assert_eq!(registry.release_event_owner(event_id), None);
    }

    #[test]
    fn allocation_is_unique_across_threads() {
        let registry = std::sync::Arc::new(Registry::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = std::sync::Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| registry.next_request_id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "request ID {id} handed out twice");
                assert_eq!(id % REQUEST_ID_STRIDE, 0);
            }
        }
        assert_eq!(seen.len(), 400);
    }

    proptest! {
        #[test]
        fn ids_are_monotonic_and_never_reused(count in 1usize..64) {
            let registry = Registry::new();
            let mut definitions = HashSet::new();
            let mut requests = HashSet::new();
            let mut events = HashSet::new();
            let mut last_definition = 0;
            let mut last_request = 0;
            let mut last_event = 0;

            for _ in 0..count {
                let definition = registry.next_definition_id();
                let request = registry.next_request_id();
                let event = registry.next_event_id();

                prop_assert!(definition > last_definition);
                prop_assert!(request > last_request);
                prop_assert!(event >= last_event);

                prop_assert!(definitions.insert(definition));
                prop_assert!(requests.insert(request));
                prop_assert!(events.insert(event));

                last_definition = definition;
                last_request = request;
                last_event = event;
            }
        }
    }
}
