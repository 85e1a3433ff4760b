//! Registry of application views the agent can control.
//!
//! Hosting applications register one client per open view. Activation
//! claims every registered client so interception applies immediately,
//! without waiting for a reload; views registered after that are
//! controlled from birth. The interceptor consults [`ClientRegistry::is_claimed`]
//! and passes requests through untouched until the claim has happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Opaque handle for one registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    claimed: bool,
    controlled: HashMap<u64, bool>,
}

/// Shared, clonable client registry.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client.
    ///
    /// Starts uncontrolled, unless the agent has already claimed its
    /// clients, in which case the new view is controlled immediately.
    pub fn register(&self) -> ClientId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let controlled = inner.claimed;
        inner.controlled.insert(id, controlled);
        ClientId(id)
    }

    /// Remove a client (its view closed).
    pub fn deregister(&self, id: ClientId) {
        self.lock().controlled.remove(&id.0);
    }

    /// Take control of every registered client and of all future
    /// registrations. Returns how many clients are now controlled.
    pub fn claim(&self) -> usize {
        let mut inner = self.lock();
        inner.claimed = true;
        for controlled in inner.controlled.values_mut() {
            *controlled = true;
        }
        inner.controlled.len()
    }

    /// Whether the agent has claimed its clients. Interception only
    /// applies once this is true.
    pub fn is_claimed(&self) -> bool {
        self.lock().claimed
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.lock().controlled.get(&id.0).copied().unwrap_or(false)
    }

    pub fn controlled_count(&self) -> usize {
        self.lock().controlled.values().filter(|c| **c).count()
    }

    pub fn client_count(&self) -> usize {
        self.lock().controlled.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_uncontrolled() {
        let registry = ClientRegistry::new();
        let id = registry.register();
        assert!(!registry.is_claimed());
        assert!(!registry.is_controlled(id));
        assert_eq!(registry.controlled_count(), 0);
        assert_eq!(registry.client_count(), 1);
    }

    #[test]
    fn test_claim_controls_all() {
        let registry = ClientRegistry::new();
        let a = registry.register();
        let b = registry.register();

        assert_eq!(registry.claim(), 2);
        assert!(registry.is_claimed());
        assert!(registry.is_controlled(a));
        assert!(registry.is_controlled(b));
    }

    #[test]
    fn test_deregister() {
        let registry = ClientRegistry::new();
        let id = registry.register();
        registry.deregister(id);
        assert_eq!(registry.client_count(), 0);
        assert!(!registry.is_controlled(id));
    }

    #[test]
    fn test_registration_after_claim_is_controlled() {
        let registry = ClientRegistry::new();
        registry.register();
        registry.claim();
        let late = registry.register();
        assert!(registry.is_controlled(late));
        assert_eq!(registry.controlled_count(), 2);
    }
}
