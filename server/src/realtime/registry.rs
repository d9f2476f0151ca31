//! Session registry: identity -> set of live endpoints.
//!
//! A user may hold several endpoints at once (multiple tabs or devices); the
//! set of endpoints under one identity is that user's broadcast group.
//! All mutation goes through one [`parking_lot::Mutex`] so the
//! "was this the first/last endpoint" check and the mutation are atomic.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use super::{normalize_identity, EndpointId, EndpointSender, ServerEvent};
use crate::error::RealtimeError;

/// Locked registry state. Handed to callbacks that must observe a consistent
/// view while the lock is held.
#[derive(Default)]
pub struct Groups {
    by_identity: BTreeMap<String, BTreeMap<EndpointId, EndpointSender>>,
    owners: HashMap<EndpointId, String>,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: String,
    pub endpoint: EndpointId,
    /// True when the identity had no live endpoint before this one.
    pub first_for_identity: bool,
    /// Online identities immediately before this registration, sorted.
    pub online_before: Vec<String>,
    /// Set when the endpoint was previously owned by another identity and
    /// had to be moved.
    pub displaced: Option<Removal>,
}

/// Outcome of removing a registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub identity: String,
    pub endpoint: EndpointId,
    /// True when this was the identity's last live endpoint.
    pub last_for_identity: bool,
}

impl Groups {
    pub fn endpoints_for(&self, identity: &str) -> Vec<EndpointId> {
        self.by_identity
            .get(identity)
            .map(|group| group.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.by_identity
            .get(identity)
            .is_some_and(|group| !group.is_empty())
    }

    /// Identities with at least one live endpoint, sorted.
    pub fn online_set(&self) -> Vec<String> {
        self.by_identity
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn owner(&self, endpoint: EndpointId) -> Option<&str> {
        self.owners.get(&endpoint).map(String::as_str)
    }

    /// Every endpoint in one identity's broadcast group.
    pub fn group(&self, identity: &str) -> impl Iterator<Item = (EndpointId, &EndpointSender)> + '_ {
        self.by_identity
            .get(identity)
            .into_iter()
            .flat_map(|group| group.iter().map(|(id, tx)| (*id, tx)))
    }

    /// Every live endpoint across all identities.
    pub fn endpoints(&self) -> impl Iterator<Item = (EndpointId, &EndpointSender)> + '_ {
        self.by_identity
            .values()
            .flat_map(|group| group.iter().map(|(id, tx)| (*id, tx)))
    }

    pub fn endpoint_count(&self) -> usize {
        self.owners.len()
    }

    /// Push an event to one endpoint. Returns false if the endpoint is unknown
    /// or its connection has already gone away.
    pub fn send_to(&self, endpoint: EndpointId, event: ServerEvent) -> bool {
        let Some(identity) = self.owners.get(&endpoint) else {
            return false;
        };
        self.by_identity
            .get(identity)
            .and_then(|group| group.get(&endpoint))
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    fn insert(&mut self, identity: &str, endpoint: EndpointId, sender: EndpointSender) -> Registration {
        let moving = self
            .owners
            .get(&endpoint)
            .is_some_and(|owner| owner != identity);
        let displaced = if moving { self.remove(endpoint) } else { None };

        let online_before = self.online_set();
        let group = self.by_identity.entry(identity.to_string()).or_default();
        let first_for_identity = group.is_empty();
        group.insert(endpoint, sender);
        self.owners.insert(endpoint, identity.to_string());

        Registration {
            identity: identity.to_string(),
            endpoint,
            first_for_identity,
            online_before,
            displaced,
        }
    }

    fn remove(&mut self, endpoint: EndpointId) -> Option<Removal> {
        let identity = self.owners.remove(&endpoint)?;

        let mut last_for_identity = false;
        if let Some(group) = self.by_identity.get_mut(&identity) {
            group.remove(&endpoint);
            if group.is_empty() {
                self.by_identity.remove(&identity);
                last_for_identity = true;
            }
        }

        Some(Removal {
            identity,
            endpoint,
            last_for_identity,
        })
    }
}

/// Owned registry of live endpoints, shared via `Arc` across connections.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Groups>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `endpoint` to `identity`'s group.
    ///
    /// Registering an endpoint already held by the same identity only
    /// refreshes its sender.
    pub fn register(
        &self,
        identity: &str,
        endpoint: EndpointId,
        sender: EndpointSender,
    ) -> Result<Registration, RealtimeError> {
        self.register_with(identity, endpoint, sender, |_, _| {})
    }

    /// Like [`register`](Self::register), then runs `on_registered` before the
    /// lock is released.
    pub fn register_with<F>(
        &self,
        identity: &str,
        endpoint: EndpointId,
        sender: EndpointSender,
        on_registered: F,
    ) -> Result<Registration, RealtimeError>
    where
        F: FnOnce(&Groups, &Registration),
    {
        let identity = normalize_identity(Some(identity)).ok_or(RealtimeError::IdentityMissing)?;

        let mut groups = self.inner.lock();
        let registration = groups.insert(identity, endpoint, sender);
        on_registered(&groups, &registration);
        Ok(registration)
    }

    /// Remove `endpoint` from whichever identity owns it. Returns `None` when
    /// the endpoint is already gone.
    pub fn deregister(&self, endpoint: EndpointId) -> Option<Removal> {
        self.deregister_with(endpoint, |_, _| {})
    }

    /// Like [`deregister`](Self::deregister); `on_removed` only runs when
    /// something was actually removed.
    pub fn deregister_with<F>(&self, endpoint: EndpointId, on_removed: F) -> Option<Removal>
    where
        F: FnOnce(&Groups, &Removal),
    {
        let mut groups = self.inner.lock();
        let removal = groups.remove(endpoint)?;
        on_removed(&groups, &removal);
        Some(removal)
    }

    pub fn endpoints_for(&self, identity: &str) -> Vec<EndpointId> {
        self.inner.lock().endpoints_for(identity)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.inner.lock().is_online(identity)
    }

    pub fn online_set(&self) -> Vec<String> {
        self.inner.lock().online_set()
    }

    /// Run `f` against a consistent view of the registry.
    pub fn read<R>(&self, f: impl FnOnce(&Groups) -> R) -> R {
        f(&self.inner.lock())
    }
}
