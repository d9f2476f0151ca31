//! Presence tracking derived from the session registry.
//!
//! Holds no state of its own: "online" always means "has at least one live
//! endpoint in the registry". Transition events are emitted from inside the
//! registry lock, so a user coming online is announced exactly once no matter
//! how many tabs race to connect.

use std::sync::Arc;

use super::registry::{Groups, Registration, Removal, SessionRegistry};
use super::{EndpointId, EndpointSender, ServerEvent};
use crate::error::RealtimeError;

#[derive(Clone)]
pub struct PresenceTracker {
    registry: Arc<SessionRegistry>,
    announce_offline: bool,
}

impl PresenceTracker {
    pub fn new(registry: Arc<SessionRegistry>, announce_offline: bool) -> Self {
        Self {
            registry,
            announce_offline,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn online_set(&self) -> Vec<String> {
        self.registry.online_set()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.registry.is_online(identity)
    }

    /// Register an endpoint and emit the arrival events:
    /// the roster goes to the new endpoint only, and a "came online" event
    /// goes to every other endpoint if this is the identity's first.
    pub fn arrive(
        &self,
        identity: &str,
        endpoint: EndpointId,
        sender: EndpointSender,
    ) -> Result<Registration, RealtimeError> {
        self.registry
            .register_with(identity, endpoint, sender, |groups, registration| {
                if let Some(displaced) = &registration.displaced {
                    self.announce_departure(groups, displaced);
                }

                groups.send_to(endpoint, ServerEvent::roster(&registration.online_before));

                if registration.first_for_identity {
                    tracing::info!(user = %registration.identity, endpoint = %endpoint, "User came online");
                    broadcast_except(
                        groups,
                        endpoint,
                        ServerEvent::UserCameOnline {
                            username: registration.identity.clone(),
                        },
                    );
                }
            })
    }

    /// Deregister an endpoint. When it was the identity's last one the user
    /// is offline from this moment on and, if configured, peers are told.
    /// Unknown endpoints are ignored.
    pub fn depart(&self, endpoint: EndpointId) -> Option<Removal> {
        self.registry
            .deregister_with(endpoint, |groups, removal| self.announce_departure(groups, removal))
    }

    fn announce_departure(&self, groups: &Groups, removal: &Removal) {
        if !removal.last_for_identity {
            return;
        }
        tracing::info!(user = %removal.identity, endpoint = %removal.endpoint, "User went offline");
        if self.announce_offline {
            broadcast_except(
                groups,
                removal.endpoint,
                ServerEvent::UserWentOffline {
                    username: removal.identity.clone(),
                },
            );
        }
    }
}

/// Send `event` to every live endpoint other than `skip`. Closed endpoints are
/// skipped silently; their own teardown will deregister them.
fn broadcast_except(groups: &Groups, skip: EndpointId, event: ServerEvent) -> usize {
    groups
        .endpoints()
        .filter(|(id, _)| *id != skip)
        .filter(|(_, tx)| tx.send(event.clone()).is_ok())
        .count()
}
