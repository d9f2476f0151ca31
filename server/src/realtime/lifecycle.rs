//! Connection lifecycle: `Connecting -> Admitted -> Active -> Closed`.
//!
//! [`ConnectionLifecycle::admit`] checks the handshake before anything touches
//! the registry. [`ConnectionLifecycle::activate`] registers the endpoint and
//! returns a [`Session`], which deregisters itself exactly once on
//! [`Session::close`] or when dropped.

use std::sync::Arc;

use super::presence::PresenceTracker;
use super::registry::{Removal, SessionRegistry};
use super::router::{Delivery, MessageRouter};
use super::{normalize_identity, EndpointId, EndpointSender, ServerEvent};
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Admitted,
    Active,
    Closed,
}

/// A connection attempt whose handshake carried a usable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    identity: String,
}

impl Admitted {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::Admitted
    }
}

/// Entry point for everything realtime: admission, presence and routing.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    presence: PresenceTracker,
    router: MessageRouter,
}

impl ConnectionLifecycle {
    pub fn new(registry: Arc<SessionRegistry>, config: &RealtimeConfig) -> Self {
        Self {
            presence: PresenceTracker::new(registry.clone(), config.announce_offline),
            router: MessageRouter::new(registry, config.reject_empty_messages),
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.presence.registry()
    }

    /// `Connecting -> Admitted`, or `Closed` with `IdentityMissing`.
    pub fn admit(&self, identity: Option<&str>) -> Result<Admitted, RealtimeError> {
        match normalize_identity(identity) {
            Some(identity) => {
                tracing::debug!(
                    user = %identity,
                    from = ?ConnectionState::Connecting,
                    to = ?ConnectionState::Admitted,
                    "Handshake accepted"
                );
                Ok(Admitted {
                    identity: identity.to_string(),
                })
            }
            None => {
                tracing::warn!(
                    from = ?ConnectionState::Connecting,
                    to = ?ConnectionState::Closed,
                    "Connection refused: handshake carried no identity"
                );
                Err(RealtimeError::IdentityMissing)
            }
        }
    }

    /// `Admitted -> Active`: register the endpoint, hand it the roster and
    /// announce the user if this is their first endpoint.
    pub fn activate(
        &self,
        admitted: Admitted,
        sender: EndpointSender,
    ) -> Result<Session, RealtimeError> {
        let endpoint = EndpointId::next();
        let registration = self
            .presence
            .arrive(&admitted.identity, endpoint, sender.clone())?;

        tracing::info!(
            user = %admitted.identity,
            endpoint = %endpoint,
            first = registration.first_for_identity,
            "Endpoint active"
        );

        Ok(Session {
            lifecycle: self.clone(),
            identity: admitted.identity,
            endpoint,
            sender,
            state: ConnectionState::Active,
        })
    }

    /// Admit and activate in one step.
    pub fn connect(
        &self,
        identity: Option<&str>,
        sender: EndpointSender,
    ) -> Result<Session, RealtimeError> {
        let admitted = self.admit(identity)?;
        self.activate(admitted, sender)
    }
}

/// One active endpoint.
pub struct Session {
    lifecycle: ConnectionLifecycle,
    identity: String,
    endpoint: EndpointId,
    sender: EndpointSender,
    state: ConnectionState,
}

impl Session {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Route a direct message from this endpoint.
    pub fn send_direct(&self, to: &str, content: &str) -> Result<Delivery, RealtimeError> {
        if self.state != ConnectionState::Active {
            return Err(RealtimeError::UnknownEndpoint(self.endpoint));
        }
        self.lifecycle
            .router
            .route(&self.identity, self.endpoint, to, content)
    }

    /// Push an event to this endpoint only.
    pub fn notify(&self, event: ServerEvent) -> bool {
        self.state == ConnectionState::Active && self.sender.send(event).is_ok()
    }

    /// `Active -> Closed`. Safe to call more than once.
    pub fn close(&mut self) -> Option<Removal> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.state = ConnectionState::Closed;

        let removal = self.lifecycle.presence.depart(self.endpoint);
        tracing::info!(
            user = %self.identity,
            endpoint = %self.endpoint,
            last = removal.as_ref().is_some_and(|r| r.last_for_identity),
            "Endpoint closed"
        );
        removal
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
