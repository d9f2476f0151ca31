//! Direct-message fan-out.
//!
//! A message reaches every live endpoint of the recipient and every live
//! endpoint of the sender except the one it was sent from, each at most once.
//! Delivery is best effort: nothing is queued or retried, and a recipient
//! with no live endpoints simply receives nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::registry::SessionRegistry;
use super::{normalize_identity, DirectMessage, EndpointId, ServerEvent};
use crate::error::RealtimeError;

/// Where a routed message went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: DirectMessage,
    /// Endpoints the message was handed to, sorted.
    pub endpoints: Vec<EndpointId>,
}

impl Delivery {
    pub fn delivered(&self) -> usize {
        self.endpoints.len()
    }
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    reject_empty: bool,
}

impl MessageRouter {
    pub fn new(registry: Arc<SessionRegistry>, reject_empty: bool) -> Self {
        Self {
            registry,
            reject_empty,
        }
    }

    pub fn route(
        &self,
        sender_identity: &str,
        sender_endpoint: EndpointId,
        recipient_identity: &str,
        content: &str,
    ) -> Result<Delivery, RealtimeError> {
        let from = normalize_identity(Some(sender_identity)).ok_or(RealtimeError::IdentityMissing)?;
        let to = normalize_identity(Some(recipient_identity)).ok_or(RealtimeError::RecipientMissing)?;
        if self.reject_empty && content.trim().is_empty() {
            return Err(RealtimeError::EmptyMessage);
        }

        let message = DirectMessage {
            content: content.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };

        let endpoints = self.registry.read(|groups| {
            let targets: BTreeSet<EndpointId> = groups
                .endpoints_for(to)
                .into_iter()
                .chain(groups.endpoints_for(from))
                .filter(|id| *id != sender_endpoint)
                .collect();

            targets
                .into_iter()
                .filter(|id| {
                    let sent = groups.send_to(*id, ServerEvent::DirectMessage(message.clone()));
                    if !sent {
                        tracing::debug!(endpoint = %id, "Dropped message for closing endpoint");
                    }
                    sent
                })
                .collect::<Vec<_>>()
        });

        tracing::debug!(
            from = %message.from,
            to = %message.to,
            delivered = endpoints.len(),
            "Direct message routed"
        );

        Ok(Delivery { message, endpoints })
    }
}
