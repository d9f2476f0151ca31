//! Realtime presence and direct-message delivery.
//!
//! The [`registry::SessionRegistry`] owns the identity -> endpoints mapping
//! behind a single lock. Presence transitions and message fan-out are
//! computed and emitted while that lock is held, so every endpoint observes
//! events in the order the underlying state changes happened.

pub mod events;
pub mod lifecycle;
pub mod presence;
pub mod registry;
pub mod router;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub use events::{ClientEvent, DirectMessage, RosterEntry, ServerEvent};
pub use lifecycle::{Admitted, ConnectionLifecycle, ConnectionState, Session};
pub use presence::PresenceTracker;
pub use registry::{Groups, Registration, Removal, SessionRegistry};
pub use router::{Delivery, MessageRouter};

/// Sender half of an endpoint's outbound queue. The connection's writer task
/// owns the receiver and serializes each event onto the socket.
pub type EndpointSender = mpsc::UnboundedSender<ServerEvent>;

/// Opaque handle for one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(1);

impl EndpointId {
    /// Allocate a process-unique endpoint id.
    pub fn next() -> Self {
        Self(NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<u64> for EndpointId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Returns the identity if it is usable, i.e. present and not blank.
pub(crate) fn normalize_identity(identity: Option<&str>) -> Option<&str> {
    identity.filter(|id| !id.trim().is_empty())
}
