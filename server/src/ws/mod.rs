//! WebSocket transport for the realtime layer.
//!
//! One actor per connection: a writer task owns the socket sink, a ping task
//! watches liveness, and the reader loop feeds client events to the
//! connection's [`Session`](crate::realtime::Session).

pub mod actor;
pub mod handler;
pub mod protocol;
