use crate::realtime::{ClientEvent, ServerEvent, Session};

/// Handle an incoming text frame.
/// Decodes the JSON event and dispatches it; malformed frames are answered
/// with an `error` event to this endpoint only.
pub fn handle_text_message(text: &str, session: &Session) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                user = %session.identity(),
                endpoint = %session.endpoint(),
                error = %e,
                "Failed to decode client event"
            );
            session.notify(ServerEvent::error(400, "Malformed event"));
            return;
        }
    };

    dispatch_event(event, session);
}

/// Dispatch a decoded client event to the appropriate handler.
fn dispatch_event(event: ClientEvent, session: &Session) {
    match event {
        ClientEvent::PrivateMessage { to, content } => handle_private_message(&to, &content, session),
    }
}

fn handle_private_message(to: &str, content: &str, session: &Session) {
    match session.send_direct(to, content) {
        Ok(delivery) => {
            if delivery.delivered() == 0 {
                tracing::debug!(
                    from = %session.identity(),
                    to = %to,
                    "Recipient offline, message not delivered live"
                );
            }
        }
        Err(err) => {
            tracing::debug!(
                user = %session.identity(),
                endpoint = %session.endpoint(),
                error = %err,
                "Direct message refused"
            );
            session.notify(ServerEvent::error(err.wire_code(), err.to_string()));
        }
    }
}
