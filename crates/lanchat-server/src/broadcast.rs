//! Best-effort fan-out to authenticated sessions

use std::sync::Arc;

use lanchat_protocol::{Event, Message};

use crate::registry::Registry;

/// Sends broadcast events to every session except an excluded one
#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<Registry>,
}

impl BroadcastEngine {
    /// Create an engine over the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Queue `{kind: broadcast, message}` for every session except `exclude`.
    ///
    /// Per-recipient failures (full queue, closed socket) are skipped.
    /// Returns how many sessions the event was queued for.
    pub fn broadcast(&self, message: Message, exclude: Option<&str>) -> usize {
        let recipients = self.registry.snapshot(exclude);
        let event = Event::broadcast(message);

        let delivered = recipients
            .iter()
            .filter(|session| session.endpoint.try_send(event.clone()))
            .count();

        tracing::trace!(
            "Broadcast queued for {}/{} sessions",
            delivered,
            recipients.len()
        );
        delivered
    }

    /// Broadcast a System notice
    pub fn notice(&self, content: impl Into<String>, exclude: Option<&str>) -> usize {
        self.broadcast(Message::system(content), exclude)
    }
}
