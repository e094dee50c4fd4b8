use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::ChatEvent;

/// Events buffered per circle before slow subscribers start lagging
pub const CHANNEL_CAPACITY: usize = 256;

/// One broadcast channel per circle, created on first subscribe
pub struct ChatHub {
    channels: DashMap<String, broadcast::Sender<ChatEvent>>,
    capacity: usize,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, circle_id: &str) -> broadcast::Receiver<ChatEvent> {
        self.channels
            .entry(circle_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send to current subscribers; returns how many received it.
    pub fn publish(&self, circle_id: &str, event: ChatEvent) -> usize {
        let delivered = match self.channels.get(circle_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => return 0,
        };
        if delivered == 0 {
            self.channels
                .remove_if(circle_id, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    /// Drop the channel; subscribers see it closed.
    pub fn close(&self, circle_id: &str) {
        if self.channels.remove(circle_id).is_some() {
            debug!(circle_id, "Chat channel closed");
        }
    }

    pub fn subscriber_count(&self, circle_id: &str) -> usize {
        self.channels
            .get(circle_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
