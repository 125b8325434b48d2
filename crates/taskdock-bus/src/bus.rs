//! Named-channel publish/subscribe.
//!
//! Handlers run synchronously on the publishing task, in subscription order.
//! Publishing is fire-and-forget: no back-pressure, no delivery guarantee
//! beyond "called once per publish".

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::trace;

use crate::types::TickEvent;

type Handler = Box<dyn Fn(&TickEvent) + Send + Sync>;

/// Registry of named channels and their subscribers.
#[derive(Default)]
pub struct EventBus {
    channels: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to `channel`. Handlers are never removed; the bus
    /// lives as long as the scheduler.
    pub fn subscribe<F>(&self, channel: &str, handler: F)
    where
        F: Fn(&TickEvent) + Send + Sync + 'static,
    {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Invoke every subscriber of `channel` in subscription order.
    /// A channel without subscribers is a no-op.
    pub fn publish(&self, channel: &str, event: &TickEvent) {
        let channels = self.channels.lock().unwrap();
        let Some(handlers) = channels.get(channel) else {
            return;
        };
        trace!(channel, subscribers = handlers.len(), "publishing tick");
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map_or(0, Vec::len)
    }
}
