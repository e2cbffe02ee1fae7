use std::collections::VecDeque;

use crate::event::NavigationEvent;

/// A FIFO queue of navigation events.
///
/// The controller publishes while it processes a location update; callers
/// drain afterwards and hand each event to the observer registry.
pub struct EventBus {
    queue: VecDeque<NavigationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn publish(&mut self, event: NavigationEvent) {
        self.queue.push_back(event);
    }

    /// Remove and return all pending events, preserving insertion order.
    pub fn drain(&mut self) -> Vec<NavigationEvent> {
        self.queue.drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
