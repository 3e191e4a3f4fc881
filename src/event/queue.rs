use std::collections::VecDeque;

use super::events::QueuedEvent;

/// FIFO of events observed before the initial sync completed
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<QueuedEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: QueuedEvent) {
        self.events.push_back(event);
    }

    /// Removes the oldest event; each event is handed out once
    pub fn dequeue(&mut self) -> Option<QueuedEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
