use std::collections::HashSet;

use crate::network::message::Item;

/// Broadcast messages seen by a node, in arrival order. Never shrinks.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Item>,
    seen: HashSet<Item>,
}

impl MessageLog {
    pub fn new() -> Self {
        MessageLog::default()
    }

    /// Returns false if the message was already recorded.
    pub fn record(&mut self, message: Item) -> bool {
        if !self.seen.insert(message.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, message: &Item) -> bool {
        self.seen.contains(message)
    }

    pub fn messages(&self) -> &[Item] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
