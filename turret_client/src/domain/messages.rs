// Log messages from the telemetry feed, newest first.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub timestamp_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MessageHistory {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl MessageHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Prepend `record`, evicting the oldest entry once full.
    pub fn push(&mut self, record: MessageRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_back();
        }
        self.records.push_front(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&MessageRecord> {
        self.records.front()
    }
}
