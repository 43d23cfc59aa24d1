//! Insertion Order Module
//!
//! Tracks the order in which keys entered the cache, for eviction.

use std::collections::VecDeque;

// == Insertion Order ==
/// First-in first-out key order.
///
/// Keys are stored in a VecDeque where:
/// - Front = Oldest insertion (next eviction candidate)
/// - Back = Newest insertion
///
/// Recording a key that is already tracked keeps its position; reads never
/// reorder.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    order: VecDeque<String>,
}

impl InsertionOrder {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Record ==
    /// Appends a newly inserted key. A key already tracked keeps its slot.
    pub fn record(&mut self, key: &str) {
        if !self.contains(key) {
            self.order.push_back(key.to_string());
        }
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    // == Pop Oldest ==
    /// Returns and removes the oldest inserted key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    // == Peek Oldest ==
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.front()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}
