//! Bounded queue of pending bindings

use std::collections::VecDeque;

use crate::binding::Binding;

/// Ordered pending bindings; `len() <= max` always holds
#[derive(Debug, Default)]
pub struct BindingQueue {
    items: VecDeque<Binding>,
    max: Option<usize>,
}

impl BindingQueue {
    /// `max: None` means unbounded
    pub fn new(max: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.max.is_some_and(|max| self.items.len() >= max)
    }

    /// Append at the tail; gives the binding back when full
    pub fn enqueue_tail(&mut self, binding: Binding) -> Result<(), Binding> {
        if self.is_full() {
            return Err(binding);
        }
        self.items.push_back(binding);
        Ok(())
    }

    /// Insert at the head; gives the binding back when full
    pub fn enqueue_head(&mut self, binding: Binding) -> Result<(), Binding> {
        if self.is_full() {
            return Err(binding);
        }
        self.items.push_front(binding);
        Ok(())
    }

    pub fn dequeue_head(&mut self) -> Option<Binding> {
        self.items.pop_front()
    }

    /// Remove every pending binding
    pub fn drain(&mut self) -> Vec<Binding> {
        self.items.drain(..).collect()
    }
}
