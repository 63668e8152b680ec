//! Clock ticks and their listeners.

use serde::Serialize;

/// Information about a clock tick passed to the listeners.
///
/// Ticks are numbered sequentially starting from zero, so the index can be used to detect
/// whether some periodic action has already been performed during the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TickInfo {
    /// Sequential number of the tick.
    pub index: u64,
    /// Simulation time of the tick.
    pub time: f64,
}

/// Handle of a registered listener, used to unsubscribe it.
pub type ListenerId = u64;

/// Ordered list of subscribers.
///
/// Listeners are invoked in the order of subscription.
pub struct Listeners<F: ?Sized> {
    items: Vec<(ListenerId, Box<F>)>,
    next_id: ListenerId,
}

impl<F: ?Sized> Listeners<F> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 0,
        }
    }

    /// Adds a listener and returns its handle.
    pub fn add(&mut self, listener: Box<F>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push((id, listener));
        id
    }

    /// Removes the listener with given handle, returns `false` if there is no such listener.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let len = self.items.len();
        self.items.retain(|(listener_id, _)| *listener_id != id);
        self.items.len() != len
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks whether there are no registered listeners.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns mutable iterator over listeners in subscription order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<F>> {
        self.items.iter_mut().map(|(_, listener)| listener)
    }
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listeners_keep_subscription_order() {
        let mut listeners: Listeners<dyn FnMut(&mut Vec<u32>)> = Listeners::new();
        let first = listeners.add(Box::new(|log: &mut Vec<u32>| log.push(1)));
        listeners.add(Box::new(|log: &mut Vec<u32>| log.push(2)));
        listeners.add(Box::new(|log: &mut Vec<u32>| log.push(3)));

        let mut log = Vec::new();
        for listener in listeners.iter_mut() {
            listener(&mut log);
        }
        assert_eq!(log, vec![1, 2, 3]);

        assert!(listeners.remove(first));
        assert!(!listeners.remove(first));
        assert_eq!(listeners.len(), 2);
    }
}
