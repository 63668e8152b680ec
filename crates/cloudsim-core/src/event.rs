//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use serde::ser::Serialize;
use serde_type_name::type_name;

use crate::component::Id;

/// Identifier of simulation event, equal to its insertion sequence number.
pub type EventId = u64;

/// Default priority of emitted events.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Trait that should be implemented by event payload.
///
/// Implemented automatically for any serializable type.
pub trait EventData: Downcast + erased_serde::Serialize {}

impl_downcast!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + 'static> EventData for T {}

/// Representation of event.
///
/// Events are ordered by `(time, priority, id)`: among events with equal time the one with lower priority value
/// goes first, and among events with equal time and priority the one emitted earlier goes first.
pub struct Event {
    /// Unique event identifier (insertion sequence number).
    pub id: EventId,
    /// Time of event occurrence.
    pub time: f64,
    /// Priority used to break ties between events with equal time (lower goes first).
    pub priority: i32,
    /// Identifier of event source.
    pub src: Id,
    /// Identifier of event destination.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Event {
    /// Returns the event tag, i.e. the name of payload type.
    pub fn tag(&self) -> &'static str {
        type_name(&self.data).unwrap_or("unknown")
    }
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Inverted to be used with BinaryHeap (max-heap).
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
