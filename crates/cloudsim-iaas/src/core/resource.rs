//! Fixed-capacity resource counters.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::SimError;

/// Type of a resource leased to consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    /// Processing capacity. Measured in MIPS for a single PE and in PEs for a VM.
    Cpu,
    Ram,
    Bandwidth,
    Storage,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "cpu"),
            ResourceKind::Ram => write!(f, "ram"),
            ResourceKind::Bandwidth => write!(f, "bandwidth"),
            ResourceKind::Storage => write!(f, "storage"),
        }
    }
}

/// Resource with fixed capacity and the currently allocated amount.
///
/// The allocated amount never exceeds the capacity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    kind: ResourceKind,
    capacity: u64,
    allocated: u64,
}

impl Resource {
    pub fn new(kind: ResourceKind, capacity: u64) -> Self {
        Self {
            kind,
            capacity,
            allocated: 0,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn available(&self) -> u64 {
        self.capacity - self.allocated
    }

    /// Returns the ratio of allocated amount to capacity, or zero for a resource without capacity.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.;
        }
        self.allocated as f64 / self.capacity as f64
    }

    /// Takes the specified amount from available capacity.
    pub fn allocate(&mut self, amount: u64) -> Result<(), SimError> {
        if amount > self.available() {
            return Err(SimError::CapacityExceeded {
                kind: self.kind,
                requested: amount,
                available: self.available(),
            });
        }
        self.allocated += amount;
        Ok(())
    }

    /// Returns the specified amount to available capacity.
    pub fn release(&mut self, amount: u64) {
        self.allocated -= amount.min(self.allocated);
    }

    /// Changes the capacity. Capacity below the allocated amount is rejected.
    pub fn set_capacity(&mut self, capacity: u64) -> Result<(), SimError> {
        if capacity < self.allocated {
            return Err(SimError::InvalidRequest(format!(
                "{} capacity {} is below allocated amount {}",
                self.kind, capacity, self.allocated
            )));
        }
        self.capacity = capacity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let mut ram = Resource::new(ResourceKind::Ram, 100);
        ram.allocate(60).unwrap();
        assert_eq!(ram.available(), 40);
        assert_eq!(
            ram.allocate(50),
            Err(SimError::CapacityExceeded {
                kind: ResourceKind::Ram,
                requested: 50,
                available: 40
            })
        );
        assert_eq!(ram.allocated(), 60);
        ram.release(100);
        assert_eq!(ram.allocated(), 0);
    }

    #[test]
    fn test_capacity_below_allocated_is_rejected() {
        let mut bw = Resource::new(ResourceKind::Bandwidth, 10);
        bw.allocate(8).unwrap();
        assert!(bw.set_capacity(5).is_err());
        assert_eq!(bw.capacity(), 10);
        bw.set_capacity(8).unwrap();
        assert_eq!(bw.utilization(), 1.);
    }
}
