//! Resource provisioners.

use std::collections::BTreeMap;

use crate::core::common::SimError;
use crate::core::resource::{Resource, ResourceKind};

/// Trait for ledgers which lease a single resource to a set of consumers.
///
/// The amount passed to [`allocate`](ResourceProvisioner::allocate) is the new total allocation for the consumer,
/// not an increment. An allocation is either fully granted or the ledger is left unchanged.
pub trait ResourceProvisioner<K> {
    /// Sets the allocation of the consumer to the given amount, returns `false` if it does not fit.
    fn allocate(&mut self, consumer: K, amount: u64) -> bool;

    /// Removes the allocation of the consumer, returns the released amount.
    fn deallocate(&mut self, consumer: K) -> u64;

    /// Removes all allocations.
    fn deallocate_all(&mut self);

    /// Returns the amount currently allocated to the consumer.
    fn allocated_for(&self, consumer: K) -> u64;

    /// Checks whether the consumer allocation can be set to the given amount.
    fn is_suitable(&self, consumer: K, amount: u64) -> bool;

    fn capacity(&self) -> u64;

    fn total_allocated(&self) -> u64;

    fn available(&self) -> u64;
}

/// Provisioner which grants any request fitting into the available capacity.
#[derive(Clone, Debug)]
pub struct SimpleProvisioner<K: Ord + Copy> {
    resource: Resource,
    allocations: BTreeMap<K, u64>,
}

impl<K: Ord + Copy> SimpleProvisioner<K> {
    pub fn new(kind: ResourceKind, capacity: u64) -> Self {
        Self {
            resource: Resource::new(kind, capacity),
            allocations: BTreeMap::new(),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn utilization(&self) -> f64 {
        self.resource.utilization()
    }

    /// Returns consumers with their allocations in ascending consumer order.
    pub fn allocations(&self) -> impl Iterator<Item = (&K, &u64)> {
        self.allocations.iter()
    }

    /// Same as [`allocate`](ResourceProvisioner::allocate), but reports the reason of failure.
    pub fn try_allocate(&mut self, consumer: K, amount: u64) -> Result<(), SimError> {
        if amount == 0 {
            return Err(SimError::InvalidRequest(format!(
                "zero {} allocation requested",
                self.resource.kind()
            )));
        }
        let current = self.allocated_for(consumer);
        let available = self.resource.available() + current;
        if amount > available {
            return Err(SimError::CapacityExceeded {
                kind: self.resource.kind(),
                requested: amount,
                available,
            });
        }
        self.resource.release(current);
        self.resource.allocate(amount)?;
        self.allocations.insert(consumer, amount);
        Ok(())
    }

    /// Changes the capacity. Capacity below the total allocated amount is rejected.
    pub fn set_capacity(&mut self, capacity: u64) -> Result<(), SimError> {
        self.resource.set_capacity(capacity)
    }
}

impl<K: Ord + Copy> ResourceProvisioner<K> for SimpleProvisioner<K> {
    fn allocate(&mut self, consumer: K, amount: u64) -> bool {
        self.try_allocate(consumer, amount).is_ok()
    }

    fn deallocate(&mut self, consumer: K) -> u64 {
        match self.allocations.remove(&consumer) {
            Some(amount) => {
                self.resource.release(amount);
                amount
            }
            None => 0,
        }
    }

    fn deallocate_all(&mut self) {
        self.allocations.clear();
        self.resource.release(self.resource.allocated());
    }

    fn allocated_for(&self, consumer: K) -> u64 {
        self.allocations.get(&consumer).copied().unwrap_or(0)
    }

    fn is_suitable(&self, consumer: K, amount: u64) -> bool {
        amount <= self.resource.available() + self.allocated_for(consumer)
    }

    fn capacity(&self) -> u64 {
        self.resource.capacity()
    }

    fn total_allocated(&self) -> u64 {
        self.resource.allocated()
    }

    fn available(&self) -> u64 {
        self.resource.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_ledger(prov: &SimpleProvisioner<u32>) {
        let sum: u64 = prov.allocations().map(|(_, a)| *a).sum();
        assert_eq!(sum, prov.total_allocated());
        assert!(prov.total_allocated() <= prov.capacity());
    }

    #[test]
    fn test_allocate_sets_new_total() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Ram, 1000);
        assert!(prov.allocate(1, 400));
        assert!(prov.allocate(2, 500));
        assert_eq!(prov.available(), 100);

        // consumer 1 grows from 400 to 500, which fits into 100 available + 400 own
        assert!(prov.allocate(1, 500));
        assert_eq!(prov.allocated_for(1), 500);
        assert_eq!(prov.available(), 0);
        check_ledger(&prov);

        // shrinking is always possible
        assert!(prov.allocate(2, 100));
        assert_eq!(prov.available(), 400);
        check_ledger(&prov);
    }

    #[test]
    fn test_failed_allocation_leaves_ledger_unchanged() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Bandwidth, 100);
        assert!(prov.allocate(1, 70));
        assert!(!prov.allocate(2, 31));
        assert!(!prov.allocate(1, 101));
        assert_eq!(prov.allocated_for(1), 70);
        assert_eq!(prov.allocated_for(2), 0);
        assert_eq!(prov.total_allocated(), 70);
        assert_eq!(
            prov.try_allocate(2, 31),
            Err(SimError::CapacityExceeded {
                kind: ResourceKind::Bandwidth,
                requested: 31,
                available: 30
            })
        );
        check_ledger(&prov);
    }

    #[test]
    fn test_zero_allocation_is_invalid() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Storage, 100);
        assert!(matches!(prov.try_allocate(1, 0), Err(SimError::InvalidRequest(_))));
        assert!(!prov.allocate(1, 0));
    }

    #[test]
    fn test_deallocate() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Ram, 100);
        prov.allocate(1, 30);
        prov.allocate(2, 20);
        assert_eq!(prov.deallocate(1), 30);
        assert_eq!(prov.deallocate(1), 0);
        assert_eq!(prov.available(), 80);
        check_ledger(&prov);
    }

    #[test]
    fn test_deallocate_all_is_idempotent() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Ram, 100);
        prov.allocate(1, 30);
        prov.allocate(2, 20);
        prov.deallocate_all();
        assert_eq!(prov.total_allocated(), 0);
        assert_eq!(prov.available(), 100);
        prov.deallocate_all();
        assert_eq!(prov.total_allocated(), 0);
        assert_eq!(prov.allocations().count(), 0);
    }

    #[test]
    fn test_set_capacity() {
        let mut prov = SimpleProvisioner::new(ResourceKind::Ram, 100);
        prov.allocate(1, 60);
        assert!(prov.set_capacity(50).is_err());
        assert!(prov.set_capacity(60).is_ok());
        assert_eq!(prov.available(), 0);
        assert!(!prov.is_suitable(2, 1));
        assert!(prov.is_suitable(1, 60));
    }
}
