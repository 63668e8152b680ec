//! Scheduling of host PEs among virtual machines.

use std::collections::BTreeMap;

use crate::core::common::{SimError, VmId};
use crate::core::pe::Pe;
use crate::core::resource::ResourceKind;
use crate::core::sharing::water_fill;

/// Trait for implementation of VM schedulers.
///
/// The scheduler maps virtual PEs of each VM to physical PEs of the host and decides
/// how much of each physical PE capacity is granted to every VM using it.
pub trait VmScheduler {
    /// Returns the number of working PEs not mapped to any virtual PE.
    fn free_pes(&self, pes: &[Pe]) -> u64;

    /// Maps the VM to the given number of virtual PEs, extending or truncating its current mapping.
    fn allocate_pes_for_vm(&mut self, vm_id: VmId, requested_pes: u64, pes: &[Pe]) -> Result<(), SimError>;

    /// Removes the VM mapping.
    fn deallocate_pes_for_vm(&mut self, vm_id: VmId);

    /// Returns indices of physical PEs used by the VM virtual PEs.
    fn pe_mapping(&self, vm_id: VmId) -> &[usize];

    /// Recomputes PE shares given per-virtual-PE MIPS requests of VMs.
    ///
    /// Stores the grants in PE provisioners and returns the granted MIPS per virtual PE of each VM.
    fn update_allocations(&mut self, requests: &BTreeMap<VmId, u64>, pes: &mut [Pe]) -> BTreeMap<VmId, Vec<u64>>;
}

/// Time-shared VM scheduler.
///
/// Each virtual PE is placed onto a distinct working PE with the fewest assigned virtual PEs (lowest index first).
/// PE capacity is shared among its consumers by water-filling, grants are rounded down to integer MIPS.
#[derive(Default)]
pub struct VmSchedulerTimeShared {
    pe_map: BTreeMap<VmId, Vec<usize>>,
}

impl VmSchedulerTimeShared {
    pub fn new() -> Self {
        Self::default()
    }

    fn consumer_counts(&self, pe_count: usize) -> Vec<usize> {
        let mut counts = vec![0; pe_count];
        for mapping in self.pe_map.values() {
            for &pe in mapping {
                counts[pe] += 1;
            }
        }
        counts
    }
}

impl VmScheduler for VmSchedulerTimeShared {
    fn free_pes(&self, pes: &[Pe]) -> u64 {
        let working = pes.iter().filter(|pe| pe.is_working()).count() as u64;
        let mapped = self
            .pe_map
            .values()
            .flatten()
            .filter(|&&pe| pes.get(pe).map_or(false, |pe| pe.is_working()))
            .count() as u64;
        working.saturating_sub(mapped)
    }

    fn allocate_pes_for_vm(&mut self, vm_id: VmId, requested_pes: u64, pes: &[Pe]) -> Result<(), SimError> {
        if requested_pes == 0 {
            return Err(SimError::InvalidRequest(format!("vm #{} requests zero PEs", vm_id)));
        }
        let current = self.pe_mapping(vm_id).to_vec();
        let requested = requested_pes as usize;
        if requested <= current.len() {
            self.pe_map.insert(vm_id, current[..requested].to_vec());
            return Ok(());
        }
        let extra = (requested - current.len()) as u64;
        let free = self.free_pes(pes);
        if extra > free {
            return Err(SimError::CapacityExceeded {
                kind: ResourceKind::Cpu,
                requested: requested_pes,
                available: current.len() as u64 + free,
            });
        }

        let counts = self.consumer_counts(pes.len());
        let mut candidates: Vec<usize> = pes
            .iter()
            .filter(|pe| pe.is_working() && !current.contains(&pe.id()))
            .map(|pe| pe.id())
            .collect();
        candidates.sort_by_key(|&pe| (counts[pe], pe));
        if candidates.len() < extra as usize {
            return Err(SimError::CapacityExceeded {
                kind: ResourceKind::Cpu,
                requested: requested_pes,
                available: (current.len() + candidates.len()) as u64,
            });
        }

        let mut mapping = current;
        mapping.extend(candidates.into_iter().take(extra as usize));
        self.pe_map.insert(vm_id, mapping);
        Ok(())
    }

    fn deallocate_pes_for_vm(&mut self, vm_id: VmId) {
        self.pe_map.remove(&vm_id);
    }

    fn pe_mapping(&self, vm_id: VmId) -> &[usize] {
        self.pe_map.get(&vm_id).map(|m| m.as_slice()).unwrap_or(&[])
    }

    fn update_allocations(&mut self, requests: &BTreeMap<VmId, u64>, pes: &mut [Pe]) -> BTreeMap<VmId, Vec<u64>> {
        let mut consumers: Vec<Vec<(VmId, f64)>> = vec![Vec::new(); pes.len()];
        for (vm_id, mapping) in &self.pe_map {
            let request = requests.get(vm_id).copied().unwrap_or(0);
            for &pe in mapping {
                consumers[pe].push((*vm_id, request as f64));
            }
        }

        let mut pe_grants: Vec<BTreeMap<VmId, u64>> = Vec::with_capacity(pes.len());
        for (pe, pe_consumers) in pes.iter_mut().zip(consumers.iter()) {
            let capacity = if pe.is_working() { pe.mips() as f64 } else { 0. };
            let grants: Vec<(VmId, u64)> = pe_consumers
                .iter()
                .zip(water_fill(capacity, pe_consumers))
                .map(|(&(vm_id, _), grant)| (vm_id, grant.floor() as u64))
                .collect();
            pe.set_allocations(&grants);
            pe_grants.push(grants.into_iter().collect());
        }

        self.pe_map
            .iter()
            .map(|(vm_id, mapping)| {
                let granted = mapping
                    .iter()
                    .map(|&pe| pe_grants[pe].get(vm_id).copied().unwrap_or(0))
                    .collect();
                (*vm_id, granted)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provisioner::ResourceProvisioner;

    fn make_pes(count: usize, mips: u64) -> Vec<Pe> {
        (0..count).map(|i| Pe::new(i, mips)).collect()
    }

    #[test]
    fn test_virtual_pes_go_to_least_used_pes() {
        let pes = make_pes(4, 1000);
        let mut scheduler = VmSchedulerTimeShared::new();
        scheduler.allocate_pes_for_vm(1, 2, &pes).unwrap();
        scheduler.allocate_pes_for_vm(2, 2, &pes).unwrap();
        assert_eq!(scheduler.pe_mapping(1), &[0, 1]);
        assert_eq!(scheduler.pe_mapping(2), &[2, 3]);
        assert_eq!(scheduler.free_pes(&pes), 0);
        assert!(scheduler.allocate_pes_for_vm(3, 1, &pes).is_err());
    }

    #[test]
    fn test_resize_mapping() {
        let pes = make_pes(4, 1000);
        let mut scheduler = VmSchedulerTimeShared::new();
        scheduler.allocate_pes_for_vm(1, 1, &pes).unwrap();
        scheduler.allocate_pes_for_vm(1, 3, &pes).unwrap();
        assert_eq!(scheduler.pe_mapping(1), &[0, 1, 2]);
        scheduler.allocate_pes_for_vm(1, 2, &pes).unwrap();
        assert_eq!(scheduler.pe_mapping(1), &[0, 1]);
        assert_eq!(scheduler.free_pes(&pes), 2);
        assert!(matches!(
            scheduler.allocate_pes_for_vm(1, 0, &pes),
            Err(SimError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_grants_respect_pe_capacity() {
        let mut pes = make_pes(2, 1000);
        let mut scheduler = VmSchedulerTimeShared::new();
        scheduler.allocate_pes_for_vm(1, 2, &pes).unwrap();
        let requests = BTreeMap::from([(1, 1500)]);
        let grants = scheduler.update_allocations(&requests, &mut pes);
        assert_eq!(grants[&1], vec![1000, 1000]);
        for pe in &pes {
            assert!(pe.provisioner().total_allocated() <= pe.mips());
        }
    }

    #[test]
    fn test_failed_pe_grants_nothing() {
        let mut pes = make_pes(2, 1000);
        let mut scheduler = VmSchedulerTimeShared::new();
        scheduler.allocate_pes_for_vm(1, 2, &pes).unwrap();
        pes[1].fail();
        let requests = BTreeMap::from([(1, 800)]);
        let grants = scheduler.update_allocations(&requests, &mut pes);
        assert_eq!(grants[&1], vec![800, 0]);
        assert_eq!(pes[1].provisioner().total_allocated(), 0);
        assert_eq!(scheduler.free_pes(&pes), 0);
    }
}
