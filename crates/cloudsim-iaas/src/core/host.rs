//! Physical host leasing its resources to virtual machines.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::common::{HostId, SimError, VmId};
use crate::core::pe::{Pe, PeStatus};
use crate::core::provisioner::{ResourceProvisioner, SimpleProvisioner};
use crate::core::resource::ResourceKind;
use crate::core::vm::Vm;
use crate::core::vm_scheduler::{VmScheduler, VmSchedulerTimeShared};

/// Snapshot of host resource usage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostState {
    pub id: HostId,
    pub free_pes: u64,
    pub failed_pes: u64,
    pub allocated_mips: u64,
    pub ram_available: u64,
    pub bw_available: u64,
    pub storage_available: u64,
    pub vms: Vec<VmId>,
}

pub struct Host {
    id: HostId,
    name: String,
    pes: Vec<Pe>,
    ram: SimpleProvisioner<VmId>,
    bw: SimpleProvisioner<VmId>,
    storage: SimpleProvisioner<VmId>,
    vms: Vec<VmId>,
    vm_scheduler: Box<dyn VmScheduler>,
}

impl Host {
    /// Creates host with identical PEs and time-shared VM scheduler.
    pub fn new(id: HostId, name: &str, pe_count: u64, pe_mips: u64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            pes: (0..pe_count as usize).map(|i| Pe::new(i, pe_mips)).collect(),
            ram: SimpleProvisioner::new(ResourceKind::Ram, ram),
            bw: SimpleProvisioner::new(ResourceKind::Bandwidth, bw),
            storage: SimpleProvisioner::new(ResourceKind::Storage, storage),
            vms: Vec::new(),
            vm_scheduler: Box::new(VmSchedulerTimeShared::new()),
        }
    }

    pub fn with_vm_scheduler(mut self, vm_scheduler: Box<dyn VmScheduler>) -> Self {
        self.vm_scheduler = vm_scheduler;
        self
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn ram(&self) -> &SimpleProvisioner<VmId> {
        &self.ram
    }

    pub fn bw(&self) -> &SimpleProvisioner<VmId> {
        &self.bw
    }

    pub fn storage(&self) -> &SimpleProvisioner<VmId> {
        &self.storage
    }

    /// Returns hosted VMs in creation order.
    pub fn vms(&self) -> &[VmId] {
        &self.vms
    }

    pub fn working_pes(&self) -> u64 {
        self.pes.iter().filter(|pe| pe.is_working()).count() as u64
    }

    /// Returns the number of working PEs not used by any VM.
    pub fn free_pes(&self) -> u64 {
        self.vm_scheduler.free_pes(&self.pes)
    }

    /// Returns the physical PEs used by the VM.
    pub fn pe_mapping(&self, vm_id: VmId) -> &[usize] {
        self.vm_scheduler.pe_mapping(vm_id)
    }

    pub fn state(&self) -> HostState {
        HostState {
            id: self.id,
            free_pes: self.free_pes(),
            failed_pes: self.pes.len() as u64 - self.working_pes(),
            allocated_mips: self.pes.iter().map(|pe| pe.provisioner().total_allocated()).sum(),
            ram_available: self.ram.available(),
            bw_available: self.bw.available(),
            storage_available: self.storage.available(),
            vms: self.vms.clone(),
        }
    }

    /// Checks whether the VM can be placed onto this host now.
    pub fn is_suitable_for_vm(&self, vm: &Vm) -> Result<(), SimError> {
        if vm.pes() == 0 {
            return Err(SimError::InvalidRequest(format!("vm #{} requests zero PEs", vm.id())));
        }
        if vm.pes() > self.free_pes() {
            return Err(SimError::CapacityExceeded {
                kind: ResourceKind::Cpu,
                requested: vm.pes(),
                available: self.free_pes(),
            });
        }
        let demands = [
            (&self.ram, vm.ram().capacity()),
            (&self.bw, vm.bw().capacity()),
            (&self.storage, vm.storage().capacity()),
        ];
        for (ledger, amount) in demands {
            if amount > 0 && !ledger.is_suitable(vm.id(), amount) {
                return Err(SimError::CapacityExceeded {
                    kind: ledger.kind(),
                    requested: amount,
                    available: ledger.available(),
                });
            }
        }
        Ok(())
    }

    /// Checks whether the VM could be placed onto this host if it was empty.
    pub fn could_ever_host(&self, vm: &Vm) -> bool {
        vm.pes() > 0
            && vm.pes() <= self.working_pes()
            && vm.ram().capacity() <= self.ram.capacity()
            && vm.bw().capacity() <= self.bw.capacity()
            && vm.storage().capacity() <= self.storage.capacity()
    }

    /// Reserves host resources for the VM. Either all resources are reserved or none.
    pub fn create_vm(&mut self, vm: &mut Vm) -> Result<(), SimError> {
        self.is_suitable_for_vm(vm)?;
        let vm_id = vm.id();
        if let Err(e) = self.commit_vm(vm) {
            self.release_vm(vm_id);
            return Err(e);
        }
        self.vms.push(vm_id);
        vm.set_host(Some(self.id));
        Ok(())
    }

    fn commit_vm(&mut self, vm: &Vm) -> Result<(), SimError> {
        for (ledger, amount) in [
            (&mut self.ram, vm.ram().capacity()),
            (&mut self.bw, vm.bw().capacity()),
            (&mut self.storage, vm.storage().capacity()),
        ] {
            if amount > 0 {
                ledger.try_allocate(vm.id(), amount)?;
            }
        }
        self.vm_scheduler.allocate_pes_for_vm(vm.id(), vm.pes(), &self.pes)
    }

    fn release_vm(&mut self, vm_id: VmId) {
        self.ram.deallocate(vm_id);
        self.bw.deallocate(vm_id);
        self.storage.deallocate(vm_id);
        self.vm_scheduler.deallocate_pes_for_vm(vm_id);
    }

    /// Releases all resources held by the VM. Returns `false` if the VM is not hosted here.
    pub fn destroy_vm(&mut self, vm: &mut Vm) -> bool {
        let vm_id = vm.id();
        if !self.vms.contains(&vm_id) {
            return false;
        }
        self.release_vm(vm_id);
        self.vms.retain(|&id| id != vm_id);
        vm.set_host(None);
        true
    }

    /// Recomputes PE shares of hosted VMs, returns the granted MIPS per virtual PE of each VM.
    pub fn update_vm_allocations(&mut self, vms: &BTreeMap<VmId, Vm>) -> BTreeMap<VmId, Vec<u64>> {
        let requests: BTreeMap<VmId, u64> = self
            .vms
            .iter()
            .filter_map(|id| vms.get(id))
            .map(|vm| (vm.id(), vm.mips()))
            .collect();
        self.vm_scheduler.update_allocations(&requests, &mut self.pes)
    }

    /// Marks the PE as failed, returns the VMs which were using it.
    pub fn fail_pe(&mut self, pe: usize) -> Result<Vec<VmId>, SimError> {
        match self.pes.get_mut(pe) {
            Some(target) if target.status() == PeStatus::Failed => Ok(Vec::new()),
            Some(target) => {
                target.fail();
                Ok(self
                    .vms
                    .iter()
                    .copied()
                    .filter(|&vm_id| self.vm_scheduler.pe_mapping(vm_id).contains(&pe))
                    .collect())
            }
            None => Err(SimError::InvalidRequest(format!(
                "host #{} has no pe #{}",
                self.id, pe
            ))),
        }
    }

    /// Changes the VM capacity of the resource to the requested total amount (PEs for CPU).
    ///
    /// Growth is capped by what the host has available, shrinking is always granted unless the VM
    /// uses more of the resource than requested. Returns the new capacity of the VM.
    pub fn scale_vm_resource(&mut self, vm: &mut Vm, kind: ResourceKind, requested: u64) -> Result<u64, SimError> {
        if !self.vms.contains(&vm.id()) {
            return Err(SimError::VmNotFound(vm.id()));
        }
        if requested == 0 {
            return Err(SimError::InvalidRequest(format!(
                "zero {} requested for vm #{}",
                kind,
                vm.id()
            )));
        }
        let current = vm.capacity(kind);
        match kind {
            ResourceKind::Cpu => {
                let target = requested.min(current + self.free_pes());
                if target != current {
                    self.vm_scheduler.allocate_pes_for_vm(vm.id(), target, &self.pes)?;
                    vm.set_pes(target);
                }
                Ok(target)
            }
            _ => {
                let ledger = match kind {
                    ResourceKind::Ram => &mut self.ram,
                    ResourceKind::Bandwidth => &mut self.bw,
                    _ => &mut self.storage,
                };
                let target = requested.min(ledger.available() + ledger.allocated_for(vm.id()));
                if target == current {
                    return Ok(current);
                }
                if target < current {
                    vm.set_resource_capacity(kind, target)?;
                    ledger.try_allocate(vm.id(), target)?;
                } else {
                    ledger.try_allocate(vm.id(), target)?;
                    vm.set_resource_capacity(kind, target)?;
                }
                Ok(target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy_vm() {
        let mut host = Host::new(0, "h", 4, 1000, 2048, 1000, 10000);
        let mut vm = Vm::new(1, 1000, 2, 1024, 100, 1000);
        host.create_vm(&mut vm).unwrap();
        assert_eq!(vm.host(), Some(0));
        assert_eq!(host.free_pes(), 2);
        assert_eq!(host.ram().available(), 1024);

        assert!(host.destroy_vm(&mut vm));
        assert!(!host.destroy_vm(&mut vm));
        assert_eq!(host.free_pes(), 4);
        assert_eq!(host.ram().total_allocated(), 0);
        assert_eq!(host.bw().total_allocated(), 0);
        assert_eq!(host.storage().total_allocated(), 0);
    }

    #[test]
    fn test_unsuitable_vm_leaves_host_unchanged() {
        let mut host = Host::new(0, "h", 4, 1000, 2048, 1000, 10000);
        let mut vm = Vm::new(1, 1000, 2, 4096, 100, 1000);
        assert!(matches!(
            host.create_vm(&mut vm),
            Err(SimError::CapacityExceeded {
                kind: ResourceKind::Ram,
                ..
            })
        ));
        assert_eq!(host.free_pes(), 4);
        assert_eq!(host.ram().total_allocated(), 0);
        assert_eq!(host.bw().total_allocated(), 0);
        assert!(host.vms().is_empty());
        assert_eq!(vm.host(), None);
    }

    #[test]
    fn test_scale_vm_pes_is_capped() {
        let mut host = Host::new(0, "h", 4, 1000, 2048, 1000, 10000);
        let mut vm = Vm::new(1, 1000, 2, 1024, 100, 1000);
        host.create_vm(&mut vm).unwrap();
        assert_eq!(host.scale_vm_resource(&mut vm, ResourceKind::Cpu, 6), Ok(4));
        assert_eq!(vm.pes(), 4);
        assert_eq!(host.free_pes(), 0);
        assert_eq!(host.scale_vm_resource(&mut vm, ResourceKind::Cpu, 3), Ok(3));
        assert_eq!(host.pe_mapping(1), &[0, 1, 2]);
    }

    #[test]
    fn test_scale_vm_ram() {
        let mut host = Host::new(0, "h", 4, 1000, 2048, 1000, 10000);
        let mut vm = Vm::new(1, 1000, 2, 1024, 100, 1000);
        host.create_vm(&mut vm).unwrap();
        assert_eq!(host.scale_vm_resource(&mut vm, ResourceKind::Ram, 4096), Ok(2048));
        assert_eq!(vm.ram().capacity(), 2048);
        assert_eq!(host.ram().available(), 0);
        assert_eq!(host.scale_vm_resource(&mut vm, ResourceKind::Ram, 512), Ok(512));
        assert_eq!(host.ram().allocated_for(1), 512);
    }

    #[test]
    fn test_fail_pe_reports_affected_vms() {
        let mut host = Host::new(0, "h", 2, 1000, 2048, 1000, 10000);
        let mut vm = Vm::new(1, 1000, 1, 1024, 100, 1000);
        host.create_vm(&mut vm).unwrap();
        assert_eq!(host.fail_pe(0), Ok(vec![1]));
        assert_eq!(host.fail_pe(0), Ok(vec![]));
        assert!(host.fail_pe(5).is_err());
        assert_eq!(host.working_pes(), 1);
        // the remaining PE is not used by any VM
        assert_eq!(host.free_pes(), 1);
        let state = host.state();
        assert_eq!(state.failed_pes, 1);
        assert_eq!(state.free_pes, 1);
        assert_eq!(state.vms, vec![1]);
    }
}
