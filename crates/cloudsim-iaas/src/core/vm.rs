//! Representation of virtual machine and its status.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use cloudsim_core::{EventId, Id};

use crate::core::cloudlet::Cloudlet;
use crate::core::cloudlet_scheduler::{CloudletScheduler, CloudletSchedulerTimeShared, ProcessingUpdate, VmCapacity};
use crate::core::common::{CloudletId, HostId, SimError, VmId};
use crate::core::provisioner::{ResourceProvisioner, SimpleProvisioner};
use crate::core::resource::ResourceKind;
use crate::core::scaling::{HorizontalVmScaling, VerticalVmScaling};

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    /// Submitted and waiting for a suitable host.
    Waiting,
    Running,
    Destroyed,
    /// Could not be placed onto any host.
    Failed,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Waiting => write!(f, "waiting"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Destroyed => write!(f, "destroyed"),
            VmStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Sample of VM CPU utilization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UtilizationSample {
    pub time: f64,
    pub cpu: f64,
}

/// Represents virtual machine (VM).
///
// VM is characterized by the number of PEs and MIPS of each PE, and by the amounts of RAM, bandwidth and storage.
// The latter are leased to cloudlets running on the VM through VM's own ledgers.
pub struct Vm {
    id: VmId,
    broker: Id,
    mips: u64,
    pes: u64,
    original_pes: u64,
    ram: SimpleProvisioner<CloudletId>,
    bw: SimpleProvisioner<CloudletId>,
    storage: SimpleProvisioner<CloudletId>,
    original_ram: u64,
    original_bw: u64,
    original_storage: u64,
    host: Option<HostId>,
    status: VmStatus,
    granted_mips: Vec<u64>,
    used_mips: f64,
    cloudlet_scheduler: Box<dyn CloudletScheduler>,
    utilization_history: Vec<UtilizationSample>,
    pub(crate) vertical_scalings: Vec<VerticalVmScaling>,
    pub(crate) horizontal_scaling: Option<HorizontalVmScaling>,
    submission_time: Option<f64>,
    creation_time: Option<f64>,
    destruction_time: Option<f64>,
    pub(crate) next_update_event: Option<EventId>,
}

impl Serialize for Vm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Vm", 7)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("pes", &self.pes)?;
        state.serialize_field("mips", &self.mips)?;
        state.serialize_field("ram", &self.ram.capacity())?;
        state.serialize_field("bw", &self.bw.capacity())?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("host", &self.host)?;
        state.end()
    }
}

impl Vm {
    /// Creates VM with time-shared cloudlet scheduler.
    pub fn new(id: VmId, mips: u64, pes: u64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            id,
            broker: 0,
            mips,
            pes,
            original_pes: pes,
            ram: SimpleProvisioner::new(ResourceKind::Ram, ram),
            bw: SimpleProvisioner::new(ResourceKind::Bandwidth, bw),
            storage: SimpleProvisioner::new(ResourceKind::Storage, storage),
            original_ram: ram,
            original_bw: bw,
            original_storage: storage,
            host: None,
            status: VmStatus::Waiting,
            granted_mips: Vec::new(),
            used_mips: 0.,
            cloudlet_scheduler: Box::new(CloudletSchedulerTimeShared::new()),
            utilization_history: Vec::new(),
            vertical_scalings: Vec::new(),
            horizontal_scaling: None,
            submission_time: None,
            creation_time: None,
            destruction_time: None,
            next_update_event: None,
        }
    }

    pub fn with_cloudlet_scheduler(mut self, scheduler: Box<dyn CloudletScheduler>) -> Self {
        self.cloudlet_scheduler = scheduler;
        self
    }

    /// Attaches vertical scaling controller. At most one controller per resource kind is kept.
    pub fn with_vertical_scaling(mut self, scaling: VerticalVmScaling) -> Self {
        self.vertical_scalings.retain(|s| s.kind() != scaling.kind());
        self.vertical_scalings.push(scaling);
        self
    }

    pub fn with_horizontal_scaling(mut self, scaling: HorizontalVmScaling) -> Self {
        self.horizontal_scaling = Some(scaling);
        self
    }

    pub fn id(&self) -> VmId {
        self.id
    }

    /// Returns the component id of broker which owns the VM.
    pub fn broker(&self) -> Id {
        self.broker
    }

    /// Returns MIPS of a single VM PE.
    pub fn mips(&self) -> u64 {
        self.mips
    }

    pub fn pes(&self) -> u64 {
        self.pes
    }

    pub fn original_pes(&self) -> u64 {
        self.original_pes
    }

    pub fn total_mips(&self) -> u64 {
        self.mips * self.pes
    }

    pub fn ram(&self) -> &SimpleProvisioner<CloudletId> {
        &self.ram
    }

    pub fn bw(&self) -> &SimpleProvisioner<CloudletId> {
        &self.bw
    }

    pub fn storage(&self) -> &SimpleProvisioner<CloudletId> {
        &self.storage
    }

    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    /// Returns MIPS granted by the host to each VM PE.
    pub fn granted_mips(&self) -> &[u64] {
        &self.granted_mips
    }

    /// Returns MIPS currently used by running cloudlets.
    pub fn used_mips(&self) -> f64 {
        self.used_mips
    }

    pub fn submission_time(&self) -> Option<f64> {
        self.submission_time
    }

    pub fn creation_time(&self) -> Option<f64> {
        self.creation_time
    }

    pub fn destruction_time(&self) -> Option<f64> {
        self.destruction_time
    }

    pub fn utilization_history(&self) -> &[UtilizationSample] {
        &self.utilization_history
    }

    pub fn cloudlet_scheduler(&self) -> &dyn CloudletScheduler {
        self.cloudlet_scheduler.as_ref()
    }

    pub fn vertical_scalings(&self) -> &[VerticalVmScaling] {
        &self.vertical_scalings
    }

    pub fn horizontal_scaling(&self) -> Option<&HorizontalVmScaling> {
        self.horizontal_scaling.as_ref()
    }

    /// Returns the current capacity of the resource: the number of PEs for CPU, the amount for other resources.
    pub fn capacity(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cpu => self.pes,
            ResourceKind::Ram => self.ram.capacity(),
            ResourceKind::Bandwidth => self.bw.capacity(),
            ResourceKind::Storage => self.storage.capacity(),
        }
    }

    /// Returns the capacity of the resource the VM was created with.
    pub fn original_capacity(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cpu => self.original_pes,
            ResourceKind::Ram => self.original_ram,
            ResourceKind::Bandwidth => self.original_bw,
            ResourceKind::Storage => self.original_storage,
        }
    }

    /// Returns the fraction of the resource in use. For CPU it is the ratio of used MIPS to total VM MIPS.
    pub fn utilization(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.cpu_utilization(),
            ResourceKind::Ram => self.ram.utilization(),
            ResourceKind::Bandwidth => self.bw.utilization(),
            ResourceKind::Storage => self.storage.utilization(),
        }
    }

    pub fn cpu_utilization(&self) -> f64 {
        let total = self.total_mips();
        if total == 0 {
            return 0.;
        }
        (self.used_mips / total as f64).min(1.)
    }

    /// Checks whether the VM has no unfinished cloudlets.
    pub fn is_idle(&self) -> bool {
        self.cloudlet_scheduler.is_empty()
    }

    pub(crate) fn set_broker(&mut self, broker: Id) {
        self.broker = broker;
    }

    pub(crate) fn set_host(&mut self, host: Option<HostId>) {
        self.host = host;
    }

    pub(crate) fn set_status(&mut self, status: VmStatus) {
        self.status = status;
    }

    pub(crate) fn set_pes(&mut self, pes: u64) {
        self.pes = pes;
    }

    pub(crate) fn set_granted_mips(&mut self, granted_mips: Vec<u64>) {
        self.granted_mips = granted_mips;
    }

    pub(crate) fn mark_submitted(&mut self, time: f64) {
        self.submission_time = Some(time);
        self.status = VmStatus::Waiting;
    }

    pub(crate) fn mark_created(&mut self, host: HostId, time: f64) {
        self.host = Some(host);
        self.creation_time = Some(time);
        self.status = VmStatus::Running;
    }

    pub(crate) fn mark_destroyed(&mut self, time: f64) {
        self.host = None;
        self.destruction_time = Some(time);
        self.status = VmStatus::Destroyed;
        self.granted_mips.clear();
        self.used_mips = 0.;
    }

    /// Changes capacity of RAM, bandwidth or storage. CPU capacity is changed via the number of PEs.
    pub(crate) fn set_resource_capacity(&mut self, kind: ResourceKind, capacity: u64) -> Result<(), SimError> {
        match kind {
            ResourceKind::Cpu => Err(SimError::InvalidRequest(
                "vm cpu capacity is changed via the number of PEs".to_string(),
            )),
            ResourceKind::Ram => self.ram.set_capacity(capacity),
            ResourceKind::Bandwidth => self.bw.set_capacity(capacity),
            ResourceKind::Storage => self.storage.set_capacity(capacity),
        }
    }

    pub(crate) fn submit_cloudlet(&mut self, cloudlet: &mut Cloudlet, time: f64) {
        cloudlet.set_vm(self.id);
        self.cloudlet_scheduler.submit(cloudlet, time);
    }

    pub(crate) fn update_processing(
        &mut self,
        time: f64,
        cloudlets: &mut BTreeMap<CloudletId, Cloudlet>,
    ) -> ProcessingUpdate {
        let capacity = VmCapacity {
            pes: self.pes,
            mips: self.mips,
            granted_mips: &self.granted_mips,
            ram: &mut self.ram,
            bw: &mut self.bw,
        };
        let update = self.cloudlet_scheduler.update_processing(time, capacity, cloudlets);
        self.used_mips = update.used_mips;
        let sample = UtilizationSample {
            time,
            cpu: self.cpu_utilization(),
        };
        match self.utilization_history.last_mut() {
            Some(last) if last.time == time => *last = sample,
            _ => self.utilization_history.push(sample),
        }
        update
    }

    pub(crate) fn pause_cloudlet(&mut self, cloudlet: &mut Cloudlet) -> bool {
        let capacity = VmCapacity {
            pes: self.pes,
            mips: self.mips,
            granted_mips: &self.granted_mips,
            ram: &mut self.ram,
            bw: &mut self.bw,
        };
        self.cloudlet_scheduler.pause(cloudlet, capacity)
    }

    pub(crate) fn resume_cloudlet(&mut self, cloudlet: &mut Cloudlet, time: f64) -> bool {
        self.cloudlet_scheduler.resume(cloudlet, time)
    }

    pub(crate) fn cancel_cloudlet(&mut self, cloudlet: &mut Cloudlet, time: f64) -> bool {
        let capacity = VmCapacity {
            pes: self.pes,
            mips: self.mips,
            granted_mips: &self.granted_mips,
            ram: &mut self.ram,
            bw: &mut self.bw,
        };
        self.cloudlet_scheduler.cancel(cloudlet, time, capacity)
    }

    /// Cancels all unfinished cloudlets, returns their ids.
    pub(crate) fn cancel_all_cloudlets(
        &mut self,
        time: f64,
        cloudlets: &mut BTreeMap<CloudletId, Cloudlet>,
    ) -> Vec<CloudletId> {
        let scheduler = &self.cloudlet_scheduler;
        let ids: Vec<CloudletId> = scheduler
            .running()
            .into_iter()
            .chain(scheduler.waiting())
            .chain(scheduler.paused())
            .collect();
        let mut canceled = Vec::new();
        for id in ids {
            if let Some(cloudlet) = cloudlets.get_mut(&id) {
                if self.cancel_cloudlet(cloudlet, time) {
                    canceled.push(id);
                }
            }
        }
        canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cloudlet::CloudletStatus;

    #[test]
    fn test_cpu_utilization_follows_cloudlets() {
        let mut vm = Vm::new(0, 1000, 4, 1024, 100, 1000);
        vm.set_granted_mips(vec![1000; 4]);
        let mut cloudlets = BTreeMap::new();
        let mut cloudlet = Cloudlet::new(0, 10000, 2);
        vm.submit_cloudlet(&mut cloudlet, 0.);
        cloudlets.insert(0, cloudlet);

        vm.update_processing(0., &mut cloudlets);
        assert_eq!(vm.cpu_utilization(), 0.5);
        assert_eq!(vm.utilization(ResourceKind::Ram), 1.);
        assert_eq!(cloudlets[&0].status(), CloudletStatus::InExec);
        assert_eq!(cloudlets[&0].vm(), Some(0));

        let canceled = vm.cancel_all_cloudlets(1., &mut cloudlets);
        assert_eq!(canceled, vec![0]);
        assert!(vm.is_idle());
        assert_eq!(vm.ram().total_allocated(), 0);
        assert_eq!(cloudlets[&0].status(), CloudletStatus::Failed);
    }
}
