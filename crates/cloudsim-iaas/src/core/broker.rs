//! Datacenter broker acting on behalf of a user.

use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use cloudsim_core::cast;
use cloudsim_core::context::SimulationContext;
use cloudsim_core::event::{Event, EventId};
use cloudsim_core::handler::EventHandler;
use cloudsim_core::Id;
use cloudsim_core::{log_debug, log_error, log_info, log_warn};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::{CloudletId, VmId};
use crate::core::config::SimulationConfig;
use crate::core::events::cloudlet::{CloudletFinished, CloudletSubmit};
use crate::core::events::host::HostPeFailure;
use crate::core::events::vm::{IdleVmCheck, VmCreateRequest, VmCreated, VmCreationFailed, VmDestroyRequest, VmDestroyed};
use crate::core::vm::{Vm, VmStatus};

/// Selects VM for a cloudlet which is not bound to a specific VM.
pub trait CloudletToVmMapper {
    fn select_vm(&mut self, cloudlet: &Cloudlet, vms: &[VmId]) -> Option<VmId>;
}

/// Assigns cloudlets to created VMs in cyclic order.
#[derive(Default)]
pub struct RoundRobinMapper {
    next: usize,
}

impl RoundRobinMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CloudletToVmMapper for RoundRobinMapper {
    fn select_vm(&mut self, _cloudlet: &Cloudlet, vms: &[VmId]) -> Option<VmId> {
        if vms.is_empty() {
            return None;
        }
        let vm_id = vms[self.next % vms.len()];
        self.next = (self.next + 1) % vms.len();
        Some(vm_id)
    }
}

struct PendingCloudlet {
    cloudlet: Cloudlet,
    submit_time: f64,
}

/// Broker submits VMs and cloudlets to the datacenter and destroys VMs which became idle.
///
/// Cloudlets are held until their VM is created, unbound ones until all submitted VMs are processed.
/// A cloudlet is sent to the datacenter with its submission delay
/// counted from the moment it was submitted to the broker.
pub struct Broker {
    datacenter_id: Id,
    vms: BTreeMap<VmId, VmStatus>,
    pending_cloudlets: Vec<PendingCloudlet>,
    unfinished: BTreeMap<VmId, usize>,
    finished_cloudlets: Vec<CloudletId>,
    failed_cloudlets: Vec<CloudletId>,
    rejected_cloudlets: BTreeMap<CloudletId, Cloudlet>,
    idle_checks: BTreeMap<VmId, EventId>,
    mapper: Box<dyn CloudletToVmMapper>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Broker {
    pub fn new(datacenter_id: Id, ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        Self {
            datacenter_id,
            vms: BTreeMap::new(),
            pending_cloudlets: Vec::new(),
            unfinished: BTreeMap::new(),
            finished_cloudlets: Vec::new(),
            failed_cloudlets: Vec::new(),
            rejected_cloudlets: BTreeMap::new(),
            idle_checks: BTreeMap::new(),
            mapper: Box::new(RoundRobinMapper::new()),
            ctx,
            sim_config,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn set_mapper(&mut self, mapper: Box<dyn CloudletToVmMapper>) {
        self.mapper = mapper;
    }

    /// Submits VMs for creation in the datacenter.
    ///
    /// VMs with ids already known to the broker, including the ones created by horizontal scaling, are skipped.
    pub fn submit_vm_list(&mut self, vms: Vec<Vm>) {
        for mut vm in vms {
            if self.vms.contains_key(&vm.id()) {
                log_error!(self.ctx, "vm #{} is already known to broker", vm.id());
                continue;
            }
            vm.set_broker(self.ctx.id());
            self.vms.insert(vm.id(), VmStatus::Waiting);
            log_debug!(self.ctx, "submitting vm #{}", vm.id());
            self.ctx.emit_now(VmCreateRequest { vm }, self.datacenter_id);
        }
    }

    /// Submits cloudlets, which are sent to the datacenter once their VMs are created.
    pub fn submit_cloudlet_list(&mut self, cloudlets: Vec<Cloudlet>) {
        let now = self.ctx.time();
        for cloudlet in cloudlets {
            self.pending_cloudlets.push(PendingCloudlet {
                cloudlet,
                submit_time: now,
            });
        }
        self.dispatch_pending();
    }

    /// Returns ids of VMs which are currently running.
    pub fn created_vms(&self) -> Vec<VmId> {
        self.vms_with_status(VmStatus::Running)
    }

    pub fn waiting_vms(&self) -> Vec<VmId> {
        self.vms_with_status(VmStatus::Waiting)
    }

    pub fn failed_vms(&self) -> Vec<VmId> {
        self.vms_with_status(VmStatus::Failed)
    }

    pub fn destroyed_vms(&self) -> Vec<VmId> {
        self.vms_with_status(VmStatus::Destroyed)
    }

    /// Returns ids of successfully finished cloudlets in completion order.
    pub fn finished_cloudlets(&self) -> &[CloudletId] {
        &self.finished_cloudlets
    }

    /// Returns ids of failed or canceled cloudlets in completion order.
    pub fn failed_cloudlets(&self) -> &[CloudletId] {
        &self.failed_cloudlets
    }

    /// Returns cloudlets which were never sent to the datacenter because their VM failed.
    pub fn rejected_cloudlets(&self) -> &BTreeMap<CloudletId, Cloudlet> {
        &self.rejected_cloudlets
    }

    pub fn pending_cloudlet_count(&self) -> usize {
        self.pending_cloudlets.len()
    }

    fn vms_with_status(&self, status: VmStatus) -> Vec<VmId> {
        self.vms
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| *id)
            .collect()
    }

    fn dispatch_pending(&mut self) {
        // unbound cloudlets are held until every submitted VM is either created or failed
        let created = if self.vms.values().any(|s| *s == VmStatus::Waiting) {
            Vec::new()
        } else {
            self.created_vms()
        };
        for pending in mem::take(&mut self.pending_cloudlets) {
            let target = match pending.cloudlet.vm() {
                Some(vm_id) => match self.vms.get(&vm_id) {
                    Some(VmStatus::Running) => Some(vm_id),
                    Some(VmStatus::Failed) | Some(VmStatus::Destroyed) => {
                        self.reject_cloudlet(pending.cloudlet);
                        continue;
                    }
                    _ => None,
                },
                None => self.mapper.select_vm(&pending.cloudlet, &created),
            };
            match target {
                Some(vm_id) => self.send_cloudlet(pending, vm_id),
                None => self.pending_cloudlets.push(pending),
            }
        }
    }

    fn send_cloudlet(&mut self, pending: PendingCloudlet, vm_id: VmId) {
        let mut cloudlet = pending.cloudlet;
        let delay = (pending.submit_time + cloudlet.submission_delay() - self.ctx.time()).max(0.);
        cloudlet.set_vm(vm_id);
        *self.unfinished.entry(vm_id).or_default() += 1;
        if let Some(event_id) = self.idle_checks.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
        log_debug!(self.ctx, "sending cloudlet #{} to vm #{} with delay {}", cloudlet.id(), vm_id, delay);
        self.ctx.emit(CloudletSubmit { cloudlet }, self.datacenter_id, delay);
    }

    fn reject_cloudlet(&mut self, mut cloudlet: Cloudlet) {
        log_warn!(self.ctx, "cloudlet #{} can't be executed, its vm is unavailable", cloudlet.id());
        cloudlet.finish(CloudletStatus::Failed, self.ctx.time());
        self.failed_cloudlets.push(cloudlet.id());
        self.rejected_cloudlets.insert(cloudlet.id(), cloudlet);
    }

    fn has_pending_for(&self, vm_id: VmId) -> bool {
        self.pending_cloudlets
            .iter()
            .any(|p| p.cloudlet.vm().map_or(true, |id| id == vm_id))
    }

    fn on_vm_created(&mut self, vm_id: VmId) {
        log_debug!(self.ctx, "vm #{} is running", vm_id);
        self.vms.insert(vm_id, VmStatus::Running);
        self.dispatch_pending();
    }

    fn on_vm_creation_failed(&mut self, vm_id: VmId) {
        log_warn!(self.ctx, "vm #{} creation failed", vm_id);
        self.vms.insert(vm_id, VmStatus::Failed);
        let alive = self
            .vms
            .values()
            .any(|s| *s == VmStatus::Running || *s == VmStatus::Waiting);
        let (rejected, pending): (Vec<PendingCloudlet>, Vec<PendingCloudlet>) =
            mem::take(&mut self.pending_cloudlets)
                .into_iter()
                .partition(|p| p.cloudlet.vm().map_or(!alive, |id| id == vm_id));
        self.pending_cloudlets = pending;
        for p in rejected {
            self.reject_cloudlet(p.cloudlet);
        }
        self.dispatch_pending();
    }

    fn on_cloudlet_finished(&mut self, cloudlet_id: CloudletId, vm_id: VmId, status: CloudletStatus) {
        match status {
            CloudletStatus::Success => self.finished_cloudlets.push(cloudlet_id),
            _ => self.failed_cloudlets.push(cloudlet_id),
        }
        let remaining = match self.unfinished.get_mut(&vm_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return,
        };
        let delay = self.sim_config.vm_destruction_delay;
        if remaining == 0
            && delay >= 0.
            && !self.has_pending_for(vm_id)
            && self.vms.get(&vm_id) == Some(&VmStatus::Running)
        {
            let event_id = self.ctx.emit_self(IdleVmCheck { vm_id }, delay);
            if let Some(previous) = self.idle_checks.insert(vm_id, event_id) {
                self.ctx.cancel_event(previous);
            }
        }
    }

    fn on_idle_vm_check(&mut self, vm_id: VmId) {
        self.idle_checks.remove(&vm_id);
        let idle = self.unfinished.get(&vm_id).map_or(true, |count| *count == 0);
        if idle && !self.has_pending_for(vm_id) && self.vms.get(&vm_id) == Some(&VmStatus::Running) {
            log_info!(self.ctx, "destroying idle vm #{}", vm_id);
            self.ctx.emit_now(VmDestroyRequest { vm_id }, self.datacenter_id);
        }
    }

    fn on_vm_destroyed(&mut self, vm_id: VmId) {
        self.vms.insert(vm_id, VmStatus::Destroyed);
        if let Some(event_id) = self.idle_checks.remove(&vm_id) {
            self.ctx.cancel_event(event_id);
        }
    }
}

impl EventHandler for Broker {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmCreated { vm_id, host_id } => {
                log_debug!(self.ctx, "vm #{} placed on host #{}", vm_id, host_id);
                self.on_vm_created(vm_id);
            }
            VmCreationFailed { vm_id } => {
                self.on_vm_creation_failed(vm_id);
            }
            CloudletFinished {
                cloudlet_id,
                vm_id,
                status,
            } => {
                self.on_cloudlet_finished(cloudlet_id, vm_id, status);
            }
            IdleVmCheck { vm_id } => {
                self.on_idle_vm_check(vm_id);
            }
            VmDestroyed { vm_id } => {
                self.on_vm_destroyed(vm_id);
            }
            HostPeFailure { host_id, pe, vm_ids } => {
                log_warn!(self.ctx, "pe #{} of host #{} failed, affected vms: {:?}", pe, host_id, vm_ids);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_mapper() {
        let mut mapper = RoundRobinMapper::new();
        let cloudlet = Cloudlet::new(0, 1000, 1);
        assert_eq!(mapper.select_vm(&cloudlet, &[]), None);
        let vms = [3, 5, 7];
        let selected: Vec<_> = (0..4).map(|_| mapper.select_vm(&cloudlet, &vms).unwrap()).collect();
        assert_eq!(selected, vec![3, 5, 7, 3]);
    }
}
