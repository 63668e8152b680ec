//! Datacenter component owning hosts, VMs and cloudlets.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::rc::Rc;

use serde_json::json;

use cloudsim_core::cast;
use cloudsim_core::context::SimulationContext;
use cloudsim_core::event::Event;
use cloudsim_core::handler::EventHandler;
use cloudsim_core::tick::{ListenerId, Listeners, TickInfo};
use cloudsim_core::Id;
use cloudsim_core::{log_debug, log_error, log_info, log_trace, log_warn};

use crate::core::allocation_policy::VmAllocationPolicy;
use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::{CloudletId, HostId, SimError, VmId};
use crate::core::config::SimulationConfig;
use crate::core::events::cloudlet::{CloudletCancel, CloudletFinished, CloudletPause, CloudletResume, CloudletSubmit};
use crate::core::events::host::{HostPeFailure, PeFailureRequest};
use crate::core::events::vm::{VmCreateRequest, VmCreated, VmCreationFailed, VmDestroyRequest, VmDestroyed, VmProcessingUpdate};
use crate::core::host::Host;
use crate::core::scaling::ScalingDecision;
use crate::core::vm::{Vm, VmStatus};

/// Datacenter places VMs onto hosts, runs cloudlets on VMs and applies VM scaling.
///
/// Hosts, VMs and cloudlets are stored in id-indexed arenas and reference each other by ids.
/// Processing of each running VM is updated by a dedicated event scheduled at the nearest cloudlet completion
/// or after the scheduling interval, whichever is sooner. On every clock tick processing of all VMs is updated,
/// then scaling controllers are evaluated and waiting VMs are retried.
pub struct Datacenter {
    hosts: BTreeMap<HostId, Host>,
    vms: BTreeMap<VmId, Vm>,
    cloudlets: BTreeMap<CloudletId, Cloudlet>,
    waiting_vms: Vec<VmId>,
    allocation_policy: Box<dyn VmAllocationPolicy>,
    vm_created_listeners: Listeners<dyn FnMut(&Vm)>,
    cloudlet_finished_listeners: Listeners<dyn FnMut(&Cloudlet)>,
    next_host_id: HostId,
    next_vm_id: VmId,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Datacenter {
    pub fn new(
        allocation_policy: Box<dyn VmAllocationPolicy>,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        Self {
            hosts: BTreeMap::new(),
            vms: BTreeMap::new(),
            cloudlets: BTreeMap::new(),
            waiting_vms: Vec::new(),
            allocation_policy,
            vm_created_listeners: Listeners::new(),
            cloudlet_finished_listeners: Listeners::new(),
            next_host_id: 0,
            next_vm_id: 0,
            ctx,
            sim_config,
        }
    }

    /// Returns the component id of datacenter.
    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Adds host with identical PEs, returns its id.
    pub fn add_host(&mut self, name: &str, pes: u64, pe_mips: u64, ram: u64, bw: u64, storage: u64) -> HostId {
        let id = self.next_host_id;
        self.next_host_id += 1;
        self.hosts.insert(id, Host::new(id, name, pes, pe_mips, ram, bw, storage));
        log_debug!(
            self.ctx,
            "added host: {}",
            json!({"id": id, "name": name, "pes": pes, "pe_mips": pe_mips, "ram": ram, "bw": bw, "storage": storage})
        );
        id
    }

    pub fn set_allocation_policy(&mut self, allocation_policy: Box<dyn VmAllocationPolicy>) {
        self.allocation_policy = allocation_policy;
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn hosts(&self) -> &BTreeMap<HostId, Host> {
        &self.hosts
    }

    pub fn vm(&self, id: VmId) -> Option<&Vm> {
        self.vms.get(&id)
    }

    pub fn vms(&self) -> &BTreeMap<VmId, Vm> {
        &self.vms
    }

    pub fn cloudlet(&self, id: CloudletId) -> Option<&Cloudlet> {
        self.cloudlets.get(&id)
    }

    pub fn cloudlets(&self) -> &BTreeMap<CloudletId, Cloudlet> {
        &self.cloudlets
    }

    /// Returns VMs waiting for placement in submission order.
    pub fn waiting_vms(&self) -> &[VmId] {
        &self.waiting_vms
    }

    /// Returns the id which is not used by any VM known to datacenter.
    ///
    /// VMs created by horizontal scaling take their ids from here, so a later submission
    /// of a VM with such id is rejected as a duplicate.
    pub fn next_vm_id(&self) -> VmId {
        self.next_vm_id
    }

    /// Selects host for the VM using the allocation policy.
    pub fn allocate_host_for_vm(&self, vm: &Vm) -> Result<HostId, SimError> {
        self.allocation_policy
            .select_host(vm, &self.hosts)
            .ok_or(SimError::NoSuitableHost { vm_id: vm.id() })
    }

    /// Subscribes the listener to VM creation.
    ///
    /// Listeners are invoked while the datacenter is borrowed, so they must not access it.
    pub fn add_vm_created_listener<F: FnMut(&Vm) + 'static>(&mut self, listener: F) -> ListenerId {
        self.vm_created_listeners.add(Box::new(listener))
    }

    pub fn remove_vm_created_listener(&mut self, id: ListenerId) -> bool {
        self.vm_created_listeners.remove(id)
    }

    /// Subscribes the listener to cloudlet completion (both successful and failed).
    ///
    /// Listeners are invoked while the datacenter is borrowed, so they must not access it.
    pub fn add_cloudlet_finished_listener<F: FnMut(&Cloudlet) + 'static>(&mut self, listener: F) -> ListenerId {
        self.cloudlet_finished_listeners.add(Box::new(listener))
    }

    pub fn remove_cloudlet_finished_listener(&mut self, id: ListenerId) -> bool {
        self.cloudlet_finished_listeners.remove(id)
    }

    /// Performs periodic processing on clock tick.
    pub fn on_clock_tick(&mut self, tick: &TickInfo) {
        log_trace!(self.ctx, "clock tick #{}", tick.index);
        let host_ids: Vec<HostId> = self.hosts.keys().copied().collect();
        for host_id in host_ids {
            self.refresh_host(host_id);
        }
        for host_id in self.process_vertical_scaling(tick.index) {
            self.refresh_host(host_id);
        }
        self.process_horizontal_scaling(tick.index);
        self.retry_waiting_vms();
        self.fail_timed_out_vms();
    }

    fn on_vm_create_request(&mut self, mut vm: Vm) {
        let vm_id = vm.id();
        if self.vms.contains_key(&vm_id) {
            log_error!(self.ctx, "vm #{} already exists", vm_id);
            self.ctx.emit_now(VmCreationFailed { vm_id }, vm.broker());
            return;
        }
        self.next_vm_id = self.next_vm_id.max(vm_id + 1);
        vm.mark_submitted(self.ctx.time());
        let could_ever_be_placed = self.hosts.values().any(|host| host.could_ever_host(&vm));
        self.vms.insert(vm_id, vm);

        if self.try_create_vm(vm_id) {
            return;
        }
        if could_ever_be_placed {
            log_debug!(self.ctx, "no suitable host for vm #{} now, vm is waiting", vm_id);
            self.waiting_vms.push(vm_id);
        } else {
            self.fail_vm(vm_id, "no host can accommodate it");
        }
    }

    fn try_create_vm(&mut self, vm_id: VmId) -> bool {
        let now = self.ctx.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return false,
        };
        let host_id = match self.allocation_policy.select_host(vm, &self.hosts) {
            Some(host_id) => host_id,
            None => return false,
        };
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => return false,
        };
        if let Err(e) = host.create_vm(vm) {
            log_warn!(self.ctx, "failed to create vm #{} on host #{}: {}", vm_id, host_id, e);
            return false;
        }
        vm.mark_created(host_id, now);
        log_debug!(
            self.ctx,
            "vm created: {}",
            json!({"vm_id": vm_id, "host_id": host_id, "pes": vm.pes(), "mips": vm.mips()})
        );
        for listener in self.vm_created_listeners.iter_mut() {
            listener(&*vm);
        }
        self.ctx.emit_now(VmCreated { vm_id, host_id }, vm.broker());
        log_trace!(self.ctx, "host state: {}", json!(host.state()));
        self.refresh_host(host_id);
        true
    }

    fn fail_vm(&mut self, vm_id: VmId, reason: &str) {
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.set_status(VmStatus::Failed);
            log_warn!(self.ctx, "vm #{} failed: {}", vm_id, reason);
            self.ctx.emit_now(VmCreationFailed { vm_id }, vm.broker());
        }
    }

    fn retry_waiting_vms(&mut self) {
        for vm_id in mem::take(&mut self.waiting_vms) {
            if self.vms.get(&vm_id).map(|vm| vm.status()) != Some(VmStatus::Waiting) {
                continue;
            }
            if !self.try_create_vm(vm_id) {
                self.waiting_vms.push(vm_id);
            }
        }
    }

    fn fail_timed_out_vms(&mut self) {
        let now = self.ctx.time();
        let timeout = self.sim_config.vm_allocation_timeout;
        let (expired, waiting): (Vec<VmId>, Vec<VmId>) =
            mem::take(&mut self.waiting_vms).into_iter().partition(|vm_id| {
                self.vms
                    .get(vm_id)
                    .and_then(|vm| vm.submission_time())
                    .map_or(false, |submitted| now - submitted > timeout)
            });
        self.waiting_vms = waiting;
        for vm_id in expired {
            self.fail_vm(vm_id, "allocation timeout");
        }
    }

    /// Recomputes PE shares on the host and updates processing of its VMs.
    fn refresh_host(&mut self, host_id: HostId) {
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => return,
        };
        let grants = host.update_vm_allocations(&self.vms);
        let vm_ids = host.vms().to_vec();
        for (vm_id, granted) in grants {
            if let Some(vm) = self.vms.get_mut(&vm_id) {
                vm.set_granted_mips(granted);
            }
        }
        for vm_id in vm_ids {
            self.update_vm_processing(vm_id);
        }
    }

    fn update_vm_processing(&mut self, vm_id: VmId) {
        let now = self.ctx.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) if vm.status() == VmStatus::Running => vm,
            _ => return,
        };
        let update = vm.update_processing(now, &mut self.cloudlets);
        let broker = vm.broker();
        for cloudlet_id in update.finished {
            self.notify_cloudlet_finished(cloudlet_id, vm_id, broker);
        }
        self.schedule_next_update(vm_id, update.next_completion);
    }

    fn notify_cloudlet_finished(&mut self, cloudlet_id: CloudletId, vm_id: VmId, broker: Id) {
        if let Some(cloudlet) = self.cloudlets.get(&cloudlet_id) {
            log_debug!(
                self.ctx,
                "cloudlet finished: {}",
                json!({"cloudlet_id": cloudlet_id, "vm_id": vm_id, "status": cloudlet.status()})
            );
            for listener in self.cloudlet_finished_listeners.iter_mut() {
                listener(cloudlet);
            }
            self.ctx.emit_now(
                CloudletFinished {
                    cloudlet_id,
                    vm_id,
                    status: cloudlet.status(),
                },
                broker,
            );
        }
    }

    fn schedule_next_update(&mut self, vm_id: VmId, next_completion: Option<f64>) {
        let now = self.ctx.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return,
        };
        if let Some(event_id) = vm.next_update_event.take() {
            self.ctx.cancel_event(event_id);
        }
        // an update leaving nothing running has emptied the waiting queue too
        if vm.status() != VmStatus::Running || vm.cloudlet_scheduler().running().is_empty() {
            return;
        }
        let interval = self.sim_config.scheduling_interval;
        let delay = next_completion
            .map_or(interval, |time| (time - now).min(interval))
            .max(self.sim_config.min_time_between_events);
        vm.next_update_event = Some(self.ctx.emit_self(VmProcessingUpdate { vm_id }, delay));
    }

    fn process_vertical_scaling(&mut self, tick: u64) -> BTreeSet<HostId> {
        let mut affected_hosts = BTreeSet::new();
        let vm_ids: Vec<VmId> = self
            .vms
            .values()
            .filter(|vm| vm.status() == VmStatus::Running && !vm.vertical_scalings.is_empty())
            .map(|vm| vm.id())
            .collect();
        for vm_id in vm_ids {
            let vm = match self.vms.get_mut(&vm_id) {
                Some(vm) => vm,
                None => continue,
            };
            let host_id = match vm.host() {
                Some(host_id) => host_id,
                None => continue,
            };
            let mut scalings = mem::take(&mut vm.vertical_scalings);
            for scaling in scalings.iter_mut() {
                let kind = scaling.kind();
                let current = vm.capacity(kind);
                let utilization = vm.utilization(kind);
                let requested = match scaling.evaluate(tick, vm) {
                    ScalingDecision::None => continue,
                    ScalingDecision::Up(amount) => current + amount,
                    ScalingDecision::Down(amount) => current.saturating_sub(amount).max(vm.original_capacity(kind)),
                };
                let host = match self.hosts.get_mut(&host_id) {
                    Some(host) => host,
                    None => continue,
                };
                match host.scale_vm_resource(vm, kind, requested) {
                    Ok(granted) => {
                        log_info!(
                            self.ctx,
                            "vm #{} {} utilization {:.2}, scaled from {} to {} (requested {})",
                            vm_id,
                            kind,
                            utilization,
                            current,
                            granted,
                            requested
                        );
                        if granted != current {
                            affected_hosts.insert(host_id);
                        }
                    }
                    Err(e) => {
                        log_warn!(self.ctx, "failed to scale {} of vm #{}: {}", kind, vm_id, e);
                    }
                }
            }
            vm.vertical_scalings = scalings;
        }
        affected_hosts
    }

    fn process_horizontal_scaling(&mut self, tick: u64) {
        let vm_ids: Vec<VmId> = self
            .vms
            .values()
            .filter(|vm| vm.status() == VmStatus::Running && vm.horizontal_scaling.is_some())
            .map(|vm| vm.id())
            .collect();
        for vm_id in vm_ids {
            let mut scaling = match self.vms.get_mut(&vm_id).and_then(|vm| vm.horizontal_scaling.take()) {
                Some(scaling) => scaling,
                None => continue,
            };
            let last_status = scaling
                .last_requested()
                .and_then(|id| self.vms.get(&id))
                .map(|vm| vm.status());
            let (should_scale, broker) = match self.vms.get(&vm_id) {
                Some(vm) => (scaling.should_scale(tick, vm, last_status), vm.broker()),
                None => (false, 0),
            };
            if should_scale {
                let new_vm_id = self.next_vm_id;
                self.next_vm_id += 1;
                let mut new_vm = scaling.create_vm(new_vm_id);
                new_vm.set_broker(broker);
                log_info!(self.ctx, "vm #{} is overloaded, requesting vm #{}", vm_id, new_vm.id());
                self.on_vm_create_request(new_vm);
            }
            if let Some(vm) = self.vms.get_mut(&vm_id) {
                vm.horizontal_scaling = Some(scaling);
            }
        }
    }

    fn on_vm_destroy_request(&mut self, vm_id: VmId) {
        let now = self.ctx.time();
        match self.vms.get(&vm_id).map(|vm| vm.status()) {
            Some(VmStatus::Running) => {
                self.update_vm_processing(vm_id);
                let vm = match self.vms.get_mut(&vm_id) {
                    Some(vm) => vm,
                    None => return,
                };
                let canceled = vm.cancel_all_cloudlets(now, &mut self.cloudlets);
                if let Some(event_id) = vm.next_update_event.take() {
                    self.ctx.cancel_event(event_id);
                }
                let host_id = vm.host();
                if let Some(host) = host_id.and_then(|id| self.hosts.get_mut(&id)) {
                    host.destroy_vm(vm);
                }
                vm.mark_destroyed(now);
                let broker = vm.broker();
                log_debug!(self.ctx, "vm #{} destroyed", vm_id);
                for cloudlet_id in canceled {
                    self.notify_cloudlet_finished(cloudlet_id, vm_id, broker);
                }
                self.ctx.emit_now(VmDestroyed { vm_id }, broker);
                if let Some(host_id) = host_id {
                    self.refresh_host(host_id);
                }
                self.retry_waiting_vms();
            }
            Some(VmStatus::Waiting) => {
                self.waiting_vms.retain(|&id| id != vm_id);
                if let Some(vm) = self.vms.get_mut(&vm_id) {
                    vm.mark_destroyed(now);
                    self.ctx.emit_now(VmDestroyed { vm_id }, vm.broker());
                }
            }
            Some(status) => {
                log_warn!(self.ctx, "can't destroy vm #{} with status {}", vm_id, status);
            }
            None => {
                log_error!(self.ctx, "{}", SimError::VmNotFound(vm_id));
            }
        }
    }

    fn on_cloudlet_submit(&mut self, mut cloudlet: Cloudlet, src: Id) {
        let now = self.ctx.time();
        let cloudlet_id = cloudlet.id();
        if self.cloudlets.contains_key(&cloudlet_id) {
            log_error!(self.ctx, "cloudlet #{} already exists", cloudlet_id);
            return;
        }
        let vm_id = cloudlet.vm();
        let running = vm_id
            .and_then(|id| self.vms.get(&id))
            .map_or(false, |vm| vm.status() == VmStatus::Running);
        let vm_id = match vm_id {
            Some(vm_id) if running => vm_id,
            _ => {
                log_warn!(self.ctx, "cloudlet #{} is not bound to a running vm", cloudlet_id);
                cloudlet.finish(CloudletStatus::Failed, now);
                self.cloudlets.insert(cloudlet_id, cloudlet);
                self.notify_cloudlet_finished(cloudlet_id, vm_id.unwrap_or_default(), src);
                return;
            }
        };

        self.update_vm_processing(vm_id);
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.submit_cloudlet(&mut cloudlet, now);
        }
        log_debug!(self.ctx, "cloudlet #{} submitted to vm #{}", cloudlet_id, vm_id);
        self.cloudlets.insert(cloudlet_id, cloudlet);
        self.update_vm_processing(vm_id);
    }

    fn on_cloudlet_pause(&mut self, cloudlet_id: CloudletId) {
        let vm_id = match self.cloudlets.get(&cloudlet_id).and_then(|c| c.vm()) {
            Some(vm_id) => vm_id,
            None => {
                log_warn!(self.ctx, "{}", SimError::CloudletNotFound(cloudlet_id));
                return;
            }
        };
        self.update_vm_processing(vm_id);
        let paused = match (self.vms.get_mut(&vm_id), self.cloudlets.get_mut(&cloudlet_id)) {
            (Some(vm), Some(cloudlet)) => vm.pause_cloudlet(cloudlet),
            _ => false,
        };
        if paused {
            log_debug!(self.ctx, "cloudlet #{} paused", cloudlet_id);
            self.update_vm_processing(vm_id);
        }
    }

    fn on_cloudlet_resume(&mut self, cloudlet_id: CloudletId) {
        let now = self.ctx.time();
        let vm_id = match self.cloudlets.get(&cloudlet_id).and_then(|c| c.vm()) {
            Some(vm_id) => vm_id,
            None => {
                log_warn!(self.ctx, "{}", SimError::CloudletNotFound(cloudlet_id));
                return;
            }
        };
        let resumed = match (self.vms.get_mut(&vm_id), self.cloudlets.get_mut(&cloudlet_id)) {
            (Some(vm), Some(cloudlet)) if vm.status() == VmStatus::Running => vm.resume_cloudlet(cloudlet, now),
            _ => false,
        };
        if resumed {
            log_debug!(self.ctx, "cloudlet #{} resumed", cloudlet_id);
            self.update_vm_processing(vm_id);
        }
    }

    fn on_cloudlet_cancel(&mut self, cloudlet_id: CloudletId) {
        let now = self.ctx.time();
        let vm_id = match self.cloudlets.get(&cloudlet_id).and_then(|c| c.vm()) {
            Some(vm_id) => vm_id,
            None => {
                log_warn!(self.ctx, "{}", SimError::CloudletNotFound(cloudlet_id));
                return;
            }
        };
        self.update_vm_processing(vm_id);
        let (canceled, broker) = match (self.vms.get_mut(&vm_id), self.cloudlets.get_mut(&cloudlet_id)) {
            (Some(vm), Some(cloudlet)) => (vm.cancel_cloudlet(cloudlet, now), vm.broker()),
            _ => (false, 0),
        };
        if canceled {
            self.notify_cloudlet_finished(cloudlet_id, vm_id, broker);
            self.update_vm_processing(vm_id);
        }
    }

    fn on_pe_failure_request(&mut self, host_id: HostId, pe: usize) {
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => {
                log_error!(self.ctx, "{}", SimError::HostNotFound(host_id));
                return;
            }
        };
        match host.fail_pe(pe) {
            Ok(vm_ids) => {
                log_warn!(self.ctx, "{}", SimError::HostPeFailure { host_id, pe });
                let mut by_broker: BTreeMap<Id, Vec<VmId>> = BTreeMap::new();
                for vm_id in vm_ids {
                    if let Some(vm) = self.vms.get(&vm_id) {
                        by_broker.entry(vm.broker()).or_default().push(vm_id);
                    }
                }
                for (broker, vm_ids) in by_broker {
                    self.ctx.emit_now(HostPeFailure { host_id, pe, vm_ids }, broker);
                }
                self.refresh_host(host_id);
                if let Some(host) = self.hosts.get(&host_id) {
                    log_debug!(self.ctx, "host state: {}", json!(host.state()));
                }
            }
            Err(e) => {
                log_error!(self.ctx, "{}", e);
            }
        }
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        let src = event.src;
        cast!(match event.data {
            VmCreateRequest { vm } => {
                self.on_vm_create_request(vm);
            }
            VmDestroyRequest { vm_id } => {
                self.on_vm_destroy_request(vm_id);
            }
            VmProcessingUpdate { vm_id } => {
                if let Some(vm) = self.vms.get_mut(&vm_id) {
                    vm.next_update_event = None;
                }
                self.update_vm_processing(vm_id);
            }
            CloudletSubmit { cloudlet } => {
                self.on_cloudlet_submit(cloudlet, src);
            }
            CloudletPause { cloudlet_id } => {
                self.on_cloudlet_pause(cloudlet_id);
            }
            CloudletResume { cloudlet_id } => {
                self.on_cloudlet_resume(cloudlet_id);
            }
            CloudletCancel { cloudlet_id } => {
                self.on_cloudlet_cancel(cloudlet_id);
            }
            PeFailureRequest { host_id, pe } => {
                self.on_pe_failure_request(host_id, pe);
            }
        })
    }
}
