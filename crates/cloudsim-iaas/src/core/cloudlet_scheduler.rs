//! Scheduling of VM capacity among cloudlets.

use std::collections::{BTreeMap, VecDeque};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::common::CloudletId;
use crate::core::provisioner::{ResourceProvisioner, SimpleProvisioner};
use crate::core::sharing::water_fill;

/// VM capacity available to the cloudlet scheduler during an update.
pub struct VmCapacity<'a> {
    /// Current number of VM PEs.
    pub pes: u64,
    /// Requested MIPS of a single VM PE.
    pub mips: u64,
    /// MIPS granted by the host to each VM PE.
    pub granted_mips: &'a [u64],
    pub ram: &'a mut SimpleProvisioner<CloudletId>,
    pub bw: &'a mut SimpleProvisioner<CloudletId>,
}

/// Result of a processing update.
#[derive(Debug, Default)]
pub struct ProcessingUpdate {
    /// Cloudlets completed during this update.
    pub finished: Vec<CloudletId>,
    /// Estimated time of the next cloudlet completion.
    pub next_completion: Option<f64>,
    /// Total MIPS granted to running cloudlets.
    pub used_mips: f64,
}

/// Trait for implementation of cloudlet schedulers.
///
/// The scheduler only keeps cloudlet ids, cloudlets themselves are stored in the datacenter.
pub trait CloudletScheduler {
    /// Accepts the cloudlet for execution. The cloudlet starts on the next processing update if there is capacity.
    fn submit(&mut self, cloudlet: &mut Cloudlet, time: f64);

    /// Accounts the progress since the previous update, starts waiting cloudlets and redistributes VM capacity.
    fn update_processing(
        &mut self,
        time: f64,
        vm: VmCapacity,
        cloudlets: &mut BTreeMap<CloudletId, Cloudlet>,
    ) -> ProcessingUpdate;

    /// Suspends the cloudlet, returns `false` if it is not waiting or running.
    fn pause(&mut self, cloudlet: &mut Cloudlet, vm: VmCapacity) -> bool;

    /// Puts the paused cloudlet back into the waiting queue, returns `false` if it is not paused.
    fn resume(&mut self, cloudlet: &mut Cloudlet, time: f64) -> bool;

    /// Removes the cloudlet marking it as failed, returns `false` if it is not managed by the scheduler.
    fn cancel(&mut self, cloudlet: &mut Cloudlet, time: f64, vm: VmCapacity) -> bool;

    fn running(&self) -> Vec<CloudletId>;

    fn waiting(&self) -> Vec<CloudletId>;

    fn paused(&self) -> Vec<CloudletId>;

    /// Checks whether there are no unfinished cloudlets.
    fn is_empty(&self) -> bool;
}

/// Time-shared cloudlet scheduler.
///
/// A waiting cloudlet is started if the total number of PEs of running cloudlets including it
/// does not exceed the number of VM PEs, or if nothing is running. Waiting cloudlets are started in FIFO order.
/// The VM capacity is shared among running cloudlets by water-filling.
#[derive(Default)]
pub struct CloudletSchedulerTimeShared {
    waiting: VecDeque<CloudletId>,
    running: Vec<CloudletId>,
    paused: Vec<CloudletId>,
    last_update: Option<f64>,
}

impl CloudletSchedulerTimeShared {
    pub fn new() -> Self {
        Self::default()
    }

    fn release(cloudlet_id: CloudletId, vm: &mut VmCapacity) {
        vm.ram.deallocate(cloudlet_id);
        vm.bw.deallocate(cloudlet_id);
    }

    fn allocate_capped(ledger: &mut SimpleProvisioner<CloudletId>, cloudlet_id: CloudletId, utilization: f64) {
        let requested = (utilization * ledger.capacity() as f64).round() as u64;
        let amount = requested.min(ledger.available() + ledger.allocated_for(cloudlet_id));
        if amount == 0 {
            ledger.deallocate(cloudlet_id);
        } else {
            ledger.allocate(cloudlet_id, amount);
        }
    }
}

impl CloudletScheduler for CloudletSchedulerTimeShared {
    fn submit(&mut self, cloudlet: &mut Cloudlet, time: f64) {
        cloudlet.set_waiting(time);
        self.waiting.push_back(cloudlet.id());
    }

    fn update_processing(
        &mut self,
        time: f64,
        mut vm: VmCapacity,
        cloudlets: &mut BTreeMap<CloudletId, Cloudlet>,
    ) -> ProcessingUpdate {
        let mut update = ProcessingUpdate::default();
        let elapsed = self.last_update.map_or(0., |last| (time - last).max(0.));
        self.last_update = Some(time);

        // progress of running cloudlets
        let mut still_running = Vec::with_capacity(self.running.len());
        for &id in &self.running {
            let cloudlet = match cloudlets.get_mut(&id) {
                Some(cloudlet) => cloudlet,
                None => continue,
            };
            if cloudlet.advance(elapsed) {
                cloudlet.finish(CloudletStatus::Success, time);
                Self::release(id, &mut vm);
                update.finished.push(id);
            } else {
                still_running.push(id);
            }
        }
        self.running = still_running;

        // admission of waiting cloudlets
        let mut used_pes: u64 = self
            .running
            .iter()
            .filter_map(|id| cloudlets.get(id))
            .map(|c| c.pes())
            .sum();
        while let Some(&id) = self.waiting.front() {
            let cloudlet = match cloudlets.get_mut(&id) {
                Some(cloudlet) => cloudlet,
                None => {
                    self.waiting.pop_front();
                    continue;
                }
            };
            // a cloudlet wider than the VM starts alone and shares the VM PEs
            if used_pes + cloudlet.pes() > vm.pes && !self.running.is_empty() {
                break;
            }
            used_pes += cloudlet.pes();
            cloudlet.set_in_exec(time);
            self.waiting.pop_front();
            self.running.push(id);
        }

        // sharing of VM capacity
        let capacity: f64 = vm.granted_mips.iter().map(|&m| m as f64).sum();
        let requests: Vec<(CloudletId, f64)> = self
            .running
            .iter()
            .filter_map(|id| cloudlets.get(id))
            .map(|c| {
                let request = (c.pes() * vm.mips) as f64 * c.cpu_utilization(time);
                (c.id(), request)
            })
            .collect();
        let grants = water_fill(capacity, &requests);
        for (&(id, _), grant) in requests.iter().zip(grants) {
            if let Some(cloudlet) = cloudlets.get_mut(&id) {
                cloudlet.set_granted_mips(grant);
                update.used_mips += grant;
                if grant > 0. {
                    let eta = time + cloudlet.remaining_length() / grant;
                    update.next_completion = Some(update.next_completion.map_or(eta, |t: f64| t.min(eta)));
                }
                Self::allocate_capped(vm.ram, id, cloudlet.ram_utilization(time));
                Self::allocate_capped(vm.bw, id, cloudlet.bw_utilization(time));
            }
        }
        update
    }

    fn pause(&mut self, cloudlet: &mut Cloudlet, mut vm: VmCapacity) -> bool {
        let id = cloudlet.id();
        let was_running = self.running.contains(&id);
        let was_waiting = self.waiting.contains(&id);
        if !was_running && !was_waiting {
            return false;
        }
        self.running.retain(|&c| c != id);
        self.waiting.retain(|&c| c != id);
        Self::release(id, &mut vm);
        cloudlet.set_paused();
        self.paused.push(id);
        true
    }

    fn resume(&mut self, cloudlet: &mut Cloudlet, time: f64) -> bool {
        let id = cloudlet.id();
        if !self.paused.contains(&id) {
            return false;
        }
        self.paused.retain(|&c| c != id);
        cloudlet.set_waiting(time);
        self.waiting.push_back(id);
        true
    }

    fn cancel(&mut self, cloudlet: &mut Cloudlet, time: f64, mut vm: VmCapacity) -> bool {
        let id = cloudlet.id();
        let known = self.running.contains(&id) || self.waiting.contains(&id) || self.paused.contains(&id);
        if !known {
            return false;
        }
        self.running.retain(|&c| c != id);
        self.waiting.retain(|&c| c != id);
        self.paused.retain(|&c| c != id);
        Self::release(id, &mut vm);
        cloudlet.finish(CloudletStatus::Failed, time);
        true
    }

    fn running(&self) -> Vec<CloudletId> {
        self.running.clone()
    }

    fn waiting(&self) -> Vec<CloudletId> {
        self.waiting.iter().copied().collect()
    }

    fn paused(&self) -> Vec<CloudletId> {
        self.paused.clone()
    }

    fn is_empty(&self) -> bool {
        self.running.is_empty() && self.waiting.is_empty() && self.paused.is_empty()
    }
}
