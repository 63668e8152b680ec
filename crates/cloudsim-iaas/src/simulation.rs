//! Main entry point of the library.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use cloudsim_core::context::SimulationContext;
use cloudsim_core::simulation::Simulation;
use cloudsim_core::tick::{ListenerId, TickInfo};
use cloudsim_core::Id;

use crate::core::allocation_policy::allocation_policy_resolver;
use crate::core::broker::Broker;
use crate::core::cloudlet::Cloudlet;
use crate::core::common::{CloudletId, HostId, SimError, VmId};
use crate::core::config::SimulationConfig;
use crate::core::datacenter::Datacenter;
use crate::core::events::cloudlet::{CloudletCancel, CloudletPause, CloudletResume};
use crate::core::events::host::PeFailureRequest;
use crate::core::events::vm::VmDestroyRequest;
use crate::core::vm::Vm;

/// Cloud datacenter simulation with a single datacenter and any number of brokers.
///
/// Hosts listed in the config are created on construction along with the default broker named `broker`.
pub struct CloudSimulation {
    datacenter: Rc<RefCell<Datacenter>>,
    datacenter_id: Id,
    brokers: BTreeMap<Id, Rc<RefCell<Broker>>>,
    default_broker: Id,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl CloudSimulation {
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Result<Self, SimError> {
        sim_config.validate()?;
        let allocation_policy = allocation_policy_resolver(&sim_config.allocation_policy)?;
        let sim_config = rc!(sim_config);

        let datacenter = rc!(refcell!(Datacenter::new(
            allocation_policy,
            sim.create_context("datacenter"),
            sim_config.clone(),
        )));
        let datacenter_id = sim.add_handler("datacenter", datacenter.clone());

        sim.set_clock_tick_interval(Some(sim_config.scheduling_interval));
        let dc = datacenter.clone();
        sim.add_clock_tick_listener(move |tick| dc.borrow_mut().on_clock_tick(tick));

        let ctx = sim.create_context("simulation");
        let mut cloud_sim = Self {
            datacenter,
            datacenter_id,
            brokers: BTreeMap::new(),
            default_broker: 0,
            sim,
            ctx,
            sim_config: sim_config.clone(),
        };

        for host in sim_config.hosts.iter() {
            let count = host.count.unwrap_or(1);
            for i in 0..count {
                let name = match (&host.name, &host.name_prefix) {
                    (Some(name), _) if count == 1 => name.clone(),
                    (_, Some(prefix)) => format!("{}{}", prefix, i + 1),
                    (Some(name), None) => format!("{}{}", name, i + 1),
                    (None, None) => format!("host{}", i + 1),
                };
                cloud_sim.add_host(&name, host.pes, host.pe_mips, host.ram, host.bw, host.storage);
            }
        }
        cloud_sim.default_broker = cloud_sim.create_broker("broker");
        Ok(cloud_sim)
    }

    /// Adds host with identical PEs to the datacenter, returns its id.
    pub fn add_host(&mut self, name: &str, pes: u64, pe_mips: u64, ram: u64, bw: u64, storage: u64) -> HostId {
        self.datacenter
            .borrow_mut()
            .add_host(name, pes, pe_mips, ram, bw, storage)
    }

    /// Creates a broker component, returns its id.
    pub fn create_broker(&mut self, name: &str) -> Id {
        let broker = rc!(refcell!(Broker::new(
            self.datacenter_id,
            self.sim.create_context(name),
            self.sim_config.clone(),
        )));
        let id = self.sim.add_handler(name, broker.clone());
        self.brokers.insert(id, broker);
        id
    }

    pub fn datacenter(&self) -> Ref<Datacenter> {
        self.datacenter.borrow()
    }

    /// Returns shared handle of the datacenter, e.g. to be captured by listeners.
    pub fn datacenter_handle(&self) -> Rc<RefCell<Datacenter>> {
        self.datacenter.clone()
    }

    pub fn datacenter_mut(&self) -> RefMut<Datacenter> {
        self.datacenter.borrow_mut()
    }

    pub fn datacenter_id(&self) -> Id {
        self.datacenter_id
    }

    /// Returns the default broker.
    pub fn broker(&self) -> Rc<RefCell<Broker>> {
        self.brokers[&self.default_broker].clone()
    }

    pub fn broker_by_id(&self, id: Id) -> Option<Rc<RefCell<Broker>>> {
        self.brokers.get(&id).cloned()
    }

    /// Submits VMs via the default broker.
    pub fn submit_vm_list(&mut self, vms: Vec<Vm>) {
        self.broker().borrow_mut().submit_vm_list(vms);
    }

    /// Submits cloudlets via the default broker.
    pub fn submit_cloudlet_list(&mut self, cloudlets: Vec<Cloudlet>) {
        self.broker().borrow_mut().submit_cloudlet_list(cloudlets);
    }

    pub fn destroy_vm(&mut self, vm_id: VmId) {
        self.ctx.emit_now(VmDestroyRequest { vm_id }, self.datacenter_id);
    }

    pub fn pause_cloudlet(&mut self, cloudlet_id: CloudletId) {
        self.ctx.emit_now(CloudletPause { cloudlet_id }, self.datacenter_id);
    }

    pub fn resume_cloudlet(&mut self, cloudlet_id: CloudletId) {
        self.ctx.emit_now(CloudletResume { cloudlet_id }, self.datacenter_id);
    }

    pub fn cancel_cloudlet(&mut self, cloudlet_id: CloudletId) {
        self.ctx.emit_now(CloudletCancel { cloudlet_id }, self.datacenter_id);
    }

    /// Fails the specified PE of the host after the given delay.
    pub fn fail_host_pe(&mut self, host_id: HostId, pe: usize, delay: f64) {
        self.ctx.emit(PeFailureRequest { host_id, pe }, self.datacenter_id, delay);
    }

    /// Subscribes the listener to clock ticks.
    ///
    /// The listener is invoked after the datacenter has processed the tick.
    pub fn add_clock_tick_listener<F: FnMut(&TickInfo) + 'static>(&mut self, listener: F) -> ListenerId {
        self.sim.add_clock_tick_listener(listener)
    }

    pub fn remove_clock_tick_listener(&mut self, id: ListenerId) -> bool {
        self.sim.remove_clock_tick_listener(id)
    }

    pub fn add_vm_created_listener<F: FnMut(&Vm) + 'static>(&mut self, listener: F) -> ListenerId {
        self.datacenter.borrow_mut().add_vm_created_listener(listener)
    }

    pub fn remove_vm_created_listener(&mut self, id: ListenerId) -> bool {
        self.datacenter.borrow_mut().remove_vm_created_listener(id)
    }

    pub fn add_cloudlet_finished_listener<F: FnMut(&Cloudlet) + 'static>(&mut self, listener: F) -> ListenerId {
        self.datacenter.borrow_mut().add_cloudlet_finished_listener(listener)
    }

    pub fn remove_cloudlet_finished_listener(&mut self, id: ListenerId) -> bool {
        self.datacenter.borrow_mut().remove_cloudlet_finished_listener(id)
    }

    /// Returns the main simulation context.
    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    /// Performs the next step of simulation.
    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Performs the specified number of steps through the simulation.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Steps through the simulation with duration limit.
    pub fn step_for_duration(&mut self, time: f64) -> bool {
        self.sim.step_for_duration(time)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Steps through the simulation until the specified time.
    pub fn run_until(&mut self, time: f64) -> bool {
        self.sim.run_until(time)
    }

    /// Stops the simulation at the specified time.
    pub fn terminate_at(&mut self, time: f64) {
        self.sim.terminate_at(time);
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }
}
