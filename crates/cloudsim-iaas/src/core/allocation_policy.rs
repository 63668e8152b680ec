//! VM allocation policies.

use std::collections::BTreeMap;

use crate::core::common::{HostId, SimError};
use crate::core::host::Host;
use crate::core::vm::Vm;

/// Trait for implementation of VM allocation policies.
///
/// The policy is defined as a function of VM and current hosts state, which returns an ID of host
/// selected for VM placement or `None` if there is no suitable host.
pub trait VmAllocationPolicy {
    fn select_host(&self, vm: &Vm, hosts: &BTreeMap<HostId, Host>) -> Option<HostId>;
}

/// Resolves the policy by its name (`FirstFit`, `BestFit` or `WorstFit`).
pub fn allocation_policy_resolver(config_str: &str) -> Result<Box<dyn VmAllocationPolicy>, SimError> {
    match config_str.trim() {
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        "BestFit" => Ok(Box::new(BestFit::new())),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        _ => Err(SimError::Config(format!("unknown allocation policy: {}", config_str))),
    }
}

fn suitable_hosts<'a>(vm: &'a Vm, hosts: &'a BTreeMap<HostId, Host>) -> impl Iterator<Item = &'a Host> {
    hosts.values().filter(move |host| host.is_suitable_for_vm(vm).is_ok())
}

////////////////////////////////////////////////////////////////////////////////

/// FirstFit policy, which returns the first suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for FirstFit {
    fn select_host(&self, vm: &Vm, hosts: &BTreeMap<HostId, Host>) -> Option<HostId> {
        suitable_hosts(vm, hosts).next().map(|host| host.id())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// BestFit policy, which returns the suitable host with the fewest free PEs.
#[derive(Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for BestFit {
    fn select_host(&self, vm: &Vm, hosts: &BTreeMap<HostId, Host>) -> Option<HostId> {
        let mut result: Option<HostId> = None;
        let mut min_free_pes = u64::MAX;
        for host in suitable_hosts(vm, hosts) {
            if host.free_pes() < min_free_pes {
                min_free_pes = host.free_pes();
                result = Some(host.id());
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

/// WorstFit policy, which returns the suitable host with the most free PEs.
#[derive(Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for WorstFit {
    fn select_host(&self, vm: &Vm, hosts: &BTreeMap<HostId, Host>) -> Option<HostId> {
        let mut result: Option<HostId> = None;
        let mut max_free_pes = 0;
        for host in suitable_hosts(vm, hosts) {
            if result.is_none() || host.free_pes() > max_free_pes {
                max_free_pes = host.free_pes();
                result = Some(host.id());
            }
        }
        result
    }
}
