//! Vertical and horizontal VM scaling.

use serde::Serialize;

use crate::core::common::VmId;
use crate::core::resource::ResourceKind;
use crate::core::vm::{Vm, VmStatus};

/// Strategy computing the amount by which a VM resource is scaled.
///
/// Amounts are measured in PEs for CPU and in resource units for other resources.
pub enum ResourceScaling {
    /// Scales by `ceil(factor * capacity)`, at least by one unit.
    Gradual,
    /// Scales by the amount which brings the utilization right to the violated threshold.
    Instantaneous,
    /// Scales by the amount returned by the function of scaling factor and current capacity.
    Custom(Box<dyn Fn(f64, u64) -> u64>),
}

impl ResourceScaling {
    /// Computes the scaling amount given the current capacity, the used amount and the violated threshold.
    pub fn amount(&self, factor: f64, capacity: u64, used: f64, threshold: f64) -> u64 {
        match self {
            ResourceScaling::Gradual => ((factor * capacity as f64).ceil() as u64).max(1),
            ResourceScaling::Instantaneous => {
                if threshold <= 0. {
                    return 0;
                }
                let target = (used / threshold).ceil() as u64;
                target.abs_diff(capacity)
            }
            ResourceScaling::Custom(f) => f(factor, capacity),
        }
    }
}

/// State of a scaling controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScalingState {
    Idle,
    Evaluating,
    ActionTaken,
}

/// Action requested by a vertical scaling controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingDecision {
    None,
    /// Grow the resource by the given amount.
    Up(u64),
    /// Shrink the resource by the given amount.
    Down(u64),
}

/// Vertical scaling of a single VM resource.
///
/// On each clock tick the controller compares the resource utilization with the thresholds:
/// above the upper threshold the resource is grown, below the lower threshold it is shrunk,
/// but never below the capacity the VM was created with.
pub struct VerticalVmScaling {
    kind: ResourceKind,
    factor: f64,
    lower_threshold: Box<dyn Fn(&Vm) -> f64>,
    upper_threshold: Box<dyn Fn(&Vm) -> f64>,
    resource_scaling: ResourceScaling,
    state: ScalingState,
    last_tick: Option<u64>,
}

impl VerticalVmScaling {
    /// Creates controller with thresholds `0` and `1`, i.e. which never triggers until thresholds are set.
    pub fn new(kind: ResourceKind, factor: f64) -> Self {
        Self {
            kind,
            factor,
            lower_threshold: Box::new(|_| 0.),
            upper_threshold: Box::new(|_| 1.),
            resource_scaling: ResourceScaling::Gradual,
            state: ScalingState::Idle,
            last_tick: None,
        }
    }

    pub fn with_lower_threshold<F: Fn(&Vm) -> f64 + 'static>(mut self, f: F) -> Self {
        self.lower_threshold = Box::new(f);
        self
    }

    pub fn with_upper_threshold<F: Fn(&Vm) -> f64 + 'static>(mut self, f: F) -> Self {
        self.upper_threshold = Box::new(f);
        self
    }

    /// Sets thresholds which do not depend on the VM state.
    pub fn with_static_thresholds(self, lower: f64, upper: f64) -> Self {
        self.with_lower_threshold(move |_| lower)
            .with_upper_threshold(move |_| upper)
    }

    pub fn with_resource_scaling(mut self, resource_scaling: ResourceScaling) -> Self {
        self.resource_scaling = resource_scaling;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn state(&self) -> ScalingState {
        self.state
    }

    /// Evaluates the VM state at the given clock tick.
    ///
    /// The controller is evaluated at most once per tick, repeated calls with the same tick return no action.
    pub fn evaluate(&mut self, tick: u64, vm: &Vm) -> ScalingDecision {
        if self.last_tick == Some(tick) {
            return ScalingDecision::None;
        }
        self.last_tick = Some(tick);
        self.state = ScalingState::Evaluating;

        let capacity = vm.capacity(self.kind);
        let original = vm.original_capacity(self.kind);
        let utilization = vm.utilization(self.kind);
        let used = utilization * capacity as f64;

        let upper = (self.upper_threshold)(vm);
        if utilization > upper {
            let amount = self.resource_scaling.amount(self.factor, capacity, used, upper);
            if amount > 0 {
                self.state = ScalingState::ActionTaken;
                return ScalingDecision::Up(amount);
            }
        }
        let lower = (self.lower_threshold)(vm);
        if utilization < lower && capacity > original {
            let amount = self
                .resource_scaling
                .amount(self.factor, capacity, used, lower)
                .min(capacity - original);
            if amount > 0 {
                self.state = ScalingState::ActionTaken;
                return ScalingDecision::Down(amount);
            }
        }
        self.state = ScalingState::Idle;
        ScalingDecision::None
    }
}

/// Horizontal scaling of a VM.
///
/// When the VM is overloaded, a new VM is created from the template and submitted to the datacenter.
/// No new VM is requested while the previously requested one is still waiting for placement.
/// New VMs get the next unused id known to the datacenter and belong to the broker of the scaled VM.
pub struct HorizontalVmScaling {
    overload_predicate: Box<dyn Fn(&Vm) -> bool>,
    vm_supplier: Box<dyn Fn(VmId) -> Vm>,
    max_new_vms: Option<usize>,
    created: usize,
    last_requested: Option<VmId>,
    last_tick: Option<u64>,
    state: ScalingState,
}

impl HorizontalVmScaling {
    pub fn new<P, S>(overload_predicate: P, vm_supplier: S) -> Self
    where
        P: Fn(&Vm) -> bool + 'static,
        S: Fn(VmId) -> Vm + 'static,
    {
        Self {
            overload_predicate: Box::new(overload_predicate),
            vm_supplier: Box::new(vm_supplier),
            max_new_vms: None,
            created: 0,
            last_requested: None,
            last_tick: None,
            state: ScalingState::Idle,
        }
    }

    /// Limits the number of VMs the controller can create.
    pub fn with_max_new_vms(mut self, max_new_vms: usize) -> Self {
        self.max_new_vms = Some(max_new_vms);
        self
    }

    pub fn created_vms(&self) -> usize {
        self.created
    }

    pub fn last_requested(&self) -> Option<VmId> {
        self.last_requested
    }

    pub fn state(&self) -> ScalingState {
        self.state
    }

    /// Checks whether a new VM should be created at the given tick.
    ///
    /// `last_requested_status` is the current status of the VM requested previously.
    pub fn should_scale(&mut self, tick: u64, vm: &Vm, last_requested_status: Option<VmStatus>) -> bool {
        if self.last_tick == Some(tick) {
            return false;
        }
        self.last_tick = Some(tick);
        self.state = ScalingState::Evaluating;
        let budget_left = self.max_new_vms.map_or(true, |max| self.created < max);
        let previous_placed = last_requested_status != Some(VmStatus::Waiting);
        if budget_left && previous_placed && (self.overload_predicate)(vm) {
            self.state = ScalingState::ActionTaken;
            return true;
        }
        self.state = ScalingState::Idle;
        false
    }

    /// Creates a new VM from the template.
    pub fn create_vm(&mut self, id: VmId) -> Vm {
        self.created += 1;
        self.last_requested = Some(id);
        (self.vm_supplier)(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm {
        Vm::new(0, 1000, 2, 1024, 100, 1000)
    }

    #[test]
    fn test_scaling_amounts() {
        assert_eq!(ResourceScaling::Gradual.amount(0.1, 2, 2., 0.8), 1);
        assert_eq!(ResourceScaling::Gradual.amount(0.5, 10, 10., 0.8), 5);
        assert_eq!(ResourceScaling::Instantaneous.amount(0.1, 4, 3., 0.5), 2);
        assert_eq!(ResourceScaling::Instantaneous.amount(0.1, 8, 2., 0.5), 4);
        let custom = ResourceScaling::Custom(Box::new(|factor, capacity| (factor * capacity as f64) as u64 + 3));
        assert_eq!(custom.amount(0.5, 4, 0., 0.), 5);
    }

    #[test]
    fn test_vertical_scaling_once_per_tick() {
        let vm = vm();
        let mut scaling = VerticalVmScaling::new(ResourceKind::Cpu, 0.5).with_upper_threshold(|_| -1.);
        assert_eq!(scaling.evaluate(0, &vm), ScalingDecision::Up(1));
        assert_eq!(scaling.state(), ScalingState::ActionTaken);
        assert_eq!(scaling.evaluate(0, &vm), ScalingDecision::None);
        assert_eq!(scaling.evaluate(1, &vm), ScalingDecision::Up(1));
    }

    #[test]
    fn test_vertical_scaling_keeps_original_capacity() {
        let vm = vm();
        // idle VM is below the lower threshold but has not grown yet
        let mut scaling = VerticalVmScaling::new(ResourceKind::Ram, 0.1).with_static_thresholds(0.5, 0.9);
        assert_eq!(scaling.evaluate(0, &vm), ScalingDecision::None);
        assert_eq!(scaling.state(), ScalingState::Idle);
    }

    #[test]
    fn test_horizontal_scaling_budget() {
        let vm = vm();
        let mut scaling = HorizontalVmScaling::new(|_| true, |id| Vm::new(id, 1000, 1, 512, 100, 100)).with_max_new_vms(1);
        assert!(scaling.should_scale(0, &vm, None));
        let new_vm = scaling.create_vm(5);
        assert_eq!(new_vm.id(), 5);
        assert_eq!(scaling.last_requested(), Some(5));
        assert!(!scaling.should_scale(1, &vm, Some(VmStatus::Running)));
        assert_eq!(scaling.created_vms(), 1);
    }

    #[test]
    fn test_horizontal_scaling_waits_for_previous_vm() {
        let vm = vm();
        let mut scaling = HorizontalVmScaling::new(|_| true, |id| Vm::new(id, 1000, 1, 512, 100, 100));
        assert!(scaling.should_scale(0, &vm, None));
        scaling.create_vm(1);
        assert!(!scaling.should_scale(1, &vm, Some(VmStatus::Waiting)));
        assert!(!scaling.should_scale(2, &vm, Some(VmStatus::Waiting)));
        assert!(scaling.should_scale(3, &vm, Some(VmStatus::Running)));
        assert!(!scaling.should_scale(3, &vm, Some(VmStatus::Running)));
    }
}
