use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;

use cloudsim_core::simulation::Simulation;

use cloudsim_iaas::core::cloudlet::{Cloudlet, CloudletStatus};
use cloudsim_iaas::core::config::SimulationConfig;
use cloudsim_iaas::core::provisioner::ResourceProvisioner;
use cloudsim_iaas::core::resource::ResourceKind;
use cloudsim_iaas::core::scaling::{HorizontalVmScaling, VerticalVmScaling};
use cloudsim_iaas::core::utilization_model::ConstantUtilizationModel;
use cloudsim_iaas::core::vm::{Vm, VmStatus};
use cloudsim_iaas::simulation::CloudSimulation;

fn config(vm_destruction_delay: f64) -> SimulationConfig {
    SimulationConfig {
        vm_destruction_delay,
        ..SimulationConfig::default()
    }
}

#[test]
// The VM gets an extra PE while its only cloudlet keeps it fully loaded,
// and gives it back once the load drops below the lower threshold.
fn test_vertical_cpu_scaling() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config(-1.)).unwrap();
    cloud_sim.add_host("h", 8, 1000, 8192, 10000, 100000);

    let scaling = VerticalVmScaling::new(ResourceKind::Cpu, 0.1).with_static_thresholds(0.4, 0.8);
    let vm = Vm::new(0, 1000, 2, 1024, 1000, 10000).with_vertical_scaling(scaling);
    cloud_sim.submit_vm_list(vec![vm]);

    let light = || Box::new(ConstantUtilizationModel::new(0.2));
    cloud_sim.submit_cloudlet_list(vec![
        Cloudlet::new(0, 10000, 2).with_vm(0),
        Cloudlet::new(1, 2000, 1)
            .with_utilization_models(light(), light(), light())
            .with_submission_delay(20.)
            .with_vm(0),
    ]);

    let history = Rc::new(RefCell::new(Vec::new()));
    let history_clone = history.clone();
    let dc = cloud_sim.datacenter_handle();
    cloud_sim.add_clock_tick_listener(move |tick| {
        let pes = dc.borrow().vm(0).map_or(0, |vm| vm.pes());
        history_clone.borrow_mut().push((tick.time, pes));
    });
    cloud_sim.step_until_no_events();

    let history = history.borrow();
    // utilization 1.0 exceeds the upper threshold at the very first tick
    assert_eq!(history[0], (0., 3));
    assert!(history.iter().all(|(_, pes)| *pes == 2 || *pes == 3));
    let scaled_down = history.iter().position(|(_, pes)| *pes == 2).unwrap();
    assert_abs_diff_eq!(history[scaled_down].0, 5., epsilon = 1e-9);
    assert!(history[scaled_down..].iter().all(|(_, pes)| *pes == 2));

    let dc = cloud_sim.datacenter();
    let vm = dc.vm(0).unwrap();
    assert_eq!(vm.pes(), 2);
    assert_eq!(vm.status(), VmStatus::Running);
    assert_eq!(dc.host(0).unwrap().free_pes(), 6);
    assert_abs_diff_eq!(dc.cloudlet(0).unwrap().finish_time().unwrap(), 5., epsilon = 1e-6);
    assert_abs_diff_eq!(dc.cloudlet(1).unwrap().finish_time().unwrap(), 30., epsilon = 1e-6);
}

#[test]
fn test_vertical_ram_scaling_is_capped_by_host() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config(-1.)).unwrap();
    cloud_sim.add_host("h", 4, 1000, 1500, 10000, 100000);

    let scaling = VerticalVmScaling::new(ResourceKind::Ram, 0.5).with_static_thresholds(0.1, 0.9);
    let vm = Vm::new(0, 1000, 1, 1000, 1000, 10000).with_vertical_scaling(scaling);
    cloud_sim.submit_vm_list(vec![vm]);
    cloud_sim.submit_cloudlet_list(vec![Cloudlet::new(0, 5000, 1).with_vm(0)]);

    cloud_sim.run_until(3.);
    // ram is fully used by the cloudlet, growth by 500 is capped by what the host has left
    let dc = cloud_sim.datacenter();
    let vm = dc.vm(0).unwrap();
    assert_eq!(vm.ram().capacity(), 1500);
    assert_eq!(dc.host(0).unwrap().ram().available(), 0);
}

#[test]
fn test_horizontal_scaling() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config(0.)).unwrap();
    cloud_sim.add_host("h", 4, 1000, 8192, 10000, 100000);

    let scaling = HorizontalVmScaling::new(
        |vm: &Vm| vm.cpu_utilization() > 0.7,
        |id| Vm::new(id, 1000, 1, 512, 1000, 1000),
    )
    .with_max_new_vms(2);
    let vm = Vm::new(0, 1000, 1, 512, 1000, 1000).with_horizontal_scaling(scaling);
    cloud_sim.submit_vm_list(vec![vm]);
    cloud_sim.submit_cloudlet_list(vec![Cloudlet::new(0, 10000, 1).with_vm(0)]);
    cloud_sim.step_until_no_events();

    let dc = cloud_sim.datacenter();
    assert_eq!(dc.vms().len(), 3);
    assert_eq!(dc.vm(0).unwrap().horizontal_scaling().unwrap().created_vms(), 2);
    assert_eq!(dc.vm(1).unwrap().creation_time(), Some(0.));
    assert_eq!(dc.vm(2).unwrap().creation_time(), Some(1.));
    assert_eq!(dc.vm(1).unwrap().status(), VmStatus::Running);
    assert_eq!(dc.cloudlet(0).unwrap().status(), CloudletStatus::Success);
    drop(dc);

    let broker = cloud_sim.broker();
    let broker = broker.borrow();
    assert_eq!(broker.created_vms(), vec![1, 2]);
    assert_eq!(broker.destroyed_vms(), vec![0]);
}

#[test]
// The id taken by a scaled VM can't be submitted again.
fn test_scaled_vm_id_is_reserved() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config(0.)).unwrap();
    cloud_sim.add_host("h", 4, 1000, 8192, 10000, 100000);
    let other_broker = cloud_sim.create_broker("other");

    let scaling = HorizontalVmScaling::new(
        |vm: &Vm| vm.cpu_utilization() > 0.7,
        |id| Vm::new(id, 1000, 1, 512, 1000, 1000),
    )
    .with_max_new_vms(1);
    let vm = Vm::new(0, 1000, 1, 512, 1000, 1000).with_horizontal_scaling(scaling);
    cloud_sim.submit_vm_list(vec![vm]);
    cloud_sim.submit_cloudlet_list(vec![Cloudlet::new(0, 10000, 1).with_vm(0)]);
    cloud_sim.run_until(0.5);
    assert_eq!(cloud_sim.datacenter().next_vm_id(), 2);

    cloud_sim.submit_vm_list(vec![Vm::new(1, 1000, 2, 512, 1000, 1000)]);
    let other = cloud_sim.broker_by_id(other_broker).unwrap();
    other.borrow_mut().submit_vm_list(vec![Vm::new(1, 1000, 2, 512, 1000, 1000)]);
    cloud_sim.step_until_no_events();

    let dc = cloud_sim.datacenter();
    let scaled = dc.vm(1).unwrap();
    assert_eq!(scaled.pes(), 1);
    assert_eq!(scaled.status(), VmStatus::Running);
    drop(dc);
    assert_eq!(cloud_sim.broker().borrow().created_vms(), vec![1]);
    assert_eq!(other.borrow().failed_vms(), vec![1]);
}

#[test]
// No new VM is requested while the previous one is waiting for a host.
fn test_horizontal_scaling_waits_for_placement() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, config(0.)).unwrap();
    cloud_sim.add_host("h", 2, 1000, 8192, 10000, 100000);

    let scaling = HorizontalVmScaling::new(
        |vm: &Vm| vm.cpu_utilization() > 0.7,
        |id| Vm::new(id, 1000, 2, 512, 1000, 1000),
    )
    .with_max_new_vms(5);
    let vm = Vm::new(0, 1000, 1, 512, 1000, 1000).with_horizontal_scaling(scaling);
    cloud_sim.submit_vm_list(vec![vm]);
    cloud_sim.submit_cloudlet_list(vec![Cloudlet::new(0, 10000, 1).with_vm(0)]);

    cloud_sim.run_until(5.);
    {
        let dc = cloud_sim.datacenter();
        assert_eq!(dc.vm(0).unwrap().horizontal_scaling().unwrap().created_vms(), 1);
        assert_eq!(dc.vm(1).unwrap().status(), VmStatus::Waiting);
    }

    cloud_sim.step_until_no_events();
    let dc = cloud_sim.datacenter();
    assert_eq!(dc.vms().len(), 2);
    let new_vm = dc.vm(1).unwrap();
    assert_eq!(new_vm.status(), VmStatus::Running);
    assert_abs_diff_eq!(new_vm.creation_time().unwrap(), 10., epsilon = 1e-6);
}
