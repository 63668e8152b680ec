use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use log::info;

use cloudsim_core::simulation::Simulation;
use cloudsim_iaas::core::cloudlet::Cloudlet;
use cloudsim_iaas::core::common::SimError;
use cloudsim_iaas::core::config::SimulationConfig;
use cloudsim_iaas::core::provisioner::ResourceProvisioner;
use cloudsim_iaas::core::resource::ResourceKind;
use cloudsim_iaas::core::scaling::{ResourceScaling, VerticalVmScaling};
use cloudsim_iaas::core::utilization_model::{ConstantUtilizationModel, DynamicUtilizationModel};
use cloudsim_iaas::core::vm::Vm;
use cloudsim_iaas::simulation::CloudSimulation;

/// VM vertical scaling demo
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to simulation config
    #[clap(long, default_value = "config.yaml")]
    config: String,

    /// Random seed
    #[clap(long, default_value_t = 123)]
    seed: u64,

    /// Number of cloudlets per VM (>= 1)
    #[clap(long, default_value_t = 4)]
    cloudlets: u32,
}

fn init_logger() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn scaled_vm(id: u32) -> Vm {
    let cpu_scaling = VerticalVmScaling::new(ResourceKind::Cpu, 0.5).with_static_thresholds(0.4, 0.8);
    // grow RAM right to the threshold instead of fixed steps
    let ram_scaling = VerticalVmScaling::new(ResourceKind::Ram, 0.1)
        .with_lower_threshold(|_| 0.3)
        .with_upper_threshold(|vm| if vm.pes() > vm.original_pes() { 0.9 } else { 0.7 })
        .with_resource_scaling(ResourceScaling::Instantaneous);
    Vm::new(id, 1000, 2, 1024, 1000, 10000)
        .with_vertical_scaling(cpu_scaling)
        .with_vertical_scaling(ram_scaling)
}

fn main() -> Result<(), SimError> {
    init_logger();
    let args = Args::parse();

    let sim_config = SimulationConfig::from_file(&args.config)?;
    let sim = Simulation::new(args.seed);
    let mut cloud_sim = CloudSimulation::new(sim, sim_config)?;

    let vm_count = 3;
    cloud_sim.submit_vm_list((0..vm_count).map(scaled_vm).collect());

    let mut cloudlets = Vec::new();
    for vm_id in 0..vm_count {
        for i in 0..args.cloudlets {
            let id = vm_id * args.cloudlets + i;
            let cpu = Box::new(DynamicUtilizationModel::new(0.3, 0.05, 1.));
            let ram = Box::new(ConstantUtilizationModel::new(0.2));
            let bw = Box::new(ConstantUtilizationModel::new(0.1));
            let cloudlet = Cloudlet::new(id, 20000 + 5000 * i as u64, 1)
                .with_utilization_models(cpu, ram, bw)
                .with_submission_delay(3. * i as f64)
                .with_vm(vm_id);
            cloudlets.push(cloudlet);
        }
    }
    cloud_sim.submit_cloudlet_list(cloudlets);

    let dc = cloud_sim.datacenter_handle();
    cloud_sim.add_clock_tick_listener(move |tick| {
        let dc = dc.borrow();
        for vm in dc.vms().values() {
            info!(
                "tick {:>3} at {:>6.2}: vm #{} {:>9} pes={} cpu={:.2} ram={}/{}",
                tick.index,
                tick.time,
                vm.id(),
                vm.status().to_string(),
                vm.pes(),
                vm.cpu_utilization(),
                vm.ram().total_allocated(),
                vm.ram().capacity(),
            );
        }
    });

    cloud_sim.step_until_no_events();

    let dc = cloud_sim.datacenter();
    info!("{:>8} {:>8} {:>4} {:>10} {:>10} {:>10}", "cloudlet", "status", "vm", "arrival", "start", "finish");
    for cloudlet in dc.cloudlets().values() {
        info!(
            "{:>8} {:>8} {:>4} {:>10.2} {:>10.2} {:>10.2}",
            cloudlet.id(),
            cloudlet.status().to_string(),
            cloudlet.vm().map_or(-1, |id| id as i64),
            cloudlet.arrival_time().unwrap_or(f64::NAN),
            cloudlet.exec_start_time().unwrap_or(f64::NAN),
            cloudlet.finish_time().unwrap_or(f64::NAN),
        );
    }
    info!("simulation finished at {:.2}, {} events", cloud_sim.current_time(), cloud_sim.event_count());
    Ok(())
}
