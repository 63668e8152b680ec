//! Representation of cloudlet (a unit of work executed by a VM) and its status.

use std::fmt::{Display, Formatter};

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::core::common::{CloudletId, VmId};
use crate::core::utilization_model::{UtilizationModel, UtilizationModelFull};

/// Remaining length (in MI) below which the cloudlet is considered completed.
pub const LENGTH_EPSILON: f64 = 1e-6;

/// Status of cloudlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CloudletStatus {
    Created,
    Waiting,
    InExec,
    Paused,
    Success,
    Failed,
}

impl Display for CloudletStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CloudletStatus::Created => write!(f, "created"),
            CloudletStatus::Waiting => write!(f, "waiting"),
            CloudletStatus::InExec => write!(f, "in_exec"),
            CloudletStatus::Paused => write!(f, "paused"),
            CloudletStatus::Success => write!(f, "success"),
            CloudletStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Represents cloudlet.
///
// Cloudlet is characterized by its length in millions of instructions, the number of PEs it needs
// and utilization models of CPU, RAM and bandwidth of the VM running it.
#[derive(Clone)]
pub struct Cloudlet {
    id: CloudletId,
    length: u64,
    pes: u64,
    file_size: u64,
    output_size: u64,
    cpu_model: Box<dyn UtilizationModel>,
    ram_model: Box<dyn UtilizationModel>,
    bw_model: Box<dyn UtilizationModel>,
    submission_delay: f64,
    vm: Option<VmId>,
    status: CloudletStatus,
    arrival_time: Option<f64>,
    exec_start_time: Option<f64>,
    finish_time: Option<f64>,
    remaining: f64,
    granted_mips: f64,
}

impl Serialize for Cloudlet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Cloudlet", 5)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("length", &self.length)?;
        state.serialize_field("pes", &self.pes)?;
        state.serialize_field("vm", &self.vm)?;
        state.serialize_field("status", &self.status)?;
        state.end()
    }
}

impl Cloudlet {
    /// Creates cloudlet which fully utilizes the resources of its VM.
    pub fn new(id: CloudletId, length: u64, pes: u64) -> Self {
        Self {
            id,
            length,
            pes,
            file_size: 0,
            output_size: 0,
            cpu_model: Box::new(UtilizationModelFull::new()),
            ram_model: Box::new(UtilizationModelFull::new()),
            bw_model: Box::new(UtilizationModelFull::new()),
            submission_delay: 0.,
            vm: None,
            status: CloudletStatus::Created,
            arrival_time: None,
            exec_start_time: None,
            finish_time: None,
            remaining: length as f64,
            granted_mips: 0.,
        }
    }

    pub fn with_utilization_models(
        mut self,
        cpu_model: Box<dyn UtilizationModel>,
        ram_model: Box<dyn UtilizationModel>,
        bw_model: Box<dyn UtilizationModel>,
    ) -> Self {
        self.cpu_model = cpu_model;
        self.ram_model = ram_model;
        self.bw_model = bw_model;
        self
    }

    pub fn with_file_sizes(mut self, file_size: u64, output_size: u64) -> Self {
        self.file_size = file_size;
        self.output_size = output_size;
        self
    }

    /// Sets the delay between submission of cloudlet to broker and its arrival to the VM.
    pub fn with_submission_delay(mut self, delay: f64) -> Self {
        self.submission_delay = delay.max(0.);
        self
    }

    /// Binds the cloudlet to the specific VM.
    pub fn with_vm(mut self, vm_id: VmId) -> Self {
        self.vm = Some(vm_id);
        self
    }

    pub fn id(&self) -> CloudletId {
        self.id
    }

    /// Returns the length in millions of instructions.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn pes(&self) -> u64 {
        self.pes
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn output_size(&self) -> u64 {
        self.output_size
    }

    pub fn submission_delay(&self) -> f64 {
        self.submission_delay
    }

    pub fn vm(&self) -> Option<VmId> {
        self.vm
    }

    pub fn status(&self) -> CloudletStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, CloudletStatus::Success | CloudletStatus::Failed)
    }

    /// Returns the time cloudlet arrived to the VM.
    pub fn arrival_time(&self) -> Option<f64> {
        self.arrival_time
    }

    pub fn exec_start_time(&self) -> Option<f64> {
        self.exec_start_time
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Returns the time passed between execution start and finish.
    pub fn actual_cpu_time(&self) -> Option<f64> {
        Some(self.finish_time? - self.exec_start_time?)
    }

    pub fn remaining_length(&self) -> f64 {
        self.remaining
    }

    pub fn executed_length(&self) -> f64 {
        self.length as f64 - self.remaining
    }

    /// Returns MIPS currently granted to the cloudlet by its VM.
    pub fn granted_mips(&self) -> f64 {
        self.granted_mips
    }

    fn time_from_start(&self, time: f64) -> f64 {
        self.exec_start_time.map_or(0., |start| time - start)
    }

    pub fn cpu_utilization(&self, time: f64) -> f64 {
        self.cpu_model
            .utilization(time, self.time_from_start(time))
            .clamp(0., 1.)
    }

    pub fn ram_utilization(&self, time: f64) -> f64 {
        self.ram_model
            .utilization(time, self.time_from_start(time))
            .clamp(0., 1.)
    }

    pub fn bw_utilization(&self, time: f64) -> f64 {
        self.bw_model.utilization(time, self.time_from_start(time)).clamp(0., 1.)
    }

    pub(crate) fn set_vm(&mut self, vm_id: VmId) {
        self.vm = Some(vm_id);
    }

    pub(crate) fn set_waiting(&mut self, time: f64) {
        self.status = CloudletStatus::Waiting;
        if self.arrival_time.is_none() {
            self.arrival_time = Some(time);
        }
    }

    pub(crate) fn set_in_exec(&mut self, time: f64) {
        self.status = CloudletStatus::InExec;
        if self.exec_start_time.is_none() {
            self.exec_start_time = Some(time);
        }
    }

    pub(crate) fn set_paused(&mut self) {
        self.status = CloudletStatus::Paused;
        self.granted_mips = 0.;
    }

    pub(crate) fn set_granted_mips(&mut self, mips: f64) {
        self.granted_mips = mips;
    }

    /// Accounts the progress made with the currently granted MIPS during the elapsed time.
    /// Returns `true` if the cloudlet is completed.
    pub(crate) fn advance(&mut self, elapsed: f64) -> bool {
        self.remaining = (self.remaining - self.granted_mips * elapsed).max(0.);
        if self.remaining <= LENGTH_EPSILON {
            self.remaining = 0.;
            return true;
        }
        false
    }

    pub(crate) fn finish(&mut self, status: CloudletStatus, time: f64) {
        self.status = status;
        self.finish_time = Some(time);
        self.granted_mips = 0.;
    }
}
