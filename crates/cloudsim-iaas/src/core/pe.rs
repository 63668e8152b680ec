//! Processing elements (CPU cores) of a host.

use serde::Serialize;

use crate::core::common::VmId;
use crate::core::provisioner::{ResourceProvisioner, SimpleProvisioner};
use crate::core::resource::ResourceKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PeStatus {
    Free,
    Busy,
    Failed,
}

/// Processing element with its capacity in MIPS shared among VMs.
#[derive(Clone, Debug)]
pub struct Pe {
    id: usize,
    provisioner: SimpleProvisioner<VmId>,
    status: PeStatus,
}

impl Pe {
    pub fn new(id: usize, mips: u64) -> Self {
        Self {
            id,
            provisioner: SimpleProvisioner::new(ResourceKind::Cpu, mips),
            status: PeStatus::Free,
        }
    }

    /// Index of the PE within its host.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn mips(&self) -> u64 {
        self.provisioner.capacity()
    }

    pub fn status(&self) -> PeStatus {
        self.status
    }

    pub fn is_working(&self) -> bool {
        self.status != PeStatus::Failed
    }

    pub fn provisioner(&self) -> &SimpleProvisioner<VmId> {
        &self.provisioner
    }

    /// Marks the PE as failed and revokes all its allocations.
    pub fn fail(&mut self) {
        self.provisioner.deallocate_all();
        self.status = PeStatus::Failed;
    }

    /// Replaces all allocations of the PE with the given grants.
    ///
    /// Zero grants are skipped. A failed PE keeps no allocations.
    pub fn set_allocations(&mut self, grants: &[(VmId, u64)]) {
        self.provisioner.deallocate_all();
        if self.status == PeStatus::Failed {
            return;
        }
        for &(vm_id, mips) in grants {
            if mips > 0 {
                self.provisioner.allocate(vm_id, mips);
            }
        }
        self.status = if self.provisioner.total_allocated() > 0 {
            PeStatus::Busy
        } else {
            PeStatus::Free
        };
    }
}
