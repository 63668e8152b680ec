//! Common types and errors.

use thiserror::Error;

use crate::core::resource::ResourceKind;

/// Identifier of a physical host within the datacenter.
pub type HostId = u32;
/// Identifier of a virtual machine.
pub type VmId = u32;
/// Identifier of a cloudlet.
pub type CloudletId = u32;

/// Errors returned by datacenter operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("not enough {kind}: requested {requested}, available {available}")]
    CapacityExceeded {
        kind: ResourceKind,
        requested: u64,
        available: u64,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no suitable host for vm #{vm_id}")]
    NoSuitableHost { vm_id: VmId },

    #[error("pe #{pe} of host #{host_id} has failed")]
    HostPeFailure { host_id: HostId, pe: usize },

    #[error("vm #{0} not found")]
    VmNotFound(VmId),

    #[error("cloudlet #{0} not found")]
    CloudletNotFound(CloudletId),

    #[error("host #{0} not found")]
    HostNotFound(HostId),

    #[error("configuration error: {0}")]
    Config(String),
}
