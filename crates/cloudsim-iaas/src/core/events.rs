//! Standard simulation events.

// VM LIFECYCLE EVENTS /////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::core::common::{HostId, VmId};
    use crate::core::vm::Vm;

    #[derive(Serialize)]
    pub struct VmCreateRequest {
        pub vm: Vm,
    }

    #[derive(Serialize)]
    pub struct VmCreated {
        pub vm_id: VmId,
        pub host_id: HostId,
    }

    #[derive(Serialize)]
    pub struct VmCreationFailed {
        pub vm_id: VmId,
    }

    #[derive(Serialize)]
    pub struct VmDestroyRequest {
        pub vm_id: VmId,
    }

    #[derive(Serialize)]
    pub struct VmDestroyed {
        pub vm_id: VmId,
    }

    #[derive(Serialize)]
    pub struct VmProcessingUpdate {
        pub vm_id: VmId,
    }

    #[derive(Serialize)]
    pub struct IdleVmCheck {
        pub vm_id: VmId,
    }
}

// CLOUDLET EVENTS /////////////////////////////////////////////////////////////////////////////////

pub mod cloudlet {
    use serde::Serialize;

    use crate::core::cloudlet::{Cloudlet, CloudletStatus};
    use crate::core::common::{CloudletId, VmId};

    #[derive(Serialize)]
    pub struct CloudletSubmit {
        pub cloudlet: Cloudlet,
    }

    #[derive(Serialize)]
    pub struct CloudletFinished {
        pub cloudlet_id: CloudletId,
        pub vm_id: VmId,
        pub status: CloudletStatus,
    }

    #[derive(Serialize)]
    pub struct CloudletPause {
        pub cloudlet_id: CloudletId,
    }

    #[derive(Serialize)]
    pub struct CloudletResume {
        pub cloudlet_id: CloudletId,
    }

    #[derive(Serialize)]
    pub struct CloudletCancel {
        pub cloudlet_id: CloudletId,
    }
}

// HOST EVENTS /////////////////////////////////////////////////////////////////////////////////////

pub mod host {
    use serde::Serialize;

    use crate::core::common::{HostId, VmId};

    #[derive(Serialize)]
    pub struct PeFailureRequest {
        pub host_id: HostId,
        pub pe: usize,
    }

    #[derive(Serialize)]
    pub struct HostPeFailure {
        pub host_id: HostId,
        pub pe: usize,
        pub vm_ids: Vec<VmId>,
    }
}
