pub mod allocation_policy;
pub mod broker;
pub mod cloudlet;
pub mod cloudlet_scheduler;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod events;
pub mod host;
pub mod pe;
pub mod provisioner;
pub mod resource;
pub mod scaling;
pub mod sharing;
pub mod utilization_model;
pub mod vm;
pub mod vm_scheduler;
