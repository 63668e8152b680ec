//! Simulation of an IaaS cloud datacenter.
//!
//! Physical hosts lease processing elements, memory, bandwidth and storage to virtual machines,
//! which execute cloudlets (units of work) using time-shared schedulers.
//! Virtual machines can be scaled vertically or horizontally at runtime depending on their utilization.

pub mod core;
pub mod simulation;
