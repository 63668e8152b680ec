//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::core::common::SimError;

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub scheduling_interval: Option<f64>,
    pub vm_allocation_timeout: Option<f64>,
    pub vm_destruction_delay: Option<f64>,
    pub min_time_between_events: Option<f64>,
    pub allocation_policy: Option<String>,
    pub hosts: Option<Vec<HostConfig>>,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of PEs.
    pub pes: u64,
    /// MIPS of each PE.
    pub pe_mips: u64,
    /// RAM capacity in MB.
    pub ram: u64,
    /// Bandwidth capacity in Mbps.
    pub bw: u64,
    /// Storage capacity in MB.
    pub storage: u64,
    /// Number of such hosts.
    pub count: Option<u32>,
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Interval in seconds between clock ticks, when processing of all VMs is updated and scaling is evaluated.
    pub scheduling_interval: f64,
    /// Timeout in seconds after which a VM waiting for placement becomes failed.
    pub vm_allocation_timeout: f64,
    /// Delay in seconds after which an idle VM is destroyed by its broker. Negative value disables destruction.
    pub vm_destruction_delay: f64,
    /// Minimal delay in seconds between processing updates of a VM.
    pub min_time_between_events: f64,
    /// Name of VM allocation policy.
    pub allocation_policy: String,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scheduling_interval: 1.,
            vm_allocation_timeout: f64::INFINITY,
            vm_destruction_delay: 0.,
            min_time_between_events: 0.001,
            allocation_policy: "FirstFit".to_string(),
            hosts: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, SimError> {
        let data = std::fs::read_to_string(file_name)
            .map_err(|e| SimError::Config(format!("can't read file {}: {}", file_name, e)))?;
        Self::from_yaml(&data)
    }

    /// Creates simulation config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, SimError> {
        let raw: RawSimulationConfig =
            serde_yaml::from_str(data).map_err(|e| SimError::Config(format!("can't parse YAML: {}", e)))?;
        let default = Self::default();
        let config = Self {
            scheduling_interval: raw.scheduling_interval.unwrap_or(default.scheduling_interval),
            vm_allocation_timeout: raw.vm_allocation_timeout.unwrap_or(default.vm_allocation_timeout),
            vm_destruction_delay: raw.vm_destruction_delay.unwrap_or(default.vm_destruction_delay),
            min_time_between_events: raw.min_time_between_events.unwrap_or(default.min_time_between_events),
            allocation_policy: raw.allocation_policy.unwrap_or(default.allocation_policy),
            hosts: raw.hosts.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that parameter values are consistent.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.scheduling_interval.is_nan() || self.scheduling_interval <= 0. {
            return Err(SimError::Config(format!(
                "scheduling_interval must be positive, got {}",
                self.scheduling_interval
            )));
        }
        if self.min_time_between_events < 0. {
            return Err(SimError::Config(format!(
                "min_time_between_events must be non-negative, got {}",
                self.min_time_between_events
            )));
        }
        for host in &self.hosts {
            if host.name.is_none() && host.name_prefix.is_none() {
                return Err(SimError::Config("host config needs name or name_prefix".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_absent_values() {
        let config = SimulationConfig::from_yaml("scheduling_interval: 0.5").unwrap();
        assert_eq!(config.scheduling_interval, 0.5);
        assert_eq!(config.vm_allocation_timeout, f64::INFINITY);
        assert_eq!(config.allocation_policy, "FirstFit");
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn test_hosts() {
        let config = SimulationConfig::from_yaml(
            "
allocation_policy: WorstFit
hosts:
  - name_prefix: h
    pes: 8
    pe_mips: 1000
    ram: 2048
    bw: 1000
    storage: 100000
    count: 3
",
        )
        .unwrap();
        assert_eq!(config.allocation_policy, "WorstFit");
        assert_eq!(config.hosts.len(), 1);
        assert_eq!(config.hosts[0].count, Some(3));
        assert_eq!(config.hosts[0].pes, 8);
    }

    #[test]
    fn test_invalid_interval() {
        assert!(SimulationConfig::from_yaml("scheduling_interval: 0").is_err());
        assert!(SimulationConfig::from_yaml("hosts: [").is_err());
    }
}
