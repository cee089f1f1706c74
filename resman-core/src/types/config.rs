use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{INSTANCES_PER_TYPE, MAX_SLOTS, RESOURCE_TYPES};

/// Run parameters. Fixed for the lifetime of a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of resource types (R).
    pub resource_types: usize,
    /// Instances per resource type (K).
    pub instances_per_type: u32,
    /// Worker slots in the process table (N).
    pub max_slots: usize,
    /// Total workers the launcher may create over the run.
    pub max_total_workers: u32,
    /// Concurrent worker ceiling, at most `max_slots`.
    pub max_concurrent_workers: usize,
    /// Minimum pacing between worker launches, in simulated milliseconds.
    pub launch_interval_ms: u64,
    /// Emit per-request journal lines. Terminations, snapshots and
    /// deadlock events are always journalled.
    pub verbose: bool,
    /// Seed for the master's clock RNG; worker walks derive from it.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            resource_types: RESOURCE_TYPES,
            instances_per_type: INSTANCES_PER_TYPE,
            max_slots: MAX_SLOTS,
            max_total_workers: 5,
            max_concurrent_workers: 5,
            launch_interval_ms: 100,
            verbose: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_total_workers must be positive")]
    NoWorkers,
    #[error("max_concurrent_workers must be between 1 and {max}")]
    ConcurrencyOutOfRange { max: usize },
    #[error("resource dimensions must be positive")]
    EmptyDimensions,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_types == 0 || self.instances_per_type == 0 || self.max_slots == 0 {
            return Err(ConfigError::EmptyDimensions);
        }
        if self.max_total_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_concurrent_workers == 0 || self.max_concurrent_workers > self.max_slots {
            return Err(ConfigError::ConcurrencyOutOfRange {
                max: self.max_slots,
            });
        }
        Ok(())
    }
}
