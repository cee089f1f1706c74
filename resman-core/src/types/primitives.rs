use serde::{Deserialize, Serialize};

/// Index of a fixed slot in the process table.
pub type SlotIndex = usize;

/// Index of a resource type in the ledger.
pub type ResourceId = usize;

/// Opaque worker identity assigned by the launcher, used to route grants.
pub type ExternalId = u64;

/// Default number of resource types (R).
pub const RESOURCE_TYPES: usize = 5;

/// Default instances per resource type (K).
pub const INSTANCES_PER_TYPE: u32 = 10;

/// Default number of concurrent worker slots (N).
pub const MAX_SLOTS: usize = 18;

/// Hard cap on journal lines. Events past the cap are silently dropped.
pub const MAX_LOG_LINES: usize = 10_000;

/// Lifecycle states of a process-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Slot is free for the launcher to claim.
    Unused,
    /// Worker is running and may issue requests.
    Ready,
    /// Worker is parked on an unsatisfied request.
    Blocked,
    /// Worker has been torn down but the slot is not yet reclaimed.
    Terminated,
}
