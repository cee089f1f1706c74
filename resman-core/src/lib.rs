//! # resman-core
//!
//! The deterministic coordination kernel for the resman resource-manager
//! simulator. Provides the logical clock, the fixed-slot process table,
//! the resource ledger, all-or-nothing request arbitration with FIFO
//! re-grants, and matrix-based deadlock detection with victim-at-a-time
//! recovery.

pub mod arbiter;
pub mod clock;
pub mod detector;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
pub mod journal;
pub mod ledger;
pub mod master;
pub mod stats;
pub mod table;
pub mod types;

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;
#[cfg(test)]
#[path = "arbiter_test.rs"]
mod arbiter_test;
