use crate::table::ProcessTable;
use crate::types::ResourceId;

/// Totals and availability per resource type.
///
/// The per-slot `allocated`/`request` rows in the process table are the
/// single source of truth for holdings; the ledger carries the aggregate
/// side of the conservation invariant:
/// `available[r] + sum(allocated[i][r]) == total[r]` for every `r`.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    total: Vec<u32>,
    available: Vec<u32>,
}

impl ResourceLedger {
    pub fn new(resource_types: usize, instances_per_type: u32) -> Self {
        Self {
            total: vec![instances_per_type; resource_types],
            available: vec![instances_per_type; resource_types],
        }
    }

    pub fn resource_types(&self) -> usize {
        self.total.len()
    }

    pub fn total(&self, resource: ResourceId) -> u32 {
        self.total[resource]
    }

    pub fn available(&self, resource: ResourceId) -> u32 {
        self.available[resource]
    }

    pub fn available_all(&self) -> &[u32] {
        &self.available
    }

    pub fn can_grant(&self, resource: ResourceId, quantity: u32) -> bool {
        self.available[resource] >= quantity
    }

    /// Debit `quantity` instances. Caller must have checked `can_grant`.
    pub fn grant(&mut self, resource: ResourceId, quantity: u32) {
        debug_assert!(self.available[resource] >= quantity);
        self.available[resource] -= quantity;
    }

    /// Credit `quantity` instances back to the pool.
    pub fn restore(&mut self, resource: ResourceId, quantity: u32) {
        self.available[resource] += quantity;
        debug_assert!(self.available[resource] <= self.total[resource]);
    }

    /// Credit a whole holdings row, as returned by slot deactivation.
    pub fn restore_all(&mut self, held: &[u32]) {
        for (resource, &quantity) in held.iter().enumerate() {
            if quantity > 0 {
                self.restore(resource, quantity);
            }
        }
    }

    /// Conservation check against the table. Hard invariant: a `false`
    /// here is a kernel bug, never a runtime condition.
    pub fn is_conserved(&self, table: &ProcessTable) -> bool {
        (0..self.total.len()).all(|r| {
            let held: u32 = table.iter().map(|(_, s)| s.allocated[r]).sum();
            self.available[r] + held == self.total[r]
        })
    }
}
