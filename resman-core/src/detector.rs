use crate::ledger::ResourceLedger;
use crate::table::ProcessTable;
use crate::types::SlotIndex;

/// Multi-instance safety check over the current allocation state.
///
/// Purely matrix arithmetic: a work vector seeded from availability and
/// a finish flag per slot. No pointer graph is ever built. Slots the
/// loop cannot mark finishable form the deadlocked set; by construction
/// every member is blocked with a non-zero outstanding request.
pub struct DeadlockDetector;

impl DeadlockDetector {
    /// Returns the deadlocked set in ascending slot order, empty when the
    /// state is safe.
    pub fn deadlocked(table: &ProcessTable, ledger: &ResourceLedger) -> Vec<SlotIndex> {
        let resources = ledger.resource_types();
        let mut work: Vec<u32> = (0..resources).map(|r| ledger.available(r)).collect();
        let mut finish: Vec<bool> = table.iter().map(|(_, slot)| !slot.is_active()).collect();

        let mut progressed = true;
        while progressed {
            progressed = false;
            for (i, slot) in table.iter() {
                if finish[i] {
                    continue;
                }
                let satisfiable = (0..resources).all(|r| slot.request[r] <= work[r]);
                if satisfiable {
                    // Assume the slot runs to completion and hands its
                    // holdings back.
                    for r in 0..resources {
                        work[r] += slot.allocated[r];
                    }
                    finish[i] = true;
                    progressed = true;
                }
            }
        }

        table
            .iter()
            .filter(|(i, slot)| slot.is_active() && !finish[*i])
            .map(|(i, _)| i)
            .collect()
    }
}
