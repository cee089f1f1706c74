use serde::Serialize;

/// Counters accumulated over a run and reported in the final journal
/// block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Workers activated by the launcher.
    pub workers_launched: u32,
    /// Requests satisfied synchronously.
    pub grants_immediate: u64,
    /// Requests satisfied by a re-grant sweep after blocking.
    pub grants_after_wait: u64,
    /// Slots reclaimed via worker-initiated terminate (or reap).
    pub terminations_normal: u64,
    /// Slots reclaimed as deadlock victims.
    pub terminations_deadlock: u64,
    /// Deadlock-detection invocations.
    pub deadlock_runs: u64,
    /// Sum of initial deadlocked-set sizes across all detections.
    pub processes_in_deadlock_total: u64,
}

impl RunStats {
    /// Mean size of the initial deadlocked set per detection run.
    pub fn avg_deadlocked_per_run(&self) -> f64 {
        if self.deadlock_runs == 0 {
            0.0
        } else {
            self.processes_in_deadlock_total as f64 / self.deadlock_runs as f64
        }
    }

    /// Share of deadlocked processes that ended up terminated, in percent.
    pub fn deadlock_termination_pct(&self) -> f64 {
        if self.processes_in_deadlock_total == 0 {
            0.0
        } else {
            self.terminations_deadlock as f64 / self.processes_in_deadlock_total as f64 * 100.0
        }
    }
}
