//! The coordinator. Owns every piece of allocation state, is the only
//! writer of the logical clock, and drives the periodic snapshot and
//! deadlock-detection tasks off logical-clock boundaries.

use std::io;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arbiter::{Arbiter, ArbiterCtx, Disposition, ProtocolViolation, TerminationKind};
use crate::clock::{SimClock, SimTime};
use crate::detector::DeadlockDetector;
use crate::infrastructure::GrantSink;
use crate::journal::Journal;
use crate::ledger::ResourceLedger;
use crate::stats::RunStats;
use crate::table::ProcessTable;
use crate::types::{ExternalId, Message, SimConfig, SlotIndex};

/// Smallest clock advance per event-loop iteration, in ns.
const MIN_TICK_NS: u32 = 100;
/// Largest clock advance per event-loop iteration, in ns.
const MAX_TICK_NS: u32 = 1_099;

/// Which periodic tasks a tick triggered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub snapshot: bool,
    pub detection: bool,
}

pub struct Master {
    config: SimConfig,
    clock: SimClock,
    table: ProcessTable,
    ledger: ResourceLedger,
    arbiter: Arbiter,
    stats: RunStats,
    journal: Journal,
    rng: StdRng,
    /// Second index the detector last ran in. Boundaries may be skipped
    /// when a tick overshoots, never run twice.
    last_detection_second: u32,
    /// Half-second index of the last table snapshot.
    last_snapshot_half: u64,
}

impl Master {
    pub fn new(config: SimConfig, mut journal: Journal) -> Self {
        journal.event("Master: resource management system started");
        let table = ProcessTable::new(config.max_slots, config.resource_types);
        let ledger = ResourceLedger::new(config.resource_types, config.instances_per_type);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            clock: SimClock::new(),
            table,
            ledger,
            arbiter: Arbiter::new(),
            stats: RunStats::default(),
            journal,
            rng,
            last_detection_second: 0,
            last_snapshot_half: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// One event-loop iteration's clock work: advance by a small random
    /// delta, then fire any periodic task whose boundary was crossed.
    pub fn tick(&mut self, sink: &mut dyn GrantSink) -> TickOutcome {
        let delta = self.rng.random_range(MIN_TICK_NS..=MAX_TICK_NS);
        let now = self.clock.advance(delta);
        let mut outcome = TickOutcome::default();

        if now.half_seconds() > self.last_snapshot_half {
            self.last_snapshot_half = now.half_seconds();
            self.journal.snapshot(now, &self.table, &self.ledger);
            outcome.snapshot = true;
        }
        if now.seconds > self.last_detection_second {
            self.last_detection_second = now.seconds;
            self.run_detection(sink);
            outcome.detection = true;
        }
        outcome
    }

    /// Launcher hook: claim the lowest unused slot for a new worker.
    /// `None` when the table is full.
    pub fn activate_worker(&mut self, external_id: ExternalId) -> Option<SlotIndex> {
        let index = self.table.find_unused()?;
        let now = self.clock.now();
        self.table.activate(index, external_id, now);
        self.stats.workers_launched += 1;
        self.journal
            .event(format!("Master: Process P{index} created at time {now}"));
        Some(index)
    }

    /// Reap hook: a worker exited without a terminate message reaching
    /// the arbiter first. Releasing an already-unused slot is a no-op.
    pub fn reap_worker(&mut self, external_id: ExternalId, sink: &mut dyn GrantSink) {
        if let Some(index) = self.table.slot_of_external(external_id) {
            let _ = self.terminate_slot(index, TerminationKind::Normal, sink);
        }
    }

    /// Dispatch one channel message. Violations are journalled and the
    /// allocation state left untouched.
    pub fn handle_message(
        &mut self,
        msg: &Message,
        sink: &mut dyn GrantSink,
    ) -> Result<Disposition, ProtocolViolation> {
        let now = self.clock.now();
        let Self {
            table,
            ledger,
            stats,
            journal,
            arbiter,
            ..
        } = self;
        let mut ctx = ArbiterCtx {
            table,
            ledger,
            stats,
            journal,
            sink,
            now,
        };
        let result = arbiter.handle(msg, &mut ctx);

        if let Err(violation) = result {
            self.journal.event(format!(
                "Master ignoring ill-formed message at time {now}: {violation}"
            ));
            tracing::warn!(%violation, "protocol violation");
        }
        debug_assert!(self.ledger.is_conserved(&self.table));
        result
    }

    fn terminate_slot(
        &mut self,
        slot: SlotIndex,
        kind: TerminationKind,
        sink: &mut dyn GrantSink,
    ) -> Result<Disposition, ProtocolViolation> {
        let now = self.clock.now();
        let Self {
            table,
            ledger,
            stats,
            journal,
            arbiter,
            ..
        } = self;
        let mut ctx = ArbiterCtx {
            table,
            ledger,
            stats,
            journal,
            sink,
            now,
        };
        arbiter.terminate(slot, kind, &mut ctx)
    }

    /// Deadlock pass: detect, then kill victims smallest slot index first
    /// until the state is safe again. Each kill releases the victim's
    /// holdings through the normal terminate path, so non-victims blocked
    /// on them can wake before the next kill is considered.
    pub fn run_detection(&mut self, sink: &mut dyn GrantSink) {
        self.stats.deadlock_runs += 1;
        let now = self.clock.now();
        let deadlocked = DeadlockDetector::deadlocked(&self.table, &self.ledger);

        if deadlocked.is_empty() {
            self.journal.detail(format!(
                "Master running deadlock detection at time {now}: no deadlocks detected"
            ));
            return;
        }

        let names: Vec<String> = deadlocked.iter().map(|i| format!("P{i}")).collect();
        self.journal
            .event(format!("Master running deadlock detection at time {now}:"));
        self.journal
            .event(format!("Processes {} deadlocked", names.join(", ")));
        self.stats.processes_in_deadlock_total += deadlocked.len() as u64;

        let mut killed = 0usize;
        let mut remaining = deadlocked.clone();
        for &victim in &deadlocked {
            if !remaining.contains(&victim) {
                // An earlier kill already freed this one.
                continue;
            }
            self.journal
                .event(format!("Master terminating P{victim} to remove deadlock"));
            let _ = self.terminate_slot(victim, TerminationKind::Deadlock, sink);
            killed += 1;

            remaining = DeadlockDetector::deadlocked(&self.table, &self.ledger);
            if remaining.is_empty() {
                self.journal.event(format!(
                    "Deadlock resolved after terminating {killed} processes"
                ));
                break;
            }
        }
    }

    /// True when every slot is unused — half of the loop exit condition.
    pub fn idle(&self) -> bool {
        self.table.all_unused()
    }

    /// Emit the final statistics block and flush the journal.
    pub fn shutdown(&mut self) -> io::Result<()> {
        let stats = self.stats;
        self.journal.final_stats(&stats);
        self.journal.flush()
    }
}
