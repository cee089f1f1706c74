use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::clock::SimTime;
use crate::ledger::ResourceLedger;
use crate::stats::RunStats;
use crate::table::ProcessTable;
use crate::types::MAX_LOG_LINES;

/// Line-oriented event log.
///
/// Caps output at [`MAX_LOG_LINES`] lines and silently drops the rest.
/// Per-request entries honor the verbose flag; terminations, snapshots
/// and deadlock events always log.
pub struct Journal {
    sink: Box<dyn Write + Send>,
    lines_written: usize,
    verbose: bool,
}

impl Journal {
    /// Open (or truncate) the log file at `path`. A failure here is a
    /// setup failure: the caller reports it and exits non-zero.
    pub fn open(path: &Path, verbose: bool) -> io::Result<Journal> {
        let file = File::create(path)?;
        Ok(Self::with_sink(Box::new(BufWriter::new(file)), verbose))
    }

    pub fn with_sink(sink: Box<dyn Write + Send>, verbose: bool) -> Journal {
        Journal {
            sink,
            lines_written: 0,
            verbose,
        }
    }

    /// Journal that discards everything. Handy for tests that only
    /// assert on kernel state.
    pub fn disabled() -> Journal {
        Self::with_sink(Box::new(io::sink()), false)
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Always-logged event line.
    pub fn event(&mut self, line: impl AsRef<str>) {
        self.write_line(line.as_ref());
    }

    /// Per-request line, suppressed when verbose is off.
    pub fn detail(&mut self, line: impl AsRef<str>) {
        if self.verbose {
            self.write_line(line.as_ref());
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.lines_written >= MAX_LOG_LINES {
            return;
        }
        if let Err(err) = writeln!(self.sink, "{line}") {
            tracing::warn!(%err, "journal write failed");
            return;
        }
        self.lines_written += 1;
    }

    /// Resource-table snapshot: one row per occupied slot plus the
    /// availability row. Always logged.
    pub fn snapshot(&mut self, now: SimTime, table: &ProcessTable, ledger: &ResourceLedger) {
        let resources = ledger.resource_types();

        self.event("");
        self.event(format!("Current Resource Table (Time {now}):"));

        let mut header = String::from("   | ");
        for r in 0..resources {
            header.push_str(&format!("R{r} "));
        }
        self.event(header);
        self.event(format!("---+{}", "---".repeat(resources)));

        for (i, slot) in table.iter() {
            if !slot.is_active() {
                continue;
            }
            let mut row = format!("P{i} | ");
            for r in 0..resources {
                row.push_str(&format!("{:<2} ", slot.allocated[r]));
            }
            self.event(row);
        }

        let mut avail = String::from("AV | ");
        for r in 0..resources {
            avail.push_str(&format!("{:<2} ", ledger.available(r)));
        }
        self.event(avail);
    }

    /// Final-statistics block emitted at shutdown.
    pub fn final_stats(&mut self, stats: &RunStats) {
        self.event("");
        self.event("--- Final Statistics ---");
        self.event(format!("Total workers launched: {}", stats.workers_launched));
        self.event(format!(
            "Requests granted immediately: {}",
            stats.grants_immediate
        ));
        self.event(format!(
            "Requests granted after waiting: {}",
            stats.grants_after_wait
        ));
        self.event(format!(
            "Processes terminated normally: {}",
            stats.terminations_normal
        ));
        self.event(format!(
            "Processes terminated due to deadlock: {}",
            stats.terminations_deadlock
        ));
        self.event(format!(
            "Deadlock detection algorithm runs: {}",
            stats.deadlock_runs
        ));
        if stats.deadlock_runs > 0 {
            self.event(format!(
                "Average processes in deadlock per detection: {:.2}",
                stats.avg_deadlocked_per_run()
            ));
        }
        if stats.processes_in_deadlock_total > 0 {
            self.event(format!(
                "Percentage of deadlocked processes terminated: {:.2}%",
                stats.deadlock_termination_pct()
            ));
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
