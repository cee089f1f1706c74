//! Hosts the master event loop: launch pacing, message polling, worker
//! reaping and the shutdown paths. The master itself stays synchronous;
//! everything async lives here.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use resman_core::clock::SimTime;
use resman_core::infrastructure::{GrantSendError, GrantSink};
use resman_core::journal::Journal;
use resman_core::master::Master;
use resman_core::types::{ExternalId, Grant, Message, SimConfig};

use crate::worker;

/// Grant transport: one unbounded channel per live worker, routed by
/// external id.
#[derive(Default)]
struct RoutedGrantSink {
    routes: HashMap<ExternalId, mpsc::UnboundedSender<Grant>>,
}

impl RoutedGrantSink {
    fn register(&mut self, external_id: ExternalId) -> mpsc::UnboundedReceiver<Grant> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(external_id, tx);
        rx
    }
}

impl GrantSink for RoutedGrantSink {
    fn send(&mut self, grant: Grant) -> Result<(), GrantSendError> {
        match self.routes.get(&grant.external_id) {
            Some(tx) => tx.send(grant).map_err(|_| GrantSendError {
                external_id: grant.external_id,
            }),
            None => Err(GrantSendError {
                external_id: grant.external_id,
            }),
        }
    }
}

pub async fn run(config: SimConfig, log_file: &Path, wall_budget: Duration) -> io::Result<()> {
    let journal = Journal::open(log_file, config.verbose)?;
    let mut master = Master::new(config.clone(), journal);

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();
    let (clock_tx, clock_rx) = watch::channel(SimTime::ZERO);
    let mut sink = RoutedGrantSink::default();
    let mut workers: JoinSet<ExternalId> = JoinSet::new();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::Relaxed);
            }
        });
    }

    let started = Instant::now();
    let mut launched: u32 = 0;
    let mut next_external_id: ExternalId = 1;
    let mut next_launch_ms: u64 = config.launch_interval_ms;

    tracing::info!(
        workers = config.max_total_workers,
        concurrent = config.max_concurrent_workers,
        seed = config.seed,
        "simulation starting"
    );

    loop {
        if interrupted.load(Ordering::Relaxed) {
            tracing::info!("interrupt received, shutting down");
            break;
        }

        master.tick(&mut sink);
        let now = master.now();
        clock_tx.send_replace(now);

        // Launch pacing runs on simulated time, like everything else.
        if launched < config.max_total_workers
            && master.table().active_count() < config.max_concurrent_workers
            && now.as_millis() >= next_launch_ms
        {
            let external_id = next_external_id;
            if let Some(slot) = master.activate_worker(external_id) {
                next_external_id += 1;
                launched += 1;
                let grants = sink.register(external_id);
                let walk_cfg = worker::WalkConfig {
                    slot,
                    external_id,
                    resource_types: config.resource_types,
                    instances_per_type: config.instances_per_type,
                    seed: config.seed.wrapping_add(external_id),
                    start: now,
                };
                workers.spawn(worker::walk(
                    walk_cfg,
                    msg_tx.clone(),
                    clock_rx.clone(),
                    grants,
                ));
                tracing::debug!(slot, external_id, "worker launched");
            }
            next_launch_ms = now.as_millis() + config.launch_interval_ms;
        }

        // Reap exited workers. Terminate is idempotent, so a worker whose
        // terminate message already went through is a no-op here.
        while let Some(done) = workers.try_join_next() {
            if let Ok(external_id) = done {
                master.reap_worker(external_id, &mut sink);
            }
        }

        // Drop grant routes whose slots the master tore down (deadlock
        // victims included); the worker's pending receive resolves to
        // channel-closed and the task winds down.
        sink.routes
            .retain(|id, _| master.table().slot_of_external(*id).is_some());

        // At most one message per iteration.
        if let Ok(msg) = msg_rx.try_recv() {
            tracing::trace!(slot = msg.slot(), external_id = msg.external_id(), "dispatching");
            let _ = master.handle_message(&msg, &mut sink);
        }

        if launched >= config.max_total_workers && master.idle() {
            tracing::info!("worker quota exhausted and all slots unused");
            break;
        }
        if started.elapsed() >= wall_budget {
            tracing::info!("wall-clock budget exhausted");
            break;
        }

        tokio::task::yield_now().await;
    }

    // Kill survivors and reclaim whatever they still hold.
    workers.abort_all();
    let survivors: Vec<ExternalId> = sink.routes.keys().copied().collect();
    for external_id in survivors {
        master.reap_worker(external_id, &mut sink);
    }

    master.shutdown()?;
    tracing::info!(stats = ?master.stats(), "simulation finished");
    Ok(())
}
