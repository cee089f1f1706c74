//! The worker side of the protocol: a random walk over request, release
//! and terminate, blocking on its grant channel after every request. The
//! master only ever sees the messages this task sends.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};

use resman_core::clock::SimTime;
use resman_core::types::{ExternalId, Grant, Message, ResourceId, SlotIndex};

/// Upper bound between walk actions, in simulated ns.
const ACTION_BOUND_NS: u64 = 250_000_000;
/// Interval between lifetime checks, in simulated ns.
const LIFETIME_CHECK_NS: u64 = 250_000_000;
/// Minimum simulated lifetime before a worker may terminate.
const MIN_LIFETIME_NS: u64 = 1_000_000_000;
/// Bias toward requesting over releasing.
const REQUEST_PROBABILITY: f64 = 0.85;
/// Chance to terminate at each lifetime check.
const TERMINATE_PROBABILITY: f64 = 0.10;

pub struct WalkConfig {
    pub slot: SlotIndex,
    pub external_id: ExternalId,
    pub resource_types: usize,
    pub instances_per_type: u32,
    pub seed: u64,
    pub start: SimTime,
}

pub async fn walk(
    cfg: WalkConfig,
    to_master: mpsc::UnboundedSender<Message>,
    mut clock: watch::Receiver<SimTime>,
    mut grants: mpsc::UnboundedReceiver<Grant>,
) -> ExternalId {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut held = vec![0u32; cfg.resource_types];

    let retire_after = cfg.start.plus_nanos(MIN_LIFETIME_NS);
    let mut next_action = cfg.start.plus_nanos(rng.random_range(0..ACTION_BOUND_NS));
    let mut next_lifetime_check = cfg.start.plus_nanos(LIFETIME_CHECK_NS);

    loop {
        // The published clock is read-only and may be stale; it is only
        // used for relative pacing.
        let now = *clock.borrow_and_update();
        if now < next_action && now < next_lifetime_check {
            if clock.changed().await.is_err() {
                break;
            }
            continue;
        }

        if now >= next_lifetime_check {
            next_lifetime_check = now.plus_nanos(LIFETIME_CHECK_NS);
            if now >= retire_after && rng.random_bool(TERMINATE_PROBABILITY) {
                let _ = to_master.send(Message::Terminate {
                    slot: cfg.slot,
                    external_id: cfg.external_id,
                });
                break;
            }
        }

        if now >= next_action {
            next_action = now.plus_nanos(rng.random_range(0..ACTION_BOUND_NS));
            let total_held: u32 = held.iter().sum();

            if total_held == 0 || rng.random_bool(REQUEST_PROBABILITY) {
                let resource: ResourceId = rng.random_range(0..cfg.resource_types);
                if held[resource] >= cfg.instances_per_type {
                    continue;
                }
                let sent = to_master.send(Message::Request {
                    slot: cfg.slot,
                    external_id: cfg.external_id,
                    resource,
                    quantity: 1,
                });
                if sent.is_err() {
                    break;
                }
                // Block until the master satisfies the request in full.
                match grants.recv().await {
                    Some(grant) => held[grant.resource] += grant.quantity,
                    // Channel closed: the master terminated this slot.
                    None => break,
                }
            } else if let Some(resource) = held.iter().position(|&q| q > 0) {
                let quantity = held[resource];
                let sent = to_master.send(Message::Release {
                    slot: cfg.slot,
                    external_id: cfg.external_id,
                    resource,
                    quantity,
                });
                if sent.is_err() {
                    break;
                }
                held[resource] = 0;
            }
        }
    }

    cfg.external_id
}
