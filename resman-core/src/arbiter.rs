use thiserror::Error;

use crate::clock::SimTime;
use crate::infrastructure::GrantSink;
use crate::journal::Journal;
use crate::ledger::ResourceLedger;
use crate::stats::RunStats;
use crate::table::ProcessTable;
use crate::types::{ExternalId, Grant, Message, ResourceId, SlotIndex, SlotState};

/// A worker message the arbiter refused. The table and ledger are left
/// exactly as they were; the message is journalled and dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("slot index {slot} out of range")]
    SlotOutOfRange { slot: SlotIndex },
    #[error("resource id {resource} out of range in message from P{slot}")]
    ResourceOutOfRange { slot: SlotIndex, resource: ResourceId },
    #[error("message for P{slot} from unknown identity {external_id}")]
    IdentityMismatch {
        slot: SlotIndex,
        external_id: ExternalId,
    },
    #[error("zero-quantity message from P{slot}")]
    ZeroQuantity { slot: SlotIndex },
    #[error("request from P{slot} while {state:?}")]
    RequestWhileNotReady { slot: SlotIndex, state: SlotState },
    #[error("P{slot} asked for {quantity} of R{resource}, exceeding the per-type total")]
    RequestBeyondTotal {
        slot: SlotIndex,
        resource: ResourceId,
        quantity: u32,
    },
    #[error("P{slot} released {quantity} of R{resource} but holds {held}")]
    ReleaseUnheld {
        slot: SlotIndex,
        resource: ResourceId,
        quantity: u32,
        held: u32,
    },
}

/// How a handled message changed the allocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Request satisfied synchronously.
    Granted,
    /// Request parked; the worker waits on its grant channel.
    Blocked,
    /// Release applied; `unblocked` waiters were satisfied by the sweep.
    Released { unblocked: usize },
    /// Slot reclaimed; its resources returned and sweeps run.
    Terminated,
    /// Terminate for an already-unused slot. No state change.
    AlreadyUnused,
}

/// Why a slot is being torn down. Selects the statistics counter and the
/// journal wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    Normal,
    Deadlock,
}

/// Everything the arbiter mutates while handling one message.
pub struct ArbiterCtx<'a> {
    pub table: &'a mut ProcessTable,
    pub ledger: &'a mut ResourceLedger,
    pub stats: &'a mut RunStats,
    pub journal: &'a mut Journal,
    pub sink: &'a mut dyn GrantSink,
    pub now: SimTime,
}

/// Consumes worker messages and keeps the allocation state lawful: one
/// message per call, grants all-or-nothing, conservation holding at
/// every return.
#[derive(Debug, Default)]
pub struct Arbiter {
    next_block_seq: u64,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(
        &mut self,
        msg: &Message,
        ctx: &mut ArbiterCtx<'_>,
    ) -> Result<Disposition, ProtocolViolation> {
        match *msg {
            Message::Request {
                slot,
                external_id,
                resource,
                quantity,
            } => self.handle_request(slot, external_id, resource, quantity, ctx),
            Message::Release {
                slot,
                external_id,
                resource,
                quantity,
            } => self.handle_release(slot, external_id, resource, quantity, ctx),
            Message::Terminate { slot, external_id } => {
                if ctx.table.get(slot).is_none() {
                    return Err(ProtocolViolation::SlotOutOfRange { slot });
                }
                if ctx.table.slot(slot).state == SlotState::Unused {
                    // Idempotency: the reap path may race a terminate
                    // message for the same worker.
                    return Ok(Disposition::AlreadyUnused);
                }
                check_identity(slot, external_id, ctx.table)?;
                self.terminate(slot, TerminationKind::Normal, ctx)
            }
        }
    }

    fn handle_request(
        &mut self,
        slot: SlotIndex,
        external_id: ExternalId,
        resource: ResourceId,
        quantity: u32,
        ctx: &mut ArbiterCtx<'_>,
    ) -> Result<Disposition, ProtocolViolation> {
        check_addressing(slot, external_id, resource, ctx)?;
        if quantity == 0 {
            return Err(ProtocolViolation::ZeroQuantity { slot });
        }

        let state = ctx.table.slot(slot).state;
        if state != SlotState::Ready {
            // Also enforces the single-outstanding-request rule: a
            // blocked slot cannot ask again.
            return Err(ProtocolViolation::RequestWhileNotReady { slot, state });
        }
        // Feasibility: holdings plus request may never exceed the
        // per-type total, so headroom is what is left of it.
        let headroom = ctx.ledger.total(resource) - ctx.table.slot(slot).allocated[resource];
        if quantity > headroom {
            return Err(ProtocolViolation::RequestBeyondTotal {
                slot,
                resource,
                quantity,
            });
        }

        let now = ctx.now;
        ctx.journal.detail(format!(
            "Master has detected Process P{slot} requesting R{resource} at time {now}"
        ));

        if ctx.ledger.can_grant(resource, quantity) {
            ctx.ledger.grant(resource, quantity);
            ctx.table.slot_mut(slot).allocated[resource] += quantity;
            ctx.stats.grants_immediate += 1;
            ctx.journal.detail(format!(
                "Master granting P{slot} request R{resource} at time {now}"
            ));
            emit_grant(
                ctx,
                Grant {
                    slot,
                    external_id,
                    resource,
                    quantity,
                },
            );
            Ok(Disposition::Granted)
        } else {
            let entry = ctx.table.slot_mut(slot);
            entry.state = SlotState::Blocked;
            entry.request[resource] += quantity;
            entry.block_order = Some(self.next_seq());
            ctx.journal.detail(format!(
                "Master: no instances of R{resource} available, P{slot} added to wait queue at time {now}"
            ));
            Ok(Disposition::Blocked)
        }
    }

    fn handle_release(
        &mut self,
        slot: SlotIndex,
        external_id: ExternalId,
        resource: ResourceId,
        quantity: u32,
        ctx: &mut ArbiterCtx<'_>,
    ) -> Result<Disposition, ProtocolViolation> {
        check_addressing(slot, external_id, resource, ctx)?;
        if quantity == 0 {
            return Err(ProtocolViolation::ZeroQuantity { slot });
        }

        let held = ctx.table.slot(slot).allocated[resource];
        if quantity > held {
            return Err(ProtocolViolation::ReleaseUnheld {
                slot,
                resource,
                quantity,
                held,
            });
        }

        let now = ctx.now;
        ctx.journal.detail(format!(
            "Master has acknowledged Process P{slot} releasing R{resource}:{quantity} at time {now}"
        ));

        ctx.table.slot_mut(slot).allocated[resource] -= quantity;
        ctx.ledger.restore(resource, quantity);

        let unblocked = self.sweep(resource, ctx);
        Ok(Disposition::Released { unblocked })
    }

    /// Tear down a slot: journal it, return everything it holds, wake the
    /// waiters the freed resources can satisfy, reclaim the slot.
    ///
    /// The deadlock engine uses this same path for its victims.
    pub fn terminate(
        &mut self,
        slot: SlotIndex,
        kind: TerminationKind,
        ctx: &mut ArbiterCtx<'_>,
    ) -> Result<Disposition, ProtocolViolation> {
        if ctx.table.get(slot).is_none() {
            return Err(ProtocolViolation::SlotOutOfRange { slot });
        }
        if ctx.table.slot(slot).state == SlotState::Unused {
            return Ok(Disposition::AlreadyUnused);
        }

        let now = ctx.now;
        let cause = match kind {
            TerminationKind::Normal => "normally",
            TerminationKind::Deadlock => "due to deadlock",
        };
        ctx.journal
            .event(format!("Process P{slot} terminated {cause} at time {now}"));

        let held = ctx.table.deactivate(slot);
        if held.iter().any(|&q| q > 0) {
            let list: Vec<String> = held
                .iter()
                .enumerate()
                .filter(|(_, &q)| q > 0)
                .map(|(r, q)| format!("R{r}:{q}"))
                .collect();
            ctx.journal
                .event(format!("Resources released by P{slot}: {}", list.join(" ")));
        }
        ctx.ledger.restore_all(&held);

        match kind {
            TerminationKind::Normal => ctx.stats.terminations_normal += 1,
            TerminationKind::Deadlock => ctx.stats.terminations_deadlock += 1,
        }

        for (resource, &quantity) in held.iter().enumerate() {
            if quantity > 0 {
                self.sweep(resource, ctx);
            }
        }

        Ok(Disposition::Terminated)
    }

    /// Re-grant sweep for one resource: satisfy blocked waiters oldest
    /// `block_order` first, full quantity or skip, until the availability
    /// can serve no remaining waiter.
    fn sweep(&mut self, resource: ResourceId, ctx: &mut ArbiterCtx<'_>) -> usize {
        let mut unblocked = 0;
        for waiter in ctx.table.blocked_waiters_for(resource) {
            if ctx.ledger.available(resource) == 0 {
                break;
            }
            let wanted = ctx.table.slot(waiter).request[resource];
            if !ctx.ledger.can_grant(resource, wanted) {
                continue;
            }

            ctx.ledger.grant(resource, wanted);
            let entry = ctx.table.slot_mut(waiter);
            entry.allocated[resource] += wanted;
            entry.request[resource] = 0;
            entry.state = SlotState::Ready;
            entry.block_order = None;
            let external_id = entry.external_id;

            ctx.stats.grants_after_wait += 1;
            let now = ctx.now;
            ctx.journal.detail(format!(
                "Master granting P{waiter} previously blocked request R{resource}:{wanted} at time {now}"
            ));
            if let Some(external_id) = external_id {
                emit_grant(
                    ctx,
                    Grant {
                        slot: waiter,
                        external_id,
                        resource,
                        quantity: wanted,
                    },
                );
            }
            unblocked += 1;
        }
        unblocked
    }

    fn next_seq(&mut self) -> u64 {
        self.next_block_seq += 1;
        self.next_block_seq
    }
}

fn check_addressing(
    slot: SlotIndex,
    external_id: ExternalId,
    resource: ResourceId,
    ctx: &ArbiterCtx<'_>,
) -> Result<(), ProtocolViolation> {
    if ctx.table.get(slot).is_none() {
        return Err(ProtocolViolation::SlotOutOfRange { slot });
    }
    if resource >= ctx.ledger.resource_types() {
        return Err(ProtocolViolation::ResourceOutOfRange { slot, resource });
    }
    check_identity(slot, external_id, ctx.table)
}

fn check_identity(
    slot: SlotIndex,
    external_id: ExternalId,
    table: &ProcessTable,
) -> Result<(), ProtocolViolation> {
    if table.slot(slot).external_id != Some(external_id) {
        return Err(ProtocolViolation::IdentityMismatch { slot, external_id });
    }
    Ok(())
}

fn emit_grant(ctx: &mut ArbiterCtx<'_>, grant: Grant) {
    if let Err(err) = ctx.sink.send(grant) {
        // The allocation stays committed; the worker recovers by
        // retrying its receive or by being reaped.
        tracing::warn!(slot = grant.slot, %err, "grant delivery failed");
    }
}
