use crate::clock::SimTime;
use crate::types::{ExternalId, ResourceId, SlotIndex, SlotState};

/// One fixed-index record in the process table.
#[derive(Debug, Clone)]
pub struct Slot {
    pub state: SlotState,
    /// `None` exactly while the slot is unused.
    pub external_id: Option<ExternalId>,
    /// Instances of each resource type currently held.
    pub allocated: Vec<u32>,
    /// Outstanding unsatisfied request. At most one resource type is
    /// non-zero, and only while the slot is blocked.
    pub request: Vec<u32>,
    /// Clock reading at activation.
    pub started_at: SimTime,
    /// FIFO sequence number assigned on the Ready-to-Blocked transition.
    pub block_order: Option<u64>,
}

impl Slot {
    fn new(resource_types: usize) -> Self {
        Self {
            state: SlotState::Unused,
            external_id: None,
            allocated: vec![0; resource_types],
            request: vec![0; resource_types],
            started_at: SimTime::ZERO,
            block_order: None,
        }
    }

    /// Total instances held across all resource types.
    pub fn total_held(&self) -> u32 {
        self.allocated.iter().sum()
    }

    /// The single outstanding request, if any.
    pub fn outstanding_request(&self) -> Option<(ResourceId, u32)> {
        self.request
            .iter()
            .position(|&q| q > 0)
            .map(|r| (r, self.request[r]))
    }

    /// Occupied in any live sense: neither unused nor torn down.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, SlotState::Unused | SlotState::Terminated)
    }
}

/// Fixed array of worker slots. Allocated once at startup; slots are only
/// ever activated and reclaimed, never added or removed.
#[derive(Debug)]
pub struct ProcessTable {
    slots: Vec<Slot>,
}

impl ProcessTable {
    pub fn new(max_slots: usize, resource_types: usize) -> Self {
        Self {
            slots: (0..max_slots).map(|_| Slot::new(resource_types)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bounds-checked lookup for untrusted slot indexes from messages.
    pub fn get(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Internal lookup; the index is known valid.
    pub fn slot(&self, index: SlotIndex) -> &Slot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: SlotIndex) -> &mut Slot {
        &mut self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Slot)> {
        self.slots.iter().enumerate()
    }

    /// Lowest-index unused slot, if any.
    pub fn find_unused(&self) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.state == SlotState::Unused)
    }

    /// Claim a slot for a newly launched worker.
    pub fn activate(&mut self, index: SlotIndex, external_id: ExternalId, now: SimTime) {
        let slot = &mut self.slots[index];
        debug_assert_eq!(slot.state, SlotState::Unused);
        slot.state = SlotState::Ready;
        slot.external_id = Some(external_id);
        slot.started_at = now;
        slot.block_order = None;
        slot.allocated.fill(0);
        slot.request.fill(0);
    }

    /// Reclaim a slot, returning the held counts so the caller can credit
    /// the ledger. Idempotent: an unused slot yields all zeroes.
    pub fn deactivate(&mut self, index: SlotIndex) -> Vec<u32> {
        let slot = &mut self.slots[index];
        let held = std::mem::replace(&mut slot.allocated, vec![0; slot.request.len()]);
        slot.request.fill(0);
        slot.state = SlotState::Unused;
        slot.external_id = None;
        slot.block_order = None;
        held
    }

    /// Slot currently owned by the given worker identity.
    pub fn slot_of_external(&self, external_id: ExternalId) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|s| s.is_active() && s.external_id == Some(external_id))
    }

    /// Number of occupied slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// True when every slot is unused.
    pub fn all_unused(&self) -> bool {
        self.slots.iter().all(|s| s.state == SlotState::Unused)
    }

    /// Blocked slots waiting on `resource`, oldest `block_order` first.
    /// Never ordered by slot index.
    pub fn blocked_waiters_for(&self, resource: ResourceId) -> Vec<SlotIndex> {
        let mut waiters: Vec<SlotIndex> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Blocked && s.request[resource] > 0)
            .map(|(i, _)| i)
            .collect();
        waiters.sort_by_key(|&i| self.slots[i].block_order);
        waiters
    }
}
