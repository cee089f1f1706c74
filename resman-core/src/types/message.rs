use serde::{Deserialize, Serialize};

use super::{ExternalId, ResourceId, SlotIndex};

/// One inbound record on the worker-to-master channel.
///
/// Any transport that preserves record boundaries works; the kernel never
/// sees the transport, only these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Ask for `quantity` instances of a single resource type. Grants are
    /// all-or-nothing: the worker blocks until the full amount is free.
    Request {
        slot: SlotIndex,
        external_id: ExternalId,
        resource: ResourceId,
        quantity: u32,
    },
    /// Return `quantity` held instances of a single resource type.
    Release {
        slot: SlotIndex,
        external_id: ExternalId,
        resource: ResourceId,
        quantity: u32,
    },
    /// Worker is done; the master reclaims everything the slot holds.
    Terminate {
        slot: SlotIndex,
        external_id: ExternalId,
    },
}

impl Message {
    pub fn slot(&self) -> SlotIndex {
        match *self {
            Message::Request { slot, .. }
            | Message::Release { slot, .. }
            | Message::Terminate { slot, .. } => slot,
        }
    }

    pub fn external_id(&self) -> ExternalId {
        match *self {
            Message::Request { external_id, .. }
            | Message::Release { external_id, .. }
            | Message::Terminate { external_id, .. } => external_id,
        }
    }
}

/// Outbound notification that a request has been satisfied in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub slot: SlotIndex,
    pub external_id: ExternalId,
    pub resource: ResourceId,
    pub quantity: u32,
}
