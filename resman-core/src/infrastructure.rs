use thiserror::Error;

use crate::types::{ExternalId, Grant};

/// Failure to deliver a grant notification. The allocation is already
/// committed when this surfaces; the ledger is never rolled back on a
/// send failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("grant channel unavailable for worker {external_id}")]
pub struct GrantSendError {
    pub external_id: ExternalId,
}

/// Contract for delivering grant notifications back to workers.
///
/// The master emits exactly one grant per satisfied request. Delivery is
/// non-blocking; the channel is assumed to have capacity.
pub trait GrantSink {
    fn send(&mut self, grant: Grant) -> Result<(), GrantSendError>;
}
