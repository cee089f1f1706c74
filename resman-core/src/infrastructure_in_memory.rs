use crate::infrastructure::{GrantSendError, GrantSink};
use crate::types::Grant;

/// Grant sink that buffers everything in emission order. Used by tests
/// and by the replay subcommand, where no worker is listening.
#[derive(Debug, Default)]
pub struct BufferedGrantSink {
    pub sent: Vec<Grant>,
}

impl BufferedGrantSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything emitted since the last drain.
    pub fn drain(&mut self) -> Vec<Grant> {
        std::mem::take(&mut self.sent)
    }
}

impl GrantSink for BufferedGrantSink {
    fn send(&mut self, grant: Grant) -> Result<(), GrantSendError> {
        self.sent.push(grant);
        Ok(())
    }
}
