use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const ABORTED: u8 = 2;

/// Shared run flag for the capture and encode loops of one session.
///
/// Moves one way only: running → stopping → aborted (stopping may be
/// skipped). A stop lets the encode loop drain what capture already queued;
/// an abort makes it give up immediately.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to finish gracefully.
    ///
    /// Returns true only for the call that actually moved the token out of
    /// running; later calls and calls after an abort are no-ops.
    pub fn request_stop(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stop both loops without draining. Used when a pipeline stage fails.
    pub fn abort(&self) {
        self.state.fetch_max(ABORTED, Ordering::AcqRel);
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_aborted(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABORTED
    }
}
