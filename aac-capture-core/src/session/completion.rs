use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::cancellation::CancellationToken;
use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// One-shot terminal slot for a session, waited on by callers of
/// [`SessionHandle::wait`].
pub(crate) struct Completion {
    state: Mutex<SessionState>,
    finished: Condvar,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Recording),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// recording → stopping. Ignored in any other state.
    pub(crate) fn mark_stopping(&self) {
        let mut state = self.state.lock();
        if state.is_recording() {
            *state = SessionState::Stopping;
        }
    }

    /// Record the terminal outcome. Returns false if one was already recorded.
    pub(crate) fn finish(&self, outcome: Result<RecordingResult, RecorderError>) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = match outcome {
            Ok(result) => SessionState::Completed(Box::new(result)),
            Err(error) => SessionState::Failed(error),
        };
        drop(state);
        self.finished.notify_all();
        true
    }

    fn wait(&self) -> Result<RecordingResult, RecorderError> {
        let mut state = self.state.lock();
        while !state.is_terminal() {
            self.finished.wait(&mut state);
        }
        outcome_of(&state).unwrap_or_else(|| Err(RecorderError::Unknown("session has no outcome".into())))
    }

    fn wait_timeout(&self, timeout: Duration) -> Option<Result<RecordingResult, RecorderError>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_terminal() {
            if self.finished.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        outcome_of(&state)
    }
}

fn outcome_of(state: &SessionState) -> Option<Result<RecordingResult, RecorderError>> {
    match state {
        SessionState::Completed(result) => Some(Ok(result.as_ref().clone())),
        SessionState::Failed(error) => Some(Err(error.clone())),
        SessionState::Recording | SessionState::Stopping => None,
    }
}

/// Caller-side handle to one recording session.
///
/// Cheap to clone. Stopping through any clone stops the same session.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    token: CancellationToken,
    completion: Arc<Completion>,
    output_path: PathBuf,
}

impl SessionHandle {
    pub(crate) fn new(id: u64, token: CancellationToken, completion: Arc<Completion>, output_path: PathBuf) -> Self {
        Self {
            id,
            token,
            completion,
            output_path,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.completion.state()
    }

    /// The `.aac` file this session writes into.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Request a graceful stop. Non-blocking.
    ///
    /// Capture stops reading, the encode loop drains every chunk already
    /// queued, and then the listener is notified. Returns false if the
    /// session was already stopping or finished.
    pub fn stop(&self) -> bool {
        if !self.token.request_stop() {
            return false;
        }
        self.completion.mark_stopping();
        log::info!("Session {} stopping, draining queued audio", self.id);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.completion.state().is_terminal()
    }

    /// Block until the session has torn down.
    pub fn wait(&self) -> Result<RecordingResult, RecorderError> {
        self.completion.wait()
    }

    /// Block up to `timeout`; None if the session is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<RecordingResult, RecorderError>> {
        self.completion.wait_timeout(timeout)
    }

    /// The terminal outcome, if the session has finished.
    pub fn outcome(&self) -> Option<Result<RecordingResult, RecorderError>> {
        outcome_of(&self.completion.state.lock())
    }

    #[cfg(test)]
    pub(crate) fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.completion.state().as_str())
            .field("output_path", &self.output_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn handle() -> SessionHandle {
        SessionHandle::new(7, CancellationToken::new(), Arc::new(Completion::new()), PathBuf::from("a.aac"))
    }

    #[test]
    fn stop_moves_to_stopping_once() {
        let handle = handle();
        assert!(handle.state().is_recording());

        assert!(handle.stop());
        assert!(handle.state().is_stopping());
        assert!(!handle.stop());
        assert!(!handle.is_finished());
    }

    #[test]
    fn only_first_outcome_is_kept() {
        let handle = handle();
        let completion = handle.completion();

        assert!(completion.finish(Err(RecorderError::Device("gone".into()))));
        assert!(!completion.finish(Err(RecorderError::Encoder("late".into()))));

        assert_eq!(handle.outcome(), Some(Err(RecorderError::Device("gone".into()))));
        assert_eq!(handle.state().as_str(), "failed");
    }

    #[test]
    fn stop_after_finish_does_not_regress_state() {
        let handle = handle();
        handle.completion().finish(Err(RecorderError::Unknown("x".into())));
        handle.stop();
        assert!(handle.is_finished());
    }

    #[test]
    fn wait_blocks_until_finished() {
        let handle = handle();
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);

        let finisher = {
            let completion = Arc::clone(handle.completion());
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                completion.finish(Err(RecorderError::Sink("disk full".into())));
            })
        };

        assert_eq!(handle.wait(), Err(RecorderError::Sink("disk full".into())));
        finisher.join().unwrap();
    }

    #[test]
    fn debug_shows_state_name() {
        let rendered = format!("{:?}", handle());
        assert!(rendered.contains("recording"));
        assert!(rendered.contains("id: 7"));
    }
}
