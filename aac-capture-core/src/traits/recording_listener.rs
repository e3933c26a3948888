use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;

/// Terminal notification for one recording session.
///
/// Exactly one of the two methods is called per session, once, from the
/// session's control thread (never from the capture or encode threads).
/// Implementations should marshal to a UI thread if needed.
pub trait RecordingListener: Send + Sync {
    /// The stream drained and the encoded file at `result.file_path` is complete.
    fn on_stop(&self, result: &RecordingResult) {
        let _ = result;
    }

    /// The session failed; any output file may be incomplete.
    fn on_error(&self, error: &RecorderError) {
        let _ = error;
    }
}
