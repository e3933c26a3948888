use super::error::RecorderError;
use super::recording_result::RecordingResult;

/// Lifecycle of one recording session.
///
/// State transitions:
/// ```text
/// recording → stopping → completed / failed
///     ↓                        ↑
///     └──── (pipeline error) ──┘
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Recording,
    /// Stop was requested; the encode loop is draining the hand-off queue.
    Stopping,
    Completed(Box<RecordingResult>),
    Failed(RecorderError),
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}
