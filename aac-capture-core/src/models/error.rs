use thiserror::Error;

/// Errors that can end a recording session.
///
/// Every variant is terminal for the session that produced it. The type is
/// `Clone` so the same value can be stored in the session state, returned from
/// [`SessionHandle::wait`](crate::SessionHandle::wait) and handed to a listener.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// The capture device could not be opened or a read failed.
    #[error("capture device error: {0}")]
    Device(String),

    /// The block encoder rejected a configure/acquire/submit/poll call.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Writing, flushing or closing an output sink failed.
    #[error("sink error: {0}")]
    Sink(String),

    /// Stopping or releasing the device or encoder failed after the stream drained.
    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// `begin` was called from a listener while another thread held the
    /// controller and could be waiting on that listener's session.
    #[error("session controller busy: {0}")]
    SessionBusy(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl RecorderError {
    /// Wrap an I/O error coming from one of the output sinks.
    pub fn sink(err: std::io::Error) -> Self {
        Self::Sink(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_stage() {
        let err = RecorderError::Device("read returned -3".into());
        assert_eq!(err.to_string(), "capture device error: read returned -3");

        let err = RecorderError::Teardown("encoder release".into());
        assert!(err.to_string().starts_with("teardown failed"));
    }

    #[test]
    fn sink_wraps_io_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(RecorderError::sink(io), RecorderError::Sink("disk full".into()));
    }
}
