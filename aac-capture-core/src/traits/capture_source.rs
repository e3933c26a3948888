use crate::models::audio_models::{AudioSource, CaptureFormat};
use crate::models::error::RecorderError;

/// A platform microphone that can be opened once per recording session.
///
/// Implemented by:
/// - `WasapiCaptureDevice` (Windows, `aac-capture-windows`)
pub trait CaptureDevice: Send + Sync {
    type Source: RawCaptureSource + 'static;

    /// Open the device for 16-bit PCM capture in `format`.
    ///
    /// The returned source is ready to `read`; failures map to
    /// [`RecorderError::Device`].
    fn open(&self, format: &CaptureFormat) -> Result<Self::Source, RecorderError>;

    /// Information about the endpoint backing this device.
    fn device_info(&self) -> AudioSource;
}

/// An open capture stream, driven by exactly one thread at a time.
///
/// The capture loop only calls `read`; `stop` and `release` are issued by
/// session teardown once the encode loop has drained everything captured.
pub trait RawCaptureSource: Send {
    /// Read up to `buffer.len()` bytes of interleaved PCM.
    ///
    /// Returning `Ok(0)` is allowed and means no audio was ready; the
    /// capture loop calls `read` again in a tight loop, so implementations
    /// should wait briefly for data rather than return immediately forever.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, RecorderError>;

    fn stop(&mut self) -> Result<(), RecorderError>;

    fn release(&mut self) -> Result<(), RecorderError>;
}
