//! # aac-capture-core
//!
//! Platform-agnostic microphone → AAC/ADTS recording pipeline.
//!
//! A [`SessionController`] runs one recording session at a time. Each session
//! reads PCM from a [`CaptureDevice`] on a capture thread, hands chunks over a
//! bounded [`HandoffQueue`] to an encode thread that drives a [`BlockEncoder`],
//! prefixes every compressed unit with a 7-byte ADTS header and appends it to
//! an `.aac` file. Stopping drains everything already captured before the
//! device and encoder are released; the outcome is reported exactly once.
//! Platform backends (Windows WASAPI + Media Foundation) implement the traits.
//!
//! ## Architecture
//!
//! ```text
//! aac-capture-core (this crate)
//! ├── traits/       ← CaptureDevice, RawCaptureSource, EncoderProvider, BlockEncoder, RecordingListener
//! ├── models/       ← RecorderError, RecorderConfiguration, SessionState, RecordingResult, buffer types
//! ├── processing/   ← ADTS header builder, HandoffQueue, PCM conversion
//! ├── session/      ← SessionController, SessionHandle, CancellationToken, capture/encode loops
//! └── storage/      ← StreamWriter, PathAllocator, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AacProfile, AudioChunk, AudioSource, AudioTransportType, BufferFlags, CaptureFormat, EncoderFormat,
    InputBufferIndex, OutputBufferIndex, OutputBufferInfo,
};
pub use models::config::RecorderConfiguration;
pub use models::error::RecorderError;
pub use models::recording_result::{RecordingMetadata, RecordingResult, SessionStats};
pub use models::state::SessionState;
pub use processing::handoff_queue::HandoffQueue;
pub use processing::pcm_convert::PcmConverter;
pub use session::cancellation::CancellationToken;
pub use session::completion::SessionHandle;
pub use session::controller::SessionController;
pub use storage::stream_writer::{FinishedStream, StreamWriter};
pub use traits::block_encoder::{BlockEncoder, EncoderProvider};
pub use traits::capture_source::{CaptureDevice, RawCaptureSource};
pub use traits::recording_listener::RecordingListener;
