use std::time::Duration;

use crate::models::audio_models::{EncoderFormat, InputBufferIndex, OutputBufferIndex, OutputBufferInfo};
use crate::models::error::RecorderError;

/// Creates one fresh encoder per recording session.
pub trait EncoderProvider: Send + Sync {
    type Encoder: BlockEncoder + 'static;

    fn create_encoder(&self) -> Result<Self::Encoder, RecorderError>;
}

/// Stateful AAC block encoder driven through an indexed buffer pool.
///
/// Protocol, per chunk of PCM:
/// 1. `acquire_input_buffer` → index (None if no slot freed up in time)
/// 2. fill `input_buffer(index)`, then `submit_input(index, len)`
/// 3. `poll_output_buffer` until None; for each ready unit read
///    `output_buffer(info.index)[info.offset..][..info.size]` and
///    `release_output_buffer(info.index)`
///
/// Every acquired input index must be submitted and every polled output
/// index must be released, including on error paths. Submitting zero bytes
/// hands an input buffer back without producing output.
pub trait BlockEncoder: Send {
    fn configure(&mut self, format: &EncoderFormat) -> Result<(), RecorderError>;

    fn start(&mut self) -> Result<(), RecorderError>;

    /// Wait for a free input buffer. `None` as timeout waits indefinitely.
    fn acquire_input_buffer(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<InputBufferIndex>, RecorderError>;

    fn input_buffer(&mut self, index: InputBufferIndex) -> Result<&mut [u8], RecorderError>;

    /// Queue the first `len` bytes of the input buffer for encoding.
    fn submit_input(&mut self, index: InputBufferIndex, len: usize) -> Result<(), RecorderError>;

    /// Wait up to `timeout` for an encoded unit.
    fn poll_output_buffer(&mut self, timeout: Duration) -> Result<Option<OutputBufferInfo>, RecorderError>;

    fn output_buffer(&self, index: OutputBufferIndex) -> Result<&[u8], RecorderError>;

    fn release_output_buffer(&mut self, index: OutputBufferIndex) -> Result<(), RecorderError>;

    fn stop(&mut self) -> Result<(), RecorderError>;

    fn release(&mut self) -> Result<(), RecorderError>;
}
