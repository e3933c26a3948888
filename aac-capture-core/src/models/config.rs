use std::path::PathBuf;
use std::time::Duration;

use super::audio_models::{AacProfile, CaptureFormat, EncoderFormat};
use crate::processing::adts;

/// Lowest device buffer size ever requested from a capture device.
pub const MIN_BUFFER_FLOOR: usize = 2048;

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfiguration {
    /// Capture and encode sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Channel count (default: 1). Written into the ADTS channel configuration.
    pub channels: u16,

    /// PCM bit depth. Only 16 is supported.
    pub bit_depth: u16,

    /// AAC target bit rate in bits per second (default: 96000).
    pub bit_rate: u32,

    pub profile: AacProfile,

    /// Bytes read from the device per chunk (default: 2048).
    pub chunk_size: usize,

    /// Largest input the encoder must accept in one buffer (default: 8192).
    pub max_input_size: usize,

    /// Device buffer size hint; raised to [`MIN_BUFFER_FLOOR`] when smaller.
    pub min_buffer_size: usize,

    /// Hand-off queue capacity in chunks (default: 10).
    pub queue_capacity: usize,

    /// Directory for the encoded `.aac` files.
    pub output_directory: PathBuf,

    /// Directory for raw `.pcm` mirrors of the captured stream, or None to disable.
    pub debug_raw_directory: Option<PathBuf>,

    /// Wait for a free encoder input buffer. None blocks until one is available.
    pub input_timeout: Option<Duration>,

    /// Bounded wait per encoder output poll (default: 10ms).
    pub output_poll_timeout: Duration,

    /// Bounded wait per hand-off queue pop (default: 50ms).
    pub pop_timeout: Duration,

    /// Write a `.metadata.json` sidecar next to each finished recording.
    pub write_metadata: bool,
}

impl RecorderConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if adts::sampling_frequency_index(self.sample_rate).is_none() {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if !(1..=7).contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.bit_depth != 16 {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if self.bit_rate == 0 {
            return Err("bit rate must be positive".into());
        }
        if self.chunk_size == 0 {
            return Err("chunk size must be positive".into());
        }
        if self.chunk_size > self.max_input_size {
            return Err(format!(
                "chunk size {} exceeds encoder max input size {}",
                self.chunk_size, self.max_input_size
            ));
        }
        if self.queue_capacity == 0 {
            return Err("queue capacity must be positive".into());
        }
        Ok(())
    }

    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
            min_buffer_size: self.min_buffer_size.max(MIN_BUFFER_FLOOR),
        }
    }

    pub fn encoder_format(&self) -> EncoderFormat {
        EncoderFormat {
            profile: self.profile,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_rate: self.bit_rate,
            max_input_size: self.max_input_size,
        }
    }
}

impl Default for RecorderConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            bit_rate: 96000,
            profile: AacProfile::LowComplexity,
            chunk_size: 2048,
            max_input_size: 8192,
            min_buffer_size: MIN_BUFFER_FLOOR,
            queue_capacity: 10,
            output_directory: PathBuf::from("."),
            debug_raw_directory: None,
            input_timeout: None,
            output_poll_timeout: Duration::from_millis(10),
            pop_timeout: Duration::from_millis(50),
            write_metadata: false,
        }
    }
}
