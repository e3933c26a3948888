use std::fmt;

/// One unit of raw PCM moving from the capture loop to the encode loop.
///
/// The chunk owns an exact-length copy of the bytes returned by a single
/// device read, so it never carries stale tail bytes from the read buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioChunk {
    bytes: Box<[u8]>,
}

impl AudioChunk {
    /// Copy `bytes` into a new chunk.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioChunk").field("len", &self.bytes.len()).finish()
    }
}

/// AAC audio object types that fit in the 2-bit ADTS profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AacProfile {
    Main,
    #[default]
    LowComplexity,
    ScalableSampleRate,
    LongTermPrediction,
}

impl AacProfile {
    /// MPEG-4 audio object type (1..=4).
    pub const fn object_type(self) -> u8 {
        match self {
            Self::Main => 1,
            Self::LowComplexity => 2,
            Self::ScalableSampleRate => 3,
            Self::LongTermPrediction => 4,
        }
    }
}

/// Parameters handed to [`CaptureDevice::open`](crate::CaptureDevice::open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    /// Minimum device buffer size in bytes, already clamped to the configured floor.
    pub min_buffer_size: usize,
}

impl CaptureFormat {
    /// Bytes of PCM produced per second of audio.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bit_depth as u32 / 8
    }
}

/// Parameters handed to [`BlockEncoder::configure`](crate::BlockEncoder::configure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderFormat {
    pub profile: AacProfile,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub max_input_size: usize,
}

/// Handle for an encoder input buffer, valid from acquisition until submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputBufferIndex(pub usize);

/// Handle for an encoder output buffer, valid from poll until release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputBufferIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags {
    /// Out-of-band codec setup data (AudioSpecificConfig), not an audio frame.
    pub codec_config: bool,
    pub key_frame: bool,
    pub end_of_stream: bool,
}

/// Metadata for one ready encoder output (a compressed unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBufferInfo {
    pub index: OutputBufferIndex,
    /// Start of the payload inside the buffer returned by `output_buffer`.
    pub offset: usize,
    pub size: usize,
    pub flags: BufferFlags,
}

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioTransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// A capture endpoint reported by a platform backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub transport_type: Option<AudioTransportType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_keeps_exact_length() {
        let read_buffer = [7u8; 2048];
        let chunk = AudioChunk::copy_from(&read_buffer[..300]);
        assert_eq!(chunk.len(), 300);
        assert!(chunk.as_bytes().iter().all(|&b| b == 7));
        assert_eq!(format!("{:?}", chunk), "AudioChunk { len: 300 }");
    }

    #[test]
    fn profile_object_types() {
        assert_eq!(AacProfile::Main.object_type(), 1);
        assert_eq!(AacProfile::default().object_type(), 2);
        assert_eq!(AacProfile::LongTermPrediction.object_type(), 4);
    }

    #[test]
    fn capture_byte_rate() {
        let format = CaptureFormat {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            min_buffer_size: 2048,
        };
        assert_eq!(format.byte_rate(), 88200);
    }
}
