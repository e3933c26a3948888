//! Media Foundation AAC encoder behind the core `BlockEncoder` protocol.
//!
//! The Microsoft AAC encoder MFT is synchronous: `ProcessInput` either takes
//! a sample or reports `MF_E_NOTACCEPTING`, and `ProcessOutput` writes into
//! a sample we allocate. The indexed input/output buffer pools expected by
//! the encode loop are kept here on top of that.

use std::collections::VecDeque;
use std::mem::ManuallyDrop;
use std::time::Duration;

use windows::Win32::Media::MediaFoundation::{
    IMFMediaBuffer, IMFSample, IMFTransform, MFAudioFormat_AAC, MFAudioFormat_PCM, MFCreateMediaType,
    MFCreateMemoryBuffer, MFCreateSample, MFMediaType_Audio, CLSID_AACMFTEncoder, MFT_MESSAGE_COMMAND_FLUSH,
    MFT_MESSAGE_NOTIFY_BEGIN_STREAMING, MFT_MESSAGE_NOTIFY_END_OF_STREAM, MFT_MESSAGE_NOTIFY_END_STREAMING,
    MFT_MESSAGE_NOTIFY_START_OF_STREAM, MFT_MESSAGE_TYPE, MFT_OUTPUT_DATA_BUFFER, MF_E_NOTACCEPTING,
    MF_E_TRANSFORM_NEED_MORE_INPUT, MF_MT_AAC_AUDIO_PROFILE_LEVEL_INDICATION, MF_MT_AAC_PAYLOAD_TYPE,
    MF_MT_AUDIO_AVG_BYTES_PER_SECOND, MF_MT_AUDIO_BITS_PER_SAMPLE, MF_MT_AUDIO_BLOCK_ALIGNMENT,
    MF_MT_AUDIO_NUM_CHANNELS, MF_MT_AUDIO_SAMPLES_PER_SECOND, MF_MT_MAJOR_TYPE, MF_MT_SUBTYPE,
};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER};

use aac_capture_core::models::audio_models::{
    AacProfile, BufferFlags, EncoderFormat, InputBufferIndex, OutputBufferIndex, OutputBufferInfo,
};
use aac_capture_core::models::error::RecorderError;
use aac_capture_core::traits::block_encoder::{BlockEncoder, EncoderProvider};

use crate::com::MediaFoundation;

/// Input slots handed out to the encode loop.
const INPUT_SLOTS: usize = 4;

/// Bit rates (bits/s) the Microsoft AAC encoder accepts.
pub const SUPPORTED_BIT_RATES: [u32; 4] = [96_000, 128_000, 160_000, 192_000];

/// AAC-LC, level 2 (`0x29`), the encoder's default profile-level indication.
const AAC_LC_LEVEL_2: u32 = 0x29;

/// Creates a Media Foundation AAC encoder per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaFoundationAacProvider;

impl EncoderProvider for MediaFoundationAacProvider {
    type Encoder = MfAacEncoder;

    fn create_encoder(&self) -> Result<MfAacEncoder, RecorderError> {
        MfAacEncoder::new()
    }
}

struct InputSlot {
    data: Vec<u8>,
    acquired: bool,
}

struct OutputSlot {
    data: Vec<u8>,
    in_use: bool,
}

pub struct MfAacEncoder {
    transform: Option<IMFTransform>,
    format: Option<EncoderFormat>,
    inputs: Vec<InputSlot>,
    free_inputs: VecDeque<usize>,
    /// Samples the MFT refused with `MF_E_NOTACCEPTING`, fed again on the next poll.
    backlog: VecDeque<IMFSample>,
    outputs: Vec<OutputSlot>,
    output_size: u32,
    samples_submitted: u64,
    streaming: bool,
    _mf: MediaFoundation,
}

// SAFETY: the MFT is created in the MTA, which `_mf` keeps alive, and is
// free-threaded within it. The encoder is driven by one thread at a time.
unsafe impl Send for MfAacEncoder {}

impl MfAacEncoder {
    pub fn new() -> Result<Self, RecorderError> {
        let mf = MediaFoundation::startup()?;
        let transform: IMFTransform = unsafe { CoCreateInstance(&CLSID_AACMFTEncoder, None, CLSCTX_INPROC_SERVER) }
            .map_err(|e| RecorderError::Encoder(format!("failed to create AAC encoder MFT: {}", e)))?;

        Ok(Self {
            transform: Some(transform),
            format: None,
            inputs: Vec::new(),
            free_inputs: VecDeque::new(),
            backlog: VecDeque::new(),
            outputs: Vec::new(),
            output_size: 0,
            samples_submitted: 0,
            streaming: false,
            _mf: mf,
        })
    }

    fn transform(&self) -> Result<&IMFTransform, RecorderError> {
        self.transform
            .as_ref()
            .ok_or_else(|| RecorderError::Encoder("encoder already released".into()))
    }

    fn bytes_per_frame(&self) -> u32 {
        self.format.map(|f| f.channels as u32 * 2).unwrap_or(2)
    }

    fn set_media_types(&self, format: &EncoderFormat) -> Result<(), RecorderError> {
        let transform = self.transform()?;
        let err = |what: &str, e: windows::core::Error| RecorderError::Encoder(format!("{} failed: {}", what, e));
        let block_align = format.channels as u32 * 2;

        unsafe {
            // The AAC MFT wants its output type before its input type.
            let output = MFCreateMediaType().map_err(|e| err("MFCreateMediaType", e))?;
            output.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Audio).map_err(|e| err("SetGUID", e))?;
            output.SetGUID(&MF_MT_SUBTYPE, &MFAudioFormat_AAC).map_err(|e| err("SetGUID", e))?;
            for (key, value) in [
                (&MF_MT_AUDIO_BITS_PER_SAMPLE, 16),
                (&MF_MT_AUDIO_SAMPLES_PER_SECOND, format.sample_rate),
                (&MF_MT_AUDIO_NUM_CHANNELS, format.channels as u32),
                (&MF_MT_AUDIO_AVG_BYTES_PER_SECOND, format.bit_rate / 8),
                // Raw AAC: ADTS headers are added by the encode loop.
                (&MF_MT_AAC_PAYLOAD_TYPE, 0),
                (&MF_MT_AAC_AUDIO_PROFILE_LEVEL_INDICATION, AAC_LC_LEVEL_2),
            ] {
                output.SetUINT32(key, value).map_err(|e| err("SetUINT32", e))?;
            }
            transform
                .SetOutputType(0, &output, 0)
                .map_err(|e| err("SetOutputType", e))?;

            let input = MFCreateMediaType().map_err(|e| err("MFCreateMediaType", e))?;
            input.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Audio).map_err(|e| err("SetGUID", e))?;
            input.SetGUID(&MF_MT_SUBTYPE, &MFAudioFormat_PCM).map_err(|e| err("SetGUID", e))?;
            for (key, value) in [
                (&MF_MT_AUDIO_BITS_PER_SAMPLE, 16),
                (&MF_MT_AUDIO_SAMPLES_PER_SECOND, format.sample_rate),
                (&MF_MT_AUDIO_NUM_CHANNELS, format.channels as u32),
                (&MF_MT_AUDIO_BLOCK_ALIGNMENT, block_align),
                (&MF_MT_AUDIO_AVG_BYTES_PER_SECOND, format.sample_rate * block_align),
            ] {
                input.SetUINT32(key, value).map_err(|e| err("SetUINT32", e))?;
            }
            transform.SetInputType(0, &input, 0).map_err(|e| err("SetInputType", e))
        }
    }

    fn message(&self, message: MFT_MESSAGE_TYPE) -> Result<(), RecorderError> {
        unsafe { self.transform()?.ProcessMessage(message, 0) }
            .map_err(|e| RecorderError::Encoder(format!("ProcessMessage({:?}) failed: {}", message, e)))
    }

    /// Wrap `pcm` in a timestamped `IMFSample`.
    fn make_sample(&mut self, pcm: &[u8]) -> Result<IMFSample, RecorderError> {
        let err = |what: &str, e: windows::core::Error| RecorderError::Encoder(format!("{} failed: {}", what, e));
        let rate = self.format.map(|f| f.sample_rate as u64).unwrap_or(44_100);
        let frames = pcm.len() as u64 / self.bytes_per_frame() as u64;
        let start = self.samples_submitted * 10_000_000 / rate;
        let duration = frames * 10_000_000 / rate;
        self.samples_submitted += frames;

        unsafe {
            let buffer: IMFMediaBuffer =
                MFCreateMemoryBuffer(pcm.len() as u32).map_err(|e| err("MFCreateMemoryBuffer", e))?;
            let mut dst: *mut u8 = std::ptr::null_mut();
            buffer.Lock(&mut dst, None, None).map_err(|e| err("Lock", e))?;
            std::ptr::copy_nonoverlapping(pcm.as_ptr(), dst, pcm.len());
            buffer.Unlock().map_err(|e| err("Unlock", e))?;
            buffer
                .SetCurrentLength(pcm.len() as u32)
                .map_err(|e| err("SetCurrentLength", e))?;

            let sample = MFCreateSample().map_err(|e| err("MFCreateSample", e))?;
            sample.AddBuffer(&buffer).map_err(|e| err("AddBuffer", e))?;
            sample.SetSampleTime(start as i64).map_err(|e| err("SetSampleTime", e))?;
            sample
                .SetSampleDuration(duration as i64)
                .map_err(|e| err("SetSampleDuration", e))?;
            Ok(sample)
        }
    }

    /// Feed refused samples again; stops at the first refusal.
    fn feed_backlog(&mut self) -> Result<(), RecorderError> {
        while let Some(sample) = self.backlog.front() {
            match unsafe { self.transform()?.ProcessInput(0, sample, 0) } {
                Ok(()) => {
                    self.backlog.pop_front();
                }
                Err(e) if e.code() == MF_E_NOTACCEPTING => break,
                Err(e) => return Err(RecorderError::Encoder(format!("ProcessInput failed: {}", e))),
            }
        }
        Ok(())
    }

    /// Pull one encoded frame out of the MFT, if it has one.
    fn process_output(&mut self) -> Result<Option<Vec<u8>>, RecorderError> {
        let err = |what: &str, e: windows::core::Error| RecorderError::Encoder(format!("{} failed: {}", what, e));
        let transform = self.transform()?.clone();

        unsafe {
            let buffer = MFCreateMemoryBuffer(self.output_size).map_err(|e| err("MFCreateMemoryBuffer", e))?;
            let sample = MFCreateSample().map_err(|e| err("MFCreateSample", e))?;
            sample.AddBuffer(&buffer).map_err(|e| err("AddBuffer", e))?;

            let mut data = [MFT_OUTPUT_DATA_BUFFER {
                dwStreamID: 0,
                pSample: ManuallyDrop::new(Some(sample)),
                dwStatus: 0,
                pEvents: ManuallyDrop::new(None),
            }];
            let mut status = 0u32;
            let result = transform.ProcessOutput(0, &mut data, &mut status);
            let sample = ManuallyDrop::take(&mut data[0].pSample);
            ManuallyDrop::drop(&mut data[0].pEvents);

            match result {
                Ok(()) => {}
                Err(e) if e.code() == MF_E_TRANSFORM_NEED_MORE_INPUT => return Ok(None),
                Err(e) => return Err(err("ProcessOutput", e)),
            }

            let Some(sample) = sample else {
                return Ok(None);
            };
            let contiguous = sample
                .ConvertToContiguousBuffer()
                .map_err(|e| err("ConvertToContiguousBuffer", e))?;
            let mut src: *mut u8 = std::ptr::null_mut();
            let mut len = 0u32;
            contiguous
                .Lock(&mut src, None, Some(&mut len as *mut u32))
                .map_err(|e| err("Lock", e))?;
            let frame = std::slice::from_raw_parts(src, len as usize).to_vec();
            contiguous.Unlock().map_err(|e| err("Unlock", e))?;
            Ok(Some(frame))
        }
    }

    fn store_output(&mut self, frame: Vec<u8>) -> OutputBufferIndex {
        let free = self.outputs.iter().position(|slot| !slot.in_use);
        let index = match free {
            Some(index) => {
                self.outputs[index] = OutputSlot {
                    data: frame,
                    in_use: true,
                };
                index
            }
            None => {
                self.outputs.push(OutputSlot {
                    data: frame,
                    in_use: true,
                });
                self.outputs.len() - 1
            }
        };
        OutputBufferIndex(index)
    }

    fn input_slot(&mut self, index: InputBufferIndex) -> Result<&mut InputSlot, RecorderError> {
        match self.inputs.get_mut(index.0) {
            Some(slot) if slot.acquired => Ok(slot),
            _ => Err(RecorderError::Encoder(format!("input {:?} is not acquired", index))),
        }
    }
}

impl BlockEncoder for MfAacEncoder {
    fn configure(&mut self, format: &EncoderFormat) -> Result<(), RecorderError> {
        if format.profile != AacProfile::LowComplexity {
            return Err(RecorderError::Encoder(format!(
                "Media Foundation encodes AAC-LC only, {:?} requested",
                format.profile
            )));
        }
        if !SUPPORTED_BIT_RATES.contains(&format.bit_rate) {
            return Err(RecorderError::Encoder(format!(
                "unsupported bit rate {}, expected one of {:?}",
                format.bit_rate, SUPPORTED_BIT_RATES
            )));
        }

        self.set_media_types(format)?;
        let info = unsafe { self.transform()?.GetOutputStreamInfo(0) }
            .map_err(|e| RecorderError::Encoder(format!("GetOutputStreamInfo failed: {}", e)))?;

        if info.cbSize == 0 {
            return Err(RecorderError::Encoder("AAC encoder reported zero output size".into()));
        }

        self.format = Some(*format);
        self.output_size = info.cbSize;
        self.inputs = (0..INPUT_SLOTS)
            .map(|_| InputSlot {
                data: vec![0; format.max_input_size],
                acquired: false,
            })
            .collect();
        self.free_inputs = (0..INPUT_SLOTS).collect();
        log::debug!(
            "AAC encoder configured: {} Hz x{} at {} bit/s",
            format.sample_rate,
            format.channels,
            format.bit_rate
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.format.is_none() {
            return Err(RecorderError::Encoder("start before configure".into()));
        }
        self.message(MFT_MESSAGE_NOTIFY_BEGIN_STREAMING)?;
        self.message(MFT_MESSAGE_NOTIFY_START_OF_STREAM)?;
        self.streaming = true;
        Ok(())
    }

    fn acquire_input_buffer(&mut self, timeout: Option<Duration>) -> Result<Option<InputBufferIndex>, RecorderError> {
        // Refused samples are the MFT's backpressure; the caller drains output and retries.
        self.feed_backlog()?;
        if !self.backlog.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
            }
            return Ok(None);
        }

        let Some(index) = self.free_inputs.pop_front() else {
            return Ok(None);
        };
        self.inputs[index].acquired = true;
        Ok(Some(InputBufferIndex(index)))
    }

    fn input_buffer(&mut self, index: InputBufferIndex) -> Result<&mut [u8], RecorderError> {
        Ok(&mut self.input_slot(index)?.data)
    }

    fn submit_input(&mut self, index: InputBufferIndex, len: usize) -> Result<(), RecorderError> {
        let slot = self.input_slot(index)?;
        slot.acquired = false;
        let capacity = slot.data.len();
        let pcm = slot.data.get(..len).map(<[u8]>::to_vec);
        self.free_inputs.push_back(index.0);

        let Some(pcm) = pcm else {
            return Err(RecorderError::Encoder(format!(
                "submitted {} bytes into a {}-byte input buffer",
                len, capacity
            )));
        };
        if pcm.is_empty() {
            return Ok(());
        }

        let sample = self.make_sample(&pcm)?;
        self.backlog.push_back(sample);
        self.feed_backlog()
    }

    fn poll_output_buffer(&mut self, _timeout: Duration) -> Result<Option<OutputBufferInfo>, RecorderError> {
        let frame = match self.process_output()? {
            Some(frame) => frame,
            None => {
                // The MFT wanted more input; offer anything it refused earlier.
                self.feed_backlog()?;
                return Ok(None);
            }
        };

        let size = frame.len();
        let index = self.store_output(frame);
        Ok(Some(OutputBufferInfo {
            index,
            offset: 0,
            size,
            flags: BufferFlags {
                key_frame: true,
                ..BufferFlags::default()
            },
        }))
    }

    fn output_buffer(&self, index: OutputBufferIndex) -> Result<&[u8], RecorderError> {
        match self.outputs.get(index.0) {
            Some(slot) if slot.in_use => Ok(&slot.data),
            _ => Err(RecorderError::Encoder(format!("output {:?} is not in use", index))),
        }
    }

    fn release_output_buffer(&mut self, index: OutputBufferIndex) -> Result<(), RecorderError> {
        match self.outputs.get_mut(index.0) {
            Some(slot) if slot.in_use => {
                slot.in_use = false;
                slot.data.clear();
                Ok(())
            }
            _ => Err(RecorderError::Encoder(format!("output {:?} released twice", index))),
        }
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        if !self.backlog.is_empty() {
            log::warn!("Dropping {} PCM samples the encoder never accepted", self.backlog.len());
            self.backlog.clear();
        }
        self.message(MFT_MESSAGE_NOTIFY_END_OF_STREAM)?;
        self.message(MFT_MESSAGE_COMMAND_FLUSH)?;
        self.message(MFT_MESSAGE_NOTIFY_END_STREAMING)
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        self.transform = None;
        self.inputs.clear();
        self.free_inputs.clear();
        self.outputs.clear();
        Ok(())
    }
}
