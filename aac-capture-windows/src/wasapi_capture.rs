//! WASAPI microphone source.
//!
//! Opens a capture endpoint in shared mode and serves its float mix format
//! as mono 16-bit PCM at the requested rate, pulled by the core capture loop.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use windows::Win32::Media::Audio::{
    IAudioCaptureClient, IAudioClient, AUDCLNT_BUFFERFLAGS_SILENT, AUDCLNT_SHAREMODE_SHARED,
    AUDCLNT_STREAMFLAGS_NOPERSIST,
};
use windows::Win32::System::Com::{CoTaskMemFree, CLSCTX_ALL};

use aac_capture_core::models::audio_models::{AudioSource, AudioTransportType, CaptureFormat};
use aac_capture_core::models::error::RecorderError;
use aac_capture_core::processing::pcm_convert::PcmConverter;
use aac_capture_core::traits::capture_source::{CaptureDevice, RawCaptureSource};

use crate::com::MtaUsage;
use crate::device_enumerator::DeviceEnumerator;

/// Shared-mode buffer duration in 100 ns units (100 ms).
const BUFFER_DURATION: i64 = 1_000_000;

/// Wait between polls when the endpoint has no packet ready.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A microphone endpoint, default or chosen by ID.
pub struct WasapiCaptureDevice {
    device_id: Option<String>,
    device_name: String,
    is_default: bool,
    transport_type: Option<AudioTransportType>,
}

impl WasapiCaptureDevice {
    /// Follow the system default microphone at open time.
    pub fn default_device() -> Self {
        Self {
            device_id: None,
            device_name: "Default Microphone".into(),
            is_default: true,
            transport_type: None,
        }
    }

    /// Use a specific endpoint, as listed by [`DeviceEnumerator`].
    pub fn with_device(source: AudioSource) -> Self {
        Self {
            device_id: Some(source.id),
            device_name: source.name,
            is_default: source.is_default,
            transport_type: source.transport_type,
        }
    }
}

impl CaptureDevice for WasapiCaptureDevice {
    type Source = WasapiCaptureSource;

    fn open(&self, format: &CaptureFormat) -> Result<WasapiCaptureSource, RecorderError> {
        WasapiCaptureSource::open(self.device_id.as_deref(), format)
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: self.device_id.clone().unwrap_or_else(|| "default-mic".into()),
            name: self.device_name.clone(),
            is_default: self.is_default,
            transport_type: self.transport_type,
        }
    }
}

/// A started shared-mode capture stream.
pub struct WasapiCaptureSource {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    converter: PcmConverter,
    mix_sample_rate: u32,
    mix_channels: u16,
    /// Converted PCM not yet handed to the caller.
    pending: VecDeque<u8>,
    running: bool,
    _mta: MtaUsage,
}

// SAFETY: the COM objects live in the MTA (kept alive by `_mta`), whose
// interface pointers may be used from any MTA thread. The source is only
// ever driven by one thread at a time: the capture thread, then teardown.
unsafe impl Send for WasapiCaptureSource {}

impl WasapiCaptureSource {
    fn open(device_id: Option<&str>, format: &CaptureFormat) -> Result<Self, RecorderError> {
        if format.channels != 1 || format.bit_depth != 16 {
            return Err(RecorderError::Device(format!(
                "WASAPI source delivers mono 16-bit PCM, {} channels at {} bits requested",
                format.channels, format.bit_depth
            )));
        }

        let mta = MtaUsage::acquire()?;
        let device = DeviceEnumerator::new()?.device(device_id)?;

        unsafe {
            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| RecorderError::Device(format!("Activate failed: {}", e)))?;

            let mix_format_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| RecorderError::Device(format!("GetMixFormat failed: {}", e)))?;
            // WAVEFORMATEX is packed; copy fields out before formatting them.
            let mix_format = *mix_format_ptr;
            let mix_sample_rate = mix_format.nSamplesPerSec;
            let mix_channels = mix_format.nChannels;
            let mix_bits = mix_format.wBitsPerSample;

            // Shared mode hands out the engine mix format, which is 32-bit float.
            if mix_bits != 32 {
                CoTaskMemFree(Some(mix_format_ptr as *const _));
                return Err(RecorderError::Device(format!(
                    "unsupported mix format: {} bits per sample",
                    mix_bits
                )));
            }

            let initialized = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_NOPERSIST,
                BUFFER_DURATION,
                0,
                mix_format_ptr,
                None,
            );
            CoTaskMemFree(Some(mix_format_ptr as *const _));
            initialized.map_err(|e| RecorderError::Device(format!("IAudioClient::Initialize failed: {}", e)))?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| RecorderError::Device(format!("GetService failed: {}", e)))?;

            audio_client
                .Start()
                .map_err(|e| RecorderError::Device(format!("IAudioClient::Start failed: {}", e)))?;

            log::info!(
                "WASAPI capture started: mix {} Hz x{} → {} Hz mono",
                mix_sample_rate,
                mix_channels,
                format.sample_rate
            );

            Ok(Self {
                audio_client,
                capture_client,
                converter: PcmConverter::new(format.sample_rate),
                mix_sample_rate,
                mix_channels,
                pending: VecDeque::with_capacity(format.min_buffer_size * 2),
                running: true,
                _mta: mta,
            })
        }
    }

    /// Move every packet the endpoint has ready into `pending`.
    fn fill(&mut self) -> Result<(), RecorderError> {
        unsafe {
            let mut packet_length = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| RecorderError::Device(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut data: *mut u8 = std::ptr::null_mut();
                let mut frames: u32 = 0;
                let mut flags: u32 = 0;
                self.capture_client
                    .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                    .map_err(|e| RecorderError::Device(format!("GetBuffer failed: {}", e)))?;

                if frames > 0 && !data.is_null() {
                    let total = frames as usize * self.mix_channels as usize;
                    let pcm = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        let silence = vec![0.0f32; total];
                        self.converter
                            .to_mono_pcm16(&silence, self.mix_sample_rate, self.mix_channels)
                    } else {
                        let samples = std::slice::from_raw_parts(data as *const f32, total);
                        self.converter
                            .to_mono_pcm16(samples, self.mix_sample_rate, self.mix_channels)
                    };
                    self.pending.extend(pcm);
                }

                self.capture_client
                    .ReleaseBuffer(frames)
                    .map_err(|e| RecorderError::Device(format!("ReleaseBuffer failed: {}", e)))?;
                packet_length = self
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| RecorderError::Device(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }
        Ok(())
    }
}

impl RawCaptureSource for WasapiCaptureSource {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, RecorderError> {
        if self.pending.len() < buffer.len() {
            self.fill()?;
        }
        if self.pending.is_empty() {
            thread::sleep(POLL_INTERVAL);
            return Ok(0);
        }

        let n = buffer.len().min(self.pending.len());
        for (dst, src) in buffer.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        unsafe { self.audio_client.Stop() }
            .map_err(|e| RecorderError::Device(format!("IAudioClient::Stop failed: {}", e)))
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        if !self.pending.is_empty() {
            log::debug!("Discarding {} captured bytes after stop", self.pending.len());
        }
        self.pending.clear();
        unsafe { self.audio_client.Reset() }
            .map_err(|e| RecorderError::Device(format!("IAudioClient::Reset failed: {}", e)))
    }
}
