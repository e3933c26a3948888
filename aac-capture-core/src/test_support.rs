//! Fakes shared by the unit tests: a scripted capture device, an in-memory
//! block encoder that tracks buffer ownership, a listener tap and writers
//! that fail on demand.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{
    AudioSource, AudioTransportType, BufferFlags, CaptureFormat, EncoderFormat, InputBufferIndex,
    OutputBufferIndex, OutputBufferInfo,
};
use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::traits::block_encoder::{BlockEncoder, EncoderProvider};
use crate::traits::capture_source::{CaptureDevice, RawCaptureSource};
use crate::traits::recording_listener::RecordingListener;

/// Codec setup bytes emitted before the first audio unit.
pub(crate) const FAKE_CODEC_CONFIG: [u8; 2] = [0x12, 0x08];

/// Padding in front of every fake output payload, so `offset` is exercised.
const OUTPUT_OFFSET: usize = 2;

// --- Capture ---

pub(crate) enum FakeRead {
    Data(Vec<u8>),
    Error(String),
}

#[derive(Default)]
struct SourceLog {
    reads: usize,
    bytes_served: u64,
    stopped: bool,
    released: bool,
}

#[derive(Clone, Default)]
pub(crate) struct SourceTap(Arc<Mutex<SourceLog>>);

impl SourceTap {
    pub fn reads(&self) -> usize {
        self.0.lock().reads
    }

    pub fn bytes_served(&self) -> u64 {
        self.0.lock().bytes_served
    }

    pub fn stopped(&self) -> bool {
        self.0.lock().stopped
    }

    pub fn released(&self) -> bool {
        self.0.lock().released
    }

    /// Spin until the source has served `bytes`, or give up after `timeout`.
    pub fn wait_for_bytes(&self, bytes: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.bytes_served() >= bytes {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

/// Plays back a script of reads, then either repeats one buffer forever or
/// reports "no data" with a short sleep, like an idle microphone.
pub(crate) struct FakeSource {
    script: VecDeque<FakeRead>,
    repeat: Option<Vec<u8>>,
    tap: SourceTap,
}

impl FakeSource {
    pub fn scripted(reads: Vec<FakeRead>) -> (Self, SourceTap) {
        let tap = SourceTap::default();
        let source = Self {
            script: reads.into(),
            repeat: None,
            tap: tap.clone(),
        };
        (source, tap)
    }

    pub fn endless(data: Vec<u8>) -> (Self, SourceTap) {
        let (mut source, tap) = Self::scripted(Vec::new());
        source.repeat = Some(data);
        (source, tap)
    }

    fn serve(log: &mut SourceLog, data: &[u8], buffer: &mut [u8]) -> usize {
        let n = data.len().min(buffer.len());
        buffer[..n].copy_from_slice(&data[..n]);
        log.bytes_served += n as u64;
        n
    }
}

impl RawCaptureSource for FakeSource {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, RecorderError> {
        let mut log = self.tap.0.lock();
        log.reads += 1;
        match self.script.pop_front() {
            Some(FakeRead::Data(data)) => Ok(Self::serve(&mut log, &data, buffer)),
            Some(FakeRead::Error(message)) => Err(RecorderError::Device(message)),
            None => match &self.repeat {
                Some(data) => Ok(Self::serve(&mut log, data, buffer)),
                None => {
                    drop(log);
                    thread::sleep(Duration::from_millis(1));
                    Ok(0)
                }
            },
        }
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.tap.0.lock().stopped = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        self.tap.0.lock().released = true;
        Ok(())
    }
}

/// Hands out queued sources in order; an idle source once they run out.
pub(crate) struct FakeDevice {
    sources: Mutex<VecDeque<FakeSource>>,
    opened: Mutex<Vec<CaptureFormat>>,
    fail_open: Option<String>,
}

impl FakeDevice {
    pub fn with_sources(sources: Vec<FakeSource>) -> Self {
        Self {
            sources: Mutex::new(sources.into()),
            opened: Mutex::new(Vec::new()),
            fail_open: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_open: Some(message.to_string()),
            ..Self::with_sources(Vec::new())
        }
    }

    pub fn opened_formats(&self) -> Vec<CaptureFormat> {
        self.opened.lock().clone()
    }
}

impl CaptureDevice for FakeDevice {
    type Source = FakeSource;

    fn open(&self, format: &CaptureFormat) -> Result<FakeSource, RecorderError> {
        if let Some(message) = &self.fail_open {
            return Err(RecorderError::Device(message.clone()));
        }
        self.opened.lock().push(*format);
        let source = self.sources.lock().pop_front();
        Ok(source.unwrap_or_else(|| FakeSource::scripted(Vec::new()).0))
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "fake-mic".into(),
            name: "Fake Microphone".into(),
            is_default: true,
            transport_type: Some(AudioTransportType::Virtual),
        }
    }
}

// --- Encoder ---

#[derive(Default, Clone)]
struct EncoderKnobs {
    refuse_acquires: usize,
    fail_submit_after: Option<usize>,
    fail_release: bool,
}

#[derive(Default)]
struct EncoderLog {
    knobs: EncoderKnobs,
    configured: Option<EncoderFormat>,
    started: bool,
    stopped: bool,
    released: bool,
    submits: usize,
    refused: usize,
    outstanding_inputs: usize,
    outstanding_outputs: usize,
    codec_config_released: usize,
}

#[derive(Clone, Default)]
pub(crate) struct EncoderTap(Arc<Mutex<EncoderLog>>);

impl EncoderTap {
    pub fn refuse_next_acquires(&self, n: usize) {
        self.0.lock().knobs.refuse_acquires = n;
    }

    /// Submissions after the first `n` fail (the slot stays acquired).
    pub fn fail_submit_after(&self, n: usize) {
        self.0.lock().knobs.fail_submit_after = Some(n);
    }

    pub fn fail_release(&self) {
        self.0.lock().knobs.fail_release = true;
    }

    pub fn refused_acquires(&self) -> usize {
        self.0.lock().refused
    }

    pub fn outstanding_inputs(&self) -> usize {
        self.0.lock().outstanding_inputs
    }

    pub fn outstanding_outputs(&self) -> usize {
        self.0.lock().outstanding_outputs
    }

    pub fn codec_config_released(&self) -> usize {
        self.0.lock().codec_config_released
    }

    pub fn configured(&self) -> Option<EncoderFormat> {
        self.0.lock().configured
    }

    pub fn started(&self) -> bool {
        self.0.lock().started
    }

    pub fn stopped(&self) -> bool {
        self.0.lock().stopped
    }

    pub fn released(&self) -> bool {
        self.0.lock().released
    }
}

/// In-memory codec: every non-empty input of `n` bytes becomes one output
/// unit of `n / 8` bytes, preceded once by a codec-config unit.
pub(crate) struct FakeEncoder {
    inputs: Vec<Vec<u8>>,
    acquired: Vec<bool>,
    free_inputs: VecDeque<usize>,
    outputs: Vec<Vec<u8>>,
    output_flags: Vec<BufferFlags>,
    ready: VecDeque<OutputBufferInfo>,
    sent_config: bool,
    tap: EncoderTap,
}

impl FakeEncoder {
    pub fn new(input_slots: usize, input_size: usize) -> (Self, EncoderTap) {
        let tap = EncoderTap::default();
        (Self::with_tap(input_slots, input_size, tap.clone()), tap)
    }

    fn with_tap(input_slots: usize, input_size: usize, tap: EncoderTap) -> Self {
        Self {
            inputs: vec![vec![0; input_size]; input_slots],
            acquired: vec![false; input_slots],
            free_inputs: (0..input_slots).collect(),
            outputs: Vec::new(),
            output_flags: Vec::new(),
            ready: VecDeque::new(),
            sent_config: false,
            tap,
        }
    }

    fn emit(&mut self, payload: Vec<u8>, flags: BufferFlags) {
        let index = OutputBufferIndex(self.outputs.len());
        let size = payload.len();
        let mut buffer = vec![0xEE; OUTPUT_OFFSET];
        buffer.extend_from_slice(&payload);
        self.outputs.push(buffer);
        self.output_flags.push(flags);
        self.ready.push_back(OutputBufferInfo {
            index,
            offset: OUTPUT_OFFSET,
            size,
            flags,
        });
    }

    fn check_acquired(&self, index: InputBufferIndex) -> Result<(), RecorderError> {
        match self.acquired.get(index.0) {
            Some(true) => Ok(()),
            _ => Err(RecorderError::Encoder(format!("input {:?} not acquired", index))),
        }
    }

    fn free(&mut self, index: InputBufferIndex) {
        self.acquired[index.0] = false;
        self.free_inputs.push_back(index.0);
        self.tap.0.lock().outstanding_inputs -= 1;
    }
}

impl BlockEncoder for FakeEncoder {
    fn configure(&mut self, format: &EncoderFormat) -> Result<(), RecorderError> {
        self.tap.0.lock().configured = Some(*format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        self.tap.0.lock().started = true;
        Ok(())
    }

    fn acquire_input_buffer(&mut self, _timeout: Option<Duration>) -> Result<Option<InputBufferIndex>, RecorderError> {
        let mut log = self.tap.0.lock();
        if log.knobs.refuse_acquires > 0 {
            log.knobs.refuse_acquires -= 1;
            log.refused += 1;
            return Ok(None);
        }
        let Some(slot) = self.free_inputs.pop_front() else {
            return Ok(None);
        };
        self.acquired[slot] = true;
        log.outstanding_inputs += 1;
        Ok(Some(InputBufferIndex(slot)))
    }

    fn input_buffer(&mut self, index: InputBufferIndex) -> Result<&mut [u8], RecorderError> {
        self.check_acquired(index)?;
        Ok(&mut self.inputs[index.0])
    }

    fn submit_input(&mut self, index: InputBufferIndex, len: usize) -> Result<(), RecorderError> {
        self.check_acquired(index)?;
        if len == 0 {
            self.free(index);
            return Ok(());
        }

        {
            let mut log = self.tap.0.lock();
            log.submits += 1;
            if matches!(log.knobs.fail_submit_after, Some(n) if log.submits > n) {
                return Err(RecorderError::Encoder("queue input rejected".into()));
            }
        }

        let first = self.inputs[index.0][0];
        self.free(index);
        if !self.sent_config {
            self.sent_config = true;
            let flags = BufferFlags {
                codec_config: true,
                ..BufferFlags::default()
            };
            self.emit(FAKE_CODEC_CONFIG.to_vec(), flags);
        }
        let flags = BufferFlags {
            key_frame: true,
            ..BufferFlags::default()
        };
        self.emit(vec![first; (len / 8).max(1)], flags);
        Ok(())
    }

    fn poll_output_buffer(&mut self, _timeout: Duration) -> Result<Option<OutputBufferInfo>, RecorderError> {
        let info = self.ready.pop_front();
        if info.is_some() {
            self.tap.0.lock().outstanding_outputs += 1;
        }
        Ok(info)
    }

    fn output_buffer(&self, index: OutputBufferIndex) -> Result<&[u8], RecorderError> {
        self.outputs
            .get(index.0)
            .map(Vec::as_slice)
            .ok_or_else(|| RecorderError::Encoder(format!("no output {:?}", index)))
    }

    fn release_output_buffer(&mut self, index: OutputBufferIndex) -> Result<(), RecorderError> {
        let mut log = self.tap.0.lock();
        log.outstanding_outputs -= 1;
        if self.output_flags[index.0].codec_config {
            log.codec_config_released += 1;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.tap.0.lock().stopped = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), RecorderError> {
        let mut log = self.tap.0.lock();
        if log.knobs.fail_release {
            return Err(RecorderError::Encoder("codec release failed".into()));
        }
        log.released = true;
        Ok(())
    }
}

/// Creates one [`FakeEncoder`] per session and keeps each encoder's tap.
pub(crate) struct FakeEncoderProvider {
    input_slots: usize,
    input_size: usize,
    knobs: Mutex<EncoderKnobs>,
    taps: Mutex<Vec<EncoderTap>>,
}

impl FakeEncoderProvider {
    pub fn new() -> Self {
        Self {
            input_slots: 4,
            input_size: 8192,
            knobs: Mutex::new(EncoderKnobs::default()),
            taps: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_release() -> Self {
        let provider = Self::new();
        provider.knobs.lock().fail_release = true;
        provider
    }

    pub fn tap(&self, session: usize) -> EncoderTap {
        self.taps.lock()[session].clone()
    }
}

impl EncoderProvider for FakeEncoderProvider {
    type Encoder = FakeEncoder;

    fn create_encoder(&self) -> Result<FakeEncoder, RecorderError> {
        let tap = EncoderTap::default();
        tap.0.lock().knobs = self.knobs.lock().clone();
        self.taps.lock().push(tap.clone());
        Ok(FakeEncoder::with_tap(self.input_slots, self.input_size, tap))
    }
}

// --- Listener ---

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ListenerEvent {
    Stopped(PathBuf),
    Failed(RecorderError),
}

/// Records every notification and the thread it arrived on.
#[derive(Default)]
pub(crate) struct TapListener {
    events: Mutex<Vec<(ListenerEvent, Option<String>)>>,
    arrived: Condvar,
}

impl TapListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: ListenerEvent) {
        let thread_name = thread::current().name().map(str::to_string);
        self.events.lock().push((event, thread_name));
        self.arrived.notify_all();
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().iter().map(|(event, _)| event.clone()).collect()
    }

    pub fn thread_names(&self) -> Vec<Option<String>> {
        self.events.lock().iter().map(|(_, name)| name.clone()).collect()
    }

    /// Block until at least `count` notifications arrived.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while events.len() < count {
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                return events.len() >= count;
            }
        }
        true
    }
}

impl RecordingListener for TapListener {
    fn on_stop(&self, result: &RecordingResult) {
        self.record(ListenerEvent::Stopped(result.file_path.clone()));
    }

    fn on_error(&self, error: &RecorderError) {
        self.record(ListenerEvent::Failed(error.clone()));
    }
}

// --- Writers ---

/// Accepts a byte budget, then fails every write. Can also fail flush.
pub(crate) struct FailingWriter {
    budget: usize,
    fail_flush: bool,
}

impl FailingWriter {
    pub fn after(budget: usize) -> Self {
        Self {
            budget,
            fail_flush: false,
        }
    }

    pub fn failing_flush() -> Self {
        Self {
            budget: usize::MAX,
            fail_flush: true,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.budget {
            return Err(io::Error::other("disk full"));
        }
        self.budget -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_flush {
            return Err(io::Error::other("flush failed"));
        }
        Ok(())
    }
}

/// Lets one test pair a working sink with a failing one of the same type.
pub(crate) enum SinkWriter {
    Ok(Vec<u8>),
    Failing(FailingWriter),
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Ok(inner) => inner.write(buf),
            Self::Failing(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Ok(inner) => inner.flush(),
            Self::Failing(inner) => inner.flush(),
        }
    }
}
