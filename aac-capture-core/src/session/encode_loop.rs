use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::cancellation::CancellationToken;
use crate::models::audio_models::{AacProfile, AudioChunk, InputBufferIndex, OutputBufferInfo};
use crate::models::config::RecorderConfiguration;
use crate::models::error::RecorderError;
use crate::models::recording_result::SessionStats;
use crate::processing::adts;
use crate::processing::handoff_queue::{HandoffQueue, Popped};
use crate::storage::stream_writer::{FinishedStream, StreamWriter};
use crate::traits::block_encoder::BlockEncoder;

/// Fixed per-session parameters of the encode loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodeSettings {
    pub profile: AacProfile,
    pub sample_rate: u32,
    pub channel_config: u8,
    pub input_timeout: Option<Duration>,
    pub output_poll_timeout: Duration,
    pub pop_timeout: Duration,
}

impl EncodeSettings {
    pub fn from_config(config: &RecorderConfiguration) -> Self {
        Self {
            profile: config.profile,
            sample_rate: config.sample_rate,
            // validate() keeps channels within 1..=7
            channel_config: config.channels.min(7) as u8,
            input_timeout: config.input_timeout,
            output_poll_timeout: config.output_poll_timeout,
            pop_timeout: config.pop_timeout,
        }
    }
}

/// Consumer side of a session: hand-off queue → encoder → ADTS packets → sink.
pub(crate) struct EncodeLoop<E: BlockEncoder, W: Write> {
    pub encoder: E,
    pub queue: Arc<HandoffQueue>,
    pub token: CancellationToken,
    pub output: StreamWriter<W>,
    pub debug: Option<StreamWriter<W>>,
    pub settings: EncodeSettings,
}

/// What the encode thread hands back to the control thread for teardown.
pub(crate) struct EncodeOutcome<E, W: Write> {
    pub encoder: E,
    /// Still open; teardown flushes and closes it.
    pub output: StreamWriter<W>,
    pub debug: Option<FinishedStream>,
    /// Encode-side counters only; capture counters are filled in by the controller.
    pub stats: SessionStats,
    pub error: Option<RecorderError>,
}

struct Pump<'a, E: BlockEncoder, W: Write> {
    encoder: &'a mut E,
    output: &'a mut StreamWriter<W>,
    debug: Option<&'a mut StreamWriter<W>>,
    queue: &'a HandoffQueue,
    token: &'a CancellationToken,
    settings: EncodeSettings,
    stats: SessionStats,
    /// Set once a debug write fails; the mirror is then incomplete.
    debug_failed: bool,
}

impl<E: BlockEncoder, W: Write> EncodeLoop<E, W> {
    pub fn run(self) -> EncodeOutcome<E, W> {
        let EncodeLoop {
            mut encoder,
            queue,
            token,
            mut output,
            mut debug,
            settings,
        } = self;

        let mut pump = Pump {
            encoder: &mut encoder,
            output: &mut output,
            debug: debug.as_mut(),
            queue: &queue,
            token: &token,
            settings,
            stats: SessionStats::default(),
            debug_failed: false,
        };
        let result = pump.pump();
        let stats = pump.stats;
        let debug_failed = pump.debug_failed;

        let mut error = None;
        if let Err(e) = result {
            log::error!("Encode loop failed: {}", e);
            token.abort();
            queue.close();
            error = Some(e);
        }

        if debug_failed {
            if let Some(debug) = debug.take() {
                log::warn!("Discarding debug raw sink {} after a failed write", debug.file_path().display());
            }
        }
        let debug = match debug.map(StreamWriter::close).transpose() {
            Ok(finished) => finished,
            Err(e) => {
                log::error!("Failed to close debug raw sink: {}", e);
                error.get_or_insert(e);
                None
            }
        };

        log::debug!(
            "Encode loop finished: {} chunks encoded, {} packets written",
            stats.chunks_encoded,
            stats.packets_written
        );
        EncodeOutcome {
            encoder,
            output,
            debug,
            stats,
            error,
        }
    }
}

impl<E: BlockEncoder, W: Write> Pump<'_, E, W> {
    /// Consume chunks until capture has closed the queue and nothing is left.
    fn pump(&mut self) -> Result<(), RecorderError> {
        loop {
            if self.token.is_aborted() {
                log::debug!("Encode loop aborted");
                return Ok(());
            }

            let chunk = match self.queue.pop_timeout(self.settings.pop_timeout) {
                Popped::Chunk(chunk) => chunk,
                Popped::TimedOut => continue,
                Popped::Drained => return self.drain_output(),
            };

            if let Some(debug) = self.debug.as_mut() {
                if let Err(e) = debug.write(chunk.as_bytes()) {
                    self.debug_failed = true;
                    return Err(e);
                }
            }

            if self.submit(&chunk)? {
                self.stats.chunks_encoded += 1;
            }
            self.drain_output()?;
        }
    }

    /// Copy one chunk into an encoder input buffer and queue it.
    ///
    /// Returns false if the session was aborted while waiting for a slot.
    fn submit(&mut self, chunk: &AudioChunk) -> Result<bool, RecorderError> {
        let index = loop {
            if let Some(index) = self.encoder.acquire_input_buffer(self.settings.input_timeout)? {
                break index;
            }
            // No free slot yet; pull finished output so the codec can make progress.
            self.drain_output()?;
            if self.token.is_aborted() {
                return Ok(false);
            }
        };

        let filled = match self.encoder.input_buffer(index) {
            Ok(buffer) if buffer.len() >= chunk.len() => {
                buffer[..chunk.len()].copy_from_slice(chunk.as_bytes());
                Ok(())
            }
            Ok(buffer) => Err(RecorderError::Encoder(format!(
                "input buffer holds {} bytes, chunk has {}",
                buffer.len(),
                chunk.len()
            ))),
            Err(e) => Err(e),
        };

        if let Err(e) = filled.and_then(|()| self.encoder.submit_input(index, chunk.len())) {
            self.return_input(index);
            return Err(e);
        }
        Ok(true)
    }

    /// Hand an acquired input buffer back unused.
    fn return_input(&mut self, index: InputBufferIndex) {
        if let Err(e) = self.encoder.submit_input(index, 0) {
            log::warn!("Failed to return input buffer {:?}: {}", index, e);
        }
    }

    /// Poll until the encoder has nothing ready, framing every unit.
    fn drain_output(&mut self) -> Result<(), RecorderError> {
        while let Some(info) = self.encoder.poll_output_buffer(self.settings.output_poll_timeout)? {
            let written = self.write_unit(&info);
            let released = self.encoder.release_output_buffer(info.index);
            written?;
            released?;
            if info.flags.end_of_stream {
                break;
            }
        }
        Ok(())
    }

    fn write_unit(&mut self, info: &OutputBufferInfo) -> Result<(), RecorderError> {
        if info.flags.codec_config {
            log::debug!("Skipping {}-byte codec config unit", info.size);
            return Ok(());
        }
        if info.size == 0 {
            return Ok(());
        }

        let buffer = self.encoder.output_buffer(info.index)?;
        let payload = info
            .offset
            .checked_add(info.size)
            .and_then(|end| buffer.get(info.offset..end))
            .ok_or_else(|| {
                RecorderError::Encoder(format!(
                    "output {:?} range {}+{} exceeds buffer of {} bytes",
                    info.index,
                    info.offset,
                    info.size,
                    buffer.len()
                ))
            })?;

        let packet = adts::frame_packet(
            self.settings.profile,
            self.settings.sample_rate,
            self.settings.channel_config,
            payload,
        )?;
        self.output.write(&packet)?;
        self.stats.packets_written += 1;
        self.stats.bytes_written += packet.len() as u64;
        Ok(())
    }
}
