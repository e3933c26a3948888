use std::cell::Cell;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Scope, ScopedJoinHandle};

use parking_lot::Mutex;

use super::cancellation::CancellationToken;
use super::capture_loop::{CaptureLoop, CaptureOutcome};
use super::completion::{Completion, SessionHandle};
use super::encode_loop::{EncodeLoop, EncodeOutcome, EncodeSettings};
use crate::models::audio_models::AudioSource;
use crate::models::config::RecorderConfiguration;
use crate::models::error::RecorderError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::processing::handoff_queue::HandoffQueue;
use crate::storage::metadata;
use crate::storage::path_allocator::PathAllocator;
use crate::storage::stream_writer::StreamWriter;
use crate::traits::block_encoder::{BlockEncoder, EncoderProvider};
use crate::traits::capture_source::{CaptureDevice, RawCaptureSource};
use crate::traits::recording_listener::RecordingListener;

/// Starts and stops recording sessions, at most one at a time.
///
/// Each session runs three named threads:
/// ```text
/// aac-capture-N:  [CaptureDevice] → read → HandoffQueue (bounded, blocking)
/// aac-encode-N:   HandoffQueue → BlockEncoder → ADTS header → .aac sink
///                                      └→ raw .pcm sink (optional)
/// aac-session-N:  joins both, tears down, notifies the listener once
/// ```
///
/// `begin` while a session is active stops that session and waits for it to
/// finish. A listener may call `begin` to restart recording; if another
/// thread is inside `begin` at that moment the call fails with
/// [`RecorderError::SessionBusy`] instead of waiting, since that thread may
/// be waiting for the listener's own session.
pub struct SessionController<D: CaptureDevice, P: EncoderProvider> {
    device: D,
    encoders: P,
    config: RecorderConfiguration,
    output_paths: PathAllocator,
    debug_paths: Option<PathAllocator>,
    begin_lock: Mutex<()>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

thread_local! {
    static ON_CONTROL_THREAD: Cell<bool> = const { Cell::new(false) };
}

struct ActiveSession {
    handle: SessionHandle,
    control: JoinHandle<()>,
}

/// Files reserved for one session before anything is started.
struct SessionFiles {
    output_path: PathBuf,
    output: File,
    debug: Option<(PathBuf, File)>,
}

impl SessionFiles {
    /// Close and delete the reserved files of a session that never started.
    fn remove(self) {
        let SessionFiles {
            output_path,
            output,
            debug,
        } = self;
        drop(output);
        let debug_path = debug.map(|(path, _file)| path);
        remove_files(std::iter::once(output_path).chain(debug_path));
    }
}

fn remove_files(paths: impl IntoIterator<Item = PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(&path) {
            log::warn!("Failed to remove unused file {}: {}", path.display(), e);
        }
    }
}

impl<D: CaptureDevice, P: EncoderProvider> SessionController<D, P> {
    pub fn new(device: D, encoders: P, config: RecorderConfiguration) -> Result<Self, RecorderError> {
        config.validate().map_err(RecorderError::ConfigurationFailed)?;
        let output_paths = PathAllocator::new(&config.output_directory, "aac");
        let debug_paths = config
            .debug_raw_directory
            .as_ref()
            .map(|dir| PathAllocator::new(dir, "pcm"));

        Ok(Self {
            device,
            encoders,
            config,
            output_paths,
            debug_paths,
            begin_lock: Mutex::new(()),
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn configuration(&self) -> &RecorderConfiguration {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_info(&self) -> AudioSource {
        self.device.device_info()
    }

    /// Start a new session, terminating the active one first.
    ///
    /// Returns once the pipeline threads are running. The outcome arrives
    /// through the returned handle and, if given, exactly one call on
    /// `listener` from the session's control thread.
    pub fn begin(&self, listener: Option<Arc<dyn RecordingListener>>) -> Result<SessionHandle, RecorderError> {
        let _begin = if ON_CONTROL_THREAD.with(Cell::get) {
            self.begin_lock.try_lock().ok_or_else(|| {
                RecorderError::SessionBusy("another thread is starting a session".into())
            })?
        } else {
            self.begin_lock.lock()
        };

        let prior = self.active.lock().take();
        if let Some(prior) = prior {
            log::info!("Session {} still active, terminating before starting a new one", prior.handle.id());
            terminate(prior);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let files = self.reserve_files()?;
        let output_path = files.output_path.clone();

        let (encoder, source) = match self.prepare() {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("Session {} failed to start: {}", id, e);
                files.remove();
                return Err(e);
            }
        };

        let (handle, pipeline) = self.assemble(id, files, encoder, source, listener);
        let control = spawn_control(format!("aac-session-{}", id), pipeline)?;

        log::info!("Session {} recording to {}", id, output_path.display());
        *self.active.lock() = Some(ActiveSession {
            handle: handle.clone(),
            control,
        });
        Ok(handle)
    }

    /// Wire the prepared encoder, source and files into one session.
    fn assemble(
        &self,
        id: u64,
        files: SessionFiles,
        encoder: P::Encoder,
        source: D::Source,
        listener: Option<Arc<dyn RecordingListener>>,
    ) -> (SessionHandle, Pipeline<D::Source, P::Encoder, BufWriter<File>>) {
        let token = CancellationToken::new();
        let completion = Arc::new(Completion::new());
        let SessionFiles {
            output_path,
            output,
            debug,
        } = files;
        let debug_path = debug.as_ref().map(|(path, _)| path.clone());
        let handle = SessionHandle::new(id, token.clone(), Arc::clone(&completion), output_path.clone());
        let queue = Arc::new(HandoffQueue::new(self.config.queue_capacity));

        let pipeline = Pipeline {
            id,
            capture: CaptureLoop {
                source,
                queue: Arc::clone(&queue),
                token: token.clone(),
                chunk_size: self.config.chunk_size,
            },
            encode: EncodeLoop {
                encoder,
                queue,
                token,
                output: StreamWriter::for_file(output_path, output),
                debug: debug.map(|(path, file)| StreamWriter::for_file(path, file)),
                settings: EncodeSettings::from_config(&self.config),
            },
            finish: Finisher {
                id,
                config: self.config.clone(),
                debug_path,
                completion,
                listener,
            },
        };
        (handle, pipeline)
    }

    /// Request a graceful stop of `handle`'s session. Never blocks.
    ///
    /// Returns false if that session was already stopping or finished.
    pub fn end(&self, handle: &SessionHandle) -> bool {
        handle.stop()
    }

    /// Request a graceful stop of whichever session is active.
    pub fn end_active(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => active.handle.stop(),
            None => false,
        }
    }

    /// The most recently started session, unless it has already finished.
    pub fn active_session(&self) -> Option<SessionHandle> {
        self.active
            .lock()
            .as_ref()
            .filter(|active| !active.handle.is_finished())
            .map(|active| active.handle.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active_session().is_some()
    }

    fn reserve_files(&self) -> Result<SessionFiles, RecorderError> {
        let (output_path, output) = self.output_paths.allocate()?;
        let debug = match &self.debug_paths {
            Some(paths) => match paths.allocate() {
                Ok(reserved) => Some(reserved),
                Err(e) => {
                    drop(output);
                    if let Err(remove_err) = fs::remove_file(&output_path) {
                        log::warn!("Failed to remove {}: {}", output_path.display(), remove_err);
                    }
                    return Err(e);
                }
            },
            None => None,
        };
        Ok(SessionFiles {
            output_path,
            output,
            debug,
        })
    }

    /// Configure and start the encoder, then open the device.
    fn prepare(&self) -> Result<(P::Encoder, D::Source), RecorderError> {
        let mut encoder = self.encoders.create_encoder()?;
        let started = encoder
            .configure(&self.config.encoder_format())
            .and_then(|()| encoder.start());
        if let Err(e) = started {
            shut_down_encoder(&mut encoder);
            return Err(e);
        }

        match self.device.open(&self.config.capture_format()) {
            Ok(source) => Ok((encoder, source)),
            Err(e) => {
                shut_down_encoder(&mut encoder);
                Err(e)
            }
        }
    }
}

impl<D: CaptureDevice, P: EncoderProvider> Drop for SessionController<D, P> {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            terminate(active);
        }
    }
}

/// Stop a session and wait until it has torn down and notified its listener.
fn terminate(active: ActiveSession) {
    let ActiveSession { handle, control } = active;
    handle.stop();
    if let Err(e) = handle.wait() {
        log::debug!("Terminated session {} ended with: {}", handle.id(), e);
    }
    // A listener restarting the recorder runs on this very thread.
    if control.thread().id() == thread::current().id() {
        return;
    }
    if control.join().is_err() {
        log::error!("Session {} control thread panicked", handle.id());
    }
}

/// Start the control thread. If the thread cannot be spawned the pipeline
/// is taken back and its device, encoder and files are released.
fn spawn_control<S, E, W>(name: String, pipeline: Pipeline<S, E, W>) -> Result<JoinHandle<()>, RecorderError>
where
    S: RawCaptureSource + 'static,
    E: BlockEncoder + 'static,
    W: Write + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(pipeline)));
    let shared = Arc::clone(&slot);
    let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
        let pipeline = shared.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.run();
        }
    });

    spawned.map_err(|e| {
        log::error!("Failed to spawn {}: {}", name, e);
        let pipeline = slot.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.abandon();
        }
        RecorderError::Unknown(format!("failed to spawn {}: {}", name, e))
    })
}

fn shut_down_encoder<E: BlockEncoder>(encoder: &mut E) {
    if let Err(e) = encoder.stop() {
        log::warn!("Failed to stop encoder: {}", e);
    }
    if let Err(e) = encoder.release() {
        log::warn!("Failed to release encoder: {}", e);
    }
}

/// Everything one session owns, moved onto its control thread.
struct Pipeline<S: RawCaptureSource, E: BlockEncoder, W: Write> {
    id: u64,
    capture: CaptureLoop<S>,
    encode: EncodeLoop<E, W>,
    finish: Finisher,
}

impl<S, E, W> Pipeline<S, E, W>
where
    S: RawCaptureSource,
    E: BlockEncoder,
    W: Write + Send,
{
    fn run(self) {
        ON_CONTROL_THREAD.with(|flag| flag.set(true));
        let Pipeline {
            id,
            capture,
            encode,
            finish,
        } = self;
        let token = capture.token.clone();
        let queue = Arc::clone(&capture.queue);

        let joined = thread::scope(|scope| -> Result<_, RecorderError> {
            let encoding = spawn_worker(scope, format!("aac-encode-{}", id), move || encode.run())?;
            let capturing = match spawn_worker(scope, format!("aac-capture-{}", id), move || capture.run()) {
                Ok(handle) => handle,
                Err(e) => {
                    token.abort();
                    queue.close();
                    let _ = encoding.join();
                    return Err(e);
                }
            };

            let encoded = encoding.join();
            if encoded.is_err() {
                token.abort();
                queue.close();
            }
            let captured = capturing.join();
            match (captured, encoded) {
                (Ok(captured), Ok(encoded)) => Ok((captured, encoded)),
                _ => Err(RecorderError::Unknown(format!("session {} pipeline thread panicked", id))),
            }
        });

        let outcome = joined.and_then(|(captured, encoded)| finish.teardown(captured, encoded));
        finish.deliver(outcome);
    }
}

impl<S: RawCaptureSource, E: BlockEncoder, W: Write> Pipeline<S, E, W> {
    /// Undo a session whose threads never started.
    fn abandon(self) {
        let Pipeline { id, capture, encode, .. } = self;
        let mut source = capture.source;
        for (step, result) in [("stop", source.stop()), ("release", source.release())] {
            if let Err(e) = result {
                log::warn!("Session {}: failed to {} capture source: {}", id, step, e);
            }
        }

        let EncodeLoop {
            mut encoder,
            output,
            debug,
            ..
        } = encode;
        shut_down_encoder(&mut encoder);
        let paths: Vec<PathBuf> = std::iter::once(output)
            .chain(debug)
            .map(|writer| writer.file_path().to_path_buf())
            .collect();
        remove_files(paths);
    }
}

fn spawn_worker<'scope, T, F>(
    scope: &'scope Scope<'scope, '_>,
    name: String,
    work: F,
) -> Result<ScopedJoinHandle<'scope, T>, RecorderError>
where
    T: Send + 'scope,
    F: FnOnce() -> T + Send + 'scope,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(scope, work)
        .map_err(|e| RecorderError::Unknown(format!("failed to spawn {}: {}", name, e)))
}

/// Teardown and terminal notification, run on the control thread.
struct Finisher {
    id: u64,
    config: RecorderConfiguration,
    debug_path: Option<PathBuf>,
    completion: Arc<Completion>,
    listener: Option<Arc<dyn RecordingListener>>,
}

impl Finisher {
    /// Close the encoded sink, stop and release device and encoder, and
    /// build the result. The first failure wins; every step still runs.
    fn teardown<S, E, W>(
        &self,
        captured: CaptureOutcome<S>,
        encoded: EncodeOutcome<E, W>,
    ) -> Result<RecordingResult, RecorderError>
    where
        S: RawCaptureSource,
        E: BlockEncoder,
        W: Write,
    {
        let CaptureOutcome {
            mut source,
            chunks,
            bytes,
            error: capture_error,
        } = captured;
        let EncodeOutcome {
            mut encoder,
            output,
            debug,
            mut stats,
            error: encode_error,
        } = encoded;
        stats.chunks_captured = chunks;
        stats.bytes_captured = bytes;

        let mut first_error = capture_error.or(encode_error);

        let finished = match output.close() {
            Ok(finished) => Some(finished),
            Err(e) => {
                log::error!("Session {}: {}", self.id, e);
                first_error.get_or_insert(e);
                None
            }
        };

        let steps = [
            ("stop capture source", source.stop()),
            ("release capture source", source.release()),
            ("stop encoder", encoder.stop()),
            ("release encoder", encoder.release()),
        ];
        for (step, result) in steps {
            if let Err(e) = result {
                log::error!("Session {}: failed to {}: {}", self.id, step, e);
                first_error.get_or_insert(RecorderError::Teardown(format!("{}: {}", step, e)));
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        let finished = finished.ok_or_else(|| RecorderError::Unknown("encoded sink was not closed".into()))?;

        let byte_rate = self.config.capture_format().byte_rate();
        let duration_secs = if byte_rate == 0 {
            0.0
        } else {
            stats.bytes_captured as f64 / byte_rate as f64
        };

        let metadata = RecordingMetadata::new_adts(
            &finished.file_path.to_string_lossy(),
            duration_secs,
            self.config.sample_rate,
            self.config.channels,
            self.config.bit_rate,
            stats.packets_written,
            &finished.checksum,
        );
        if self.config.write_metadata {
            if let Err(e) = metadata::write_metadata(&metadata, &finished.file_path) {
                log::warn!("Session {}: metadata sidecar not written: {}", self.id, e);
            }
        }

        Ok(RecordingResult {
            file_path: finished.file_path,
            debug_raw_path: debug.map(|d| d.file_path).or_else(|| self.debug_path.clone()),
            duration_secs,
            checksum: finished.checksum,
            stats,
            metadata,
        })
    }

    fn deliver(self, outcome: Result<RecordingResult, RecorderError>) {
        match &outcome {
            Ok(result) => log::info!(
                "Session {} finished: {} ({:.2}s, {} packets)",
                self.id,
                result.file_path.display(),
                result.duration_secs,
                result.stats.packets_written
            ),
            Err(e) => log::error!("Session {} failed: {}", self.id, e),
        }

        if !self.completion.finish(outcome.clone()) {
            return;
        }
        if let Some(listener) = &self.listener {
            match &outcome {
                Ok(result) => listener.on_stop(result),
                Err(e) => listener.on_error(e),
            }
        }
    }
}
