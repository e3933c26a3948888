use std::sync::Arc;

use super::cancellation::CancellationToken;
use crate::models::audio_models::AudioChunk;
use crate::models::error::RecorderError;
use crate::processing::handoff_queue::HandoffQueue;
use crate::traits::capture_source::RawCaptureSource;

/// Producer side of a session: device → hand-off queue.
pub(crate) struct CaptureLoop<S: RawCaptureSource> {
    pub source: S,
    pub queue: Arc<HandoffQueue>,
    pub token: CancellationToken,
    pub chunk_size: usize,
}

/// What the capture thread hands back to the control thread.
pub(crate) struct CaptureOutcome<S> {
    pub source: S,
    pub chunks: u64,
    pub bytes: u64,
    pub error: Option<RecorderError>,
}

/// Closes the queue when the capture thread exits, panics included, so the
/// encode loop always sees the end of the stream.
struct QueueCloser<'a>(&'a HandoffQueue);

impl Drop for QueueCloser<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl<S: RawCaptureSource> CaptureLoop<S> {
    pub fn run(self) -> CaptureOutcome<S> {
        let CaptureLoop {
            mut source,
            queue,
            token,
            chunk_size,
        } = self;
        let _closer = QueueCloser(&queue);

        let mut read_buffer = vec![0u8; chunk_size];
        let mut chunks = 0u64;
        let mut bytes = 0u64;
        let mut error = None;

        while token.is_running() {
            match source.read(&mut read_buffer) {
                Ok(0) => continue,
                Ok(n) => {
                    let chunk = AudioChunk::copy_from(&read_buffer[..n]);
                    if queue.push(chunk).is_err() {
                        log::debug!("Hand-off queue closed, capture exiting");
                        break;
                    }
                    chunks += 1;
                    bytes += n as u64;
                }
                Err(e) => {
                    log::error!("Capture read failed: {}", e);
                    token.abort();
                    error = Some(e);
                    break;
                }
            }
        }

        log::debug!("Capture loop finished: {} chunks, {} bytes", chunks, bytes);
        CaptureOutcome {
            source,
            chunks,
            bytes,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::handoff_queue::Popped;
    use crate::test_support::{FakeRead, FakeSource};
    use std::thread;
    use std::time::Duration;

    fn drain(queue: &HandoffQueue) -> Vec<AudioChunk> {
        let mut out = Vec::new();
        while let Popped::Chunk(c) = queue.pop_timeout(Duration::from_millis(1)) {
            out.push(c);
        }
        out
    }

    #[test]
    fn device_error_aborts_and_closes_queue() {
        let (source, tap) = FakeSource::scripted(vec![
            FakeRead::Data(vec![1; 2048]),
            FakeRead::Error("unplugged".into()),
        ]);
        let queue = Arc::new(HandoffQueue::new(10));
        let token = CancellationToken::new();

        let outcome = CaptureLoop {
            source,
            queue: Arc::clone(&queue),
            token: token.clone(),
            chunk_size: 2048,
        }
        .run();

        assert_eq!(outcome.error, Some(RecorderError::Device("unplugged".into())));
        assert_eq!(outcome.chunks, 1);
        assert!(token.is_aborted());
        assert!(queue.is_closed());
        assert_eq!(tap.reads(), 2);
        assert_eq!(drain(&queue).len(), 1);
    }

    #[test]
    fn short_reads_become_exact_chunks() {
        let (source, _) = FakeSource::scripted(vec![
            FakeRead::Data(vec![3; 100]),
            FakeRead::Data(vec![4; 2048]),
        ]);
        let queue = Arc::new(HandoffQueue::new(10));
        let token = CancellationToken::new();

        let worker = {
            let capture = CaptureLoop {
                source,
                queue: Arc::clone(&queue),
                token: token.clone(),
                chunk_size: 2048,
            };
            thread::spawn(move || capture.run())
        };
        thread::sleep(Duration::from_millis(30));
        token.request_stop();
        let outcome = worker.join().unwrap();

        assert!(outcome.error.is_none());
        assert_eq!(outcome.bytes, 2148);
        let lens: Vec<usize> = drain(&queue).iter().map(AudioChunk::len).collect();
        assert_eq!(lens, vec![100, 2048]);
    }

    #[test]
    fn stops_pushing_once_queue_is_closed() {
        let (source, _) = FakeSource::endless(vec![0; 512]);
        let queue = Arc::new(HandoffQueue::new(2));
        queue.close();

        let outcome = CaptureLoop {
            source,
            queue,
            token: CancellationToken::new(),
            chunk_size: 512,
        }
        .run();

        assert_eq!(outcome.chunks, 0);
        assert!(outcome.error.is_none());
    }
}
