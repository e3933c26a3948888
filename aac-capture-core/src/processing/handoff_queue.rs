use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::AudioChunk;

/// Outcome of [`HandoffQueue::pop_timeout`].
#[derive(Debug, PartialEq, Eq)]
pub enum Popped {
    Chunk(AudioChunk),
    /// Nothing arrived within the timeout; the producer may still push.
    TimedOut,
    /// The queue is closed and every chunk has been handed out.
    Drained,
}

struct QueueState {
    chunks: VecDeque<AudioChunk>,
    closed: bool,
}

/// Bounded FIFO between the capture loop and the encode loop.
///
/// Unlike a ring buffer this never drops data: `push` blocks while the queue
/// is full, which throttles the producer to the consumer's pace. Closing the
/// queue wakes both sides; a closed queue refuses new chunks but still hands
/// out the ones already queued.
pub struct HandoffQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl HandoffQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Append a chunk, blocking while the queue is full.
    ///
    /// Returns the chunk back if the queue was closed before it could be queued.
    pub fn push(&self, chunk: AudioChunk) -> Result<(), AudioChunk> {
        let mut state = self.state.lock();
        while state.chunks.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(chunk);
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest chunk, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Popped {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(chunk) = state.chunks.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Popped::Chunk(chunk);
            }
            if state.closed {
                return Popped::Drained;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match state.chunks.pop_front() {
                    Some(chunk) => {
                        drop(state);
                        self.not_full.notify_one();
                        Popped::Chunk(chunk)
                    }
                    None if state.closed => Popped::Drained,
                    None => Popped::TimedOut,
                };
            }
        }
    }

    /// Refuse further pushes and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
