use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::frame::canonical::CanonicalFrame;

/// Outcome of [`DeliverySlot::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The slot was empty.
    Stored,
    /// An unconsumed frame was discarded to make room.
    Replaced,
    /// The slot is closed; the frame was dropped.
    Closed,
}

/// Why a pop returned without a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The producer closed the slot and no frame remains.
    Closed,
    /// The deadline passed while the producer was still running.
    Timeout,
}

#[derive(Default)]
struct SlotState {
    frame: Option<CanonicalFrame>,
    closed: bool,
}

/// Single-frame mailbox between the driver and one consumer.
///
/// `push` never blocks and always keeps the freshest frame. `pop` blocks
/// until a frame arrives or the slot is closed. Presence and payload live
/// under one lock, so a consumer never observes a partial frame.
pub struct DeliverySlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    /// Wakes async consumers; blocking consumers use `ready`.
    notify: Notify,
}

impl DeliverySlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Store `frame`, discarding any frame not yet consumed.
    pub fn push(&self, frame: CanonicalFrame) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            match state.frame.replace(frame) {
                Some(_) => PushOutcome::Replaced,
                None => PushOutcome::Stored,
            }
        };
        self.ready.notify_one();
        self.notify.notify_waiters();
        outcome
    }

    /// Take the frame if one is waiting.
    pub fn try_pop(&self) -> Option<CanonicalFrame> {
        self.state.lock().frame.take()
    }

    /// Block until a frame is available or the slot is closed.
    ///
    /// A frame stored before closing is still handed out; only an empty,
    /// closed slot reports end-of-stream.
    pub fn pop(&self) -> Result<CanonicalFrame, PopError> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Ok(frame);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<CanonicalFrame, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frame.take() {
                return Ok(frame);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.frame.take() {
                    Some(frame) => Ok(frame),
                    None if state.closed => Err(PopError::Closed),
                    None => Err(PopError::Timeout),
                };
            }
        }
    }

    /// Async counterpart of [`pop`](Self::pop). Returns `None` at
    /// end-of-stream.
    pub async fn recv(&self) -> Option<CanonicalFrame> {
        loop {
            // Register interest before checking so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(frame) = state.frame.take() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark end-of-stream and wake every waiting consumer. Idempotent.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether a frame is waiting to be consumed.
    pub fn is_occupied(&self) -> bool {
        self.state.lock().frame.is_some()
    }
}

impl Default for DeliverySlot {
    fn default() -> Self {
        Self::new()
    }
}
