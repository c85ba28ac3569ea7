use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::Notify;

const PUBLISHING: u8 = 0b001;
const PLAYING: u8 = 0b010;
const ENDED: u8 = 0b100;

/// Snapshot of a [`ReplayState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayStatus {
    pub publishing: bool,
    pub playing: bool,
    pub ended: bool,
}

/// Control word shared between a replay controller and its worker.
///
/// All three flags live in one atomic; waiters park on a [`Notify`] that
/// is woken on `resume` and `stop`.
#[derive(Debug)]
pub struct ReplayState {
    word: AtomicU8,
    wake: Notify,
}

impl Default for ReplayState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayState {
    /// Not publishing, playing, not ended.
    pub fn new() -> Self {
        Self {
            word: AtomicU8::new(PLAYING),
            wake: Notify::new(),
        }
    }

    pub fn status(&self) -> ReplayStatus {
        let w = self.word.load(Ordering::Acquire);
        ReplayStatus {
            publishing: w & PUBLISHING != 0,
            playing: w & PLAYING != 0,
            ended: w & ENDED != 0,
        }
    }

    /// Set `publishing` if it is clear. Returns false when a replay is
    /// already active.
    pub fn try_begin(&self) -> bool {
        let mut cur = self.word.load(Ordering::Acquire);
        loop {
            if cur & PUBLISHING != 0 {
                return false;
            }
            match self.word.compare_exchange_weak(
                cur,
                cur | PUBLISHING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn finish(&self) {
        self.word.fetch_and(!PUBLISHING, Ordering::AcqRel);
    }

    pub fn pause(&self) {
        self.word.fetch_and(!PLAYING, Ordering::AcqRel);
    }

    pub fn resume(&self) {
        self.word.fetch_or(PLAYING, Ordering::AcqRel);
        self.wake.notify_waiters();
    }

    pub fn stop(&self) {
        self.word.fetch_or(ENDED, Ordering::AcqRel);
        self.wake.notify_waiters();
    }

    pub fn is_ended(&self) -> bool {
        self.word.load(Ordering::Acquire) & ENDED != 0
    }

    pub fn is_playing(&self) -> bool {
        self.word.load(Ordering::Acquire) & PLAYING != 0
    }

    /// Park until playing or ended. Returns true if the replay should go on.
    pub async fn wait_playing(&self) -> bool {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            // Register before re-checking so a resume between the check
            // and the await is not lost.
            notified.as_mut().enable();
            let w = self.word.load(Ordering::Acquire);
            if w & ENDED != 0 {
                return false;
            }
            if w & PLAYING != 0 {
                return true;
            }
            notified.await;
        }
    }
}
