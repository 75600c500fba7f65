use super::ProgressRecord;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A save waiting for its window to close
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub video_id: String,
    pub record: ProgressRecord,
}

/// Trailing-edge throttle for progress saves.
///
/// The first save opens a window; every save inside it replaces the pending one, and
/// the latest is released when the window closes. N seconds of saves therefore
/// produce at most ⌈N / window⌉ writes, the last carrying the final position.
#[derive(Debug)]
pub struct SaveThrottle {
    window: Duration,
    deadline: Option<Instant>,
    pending: Option<PendingSave>,
}

impl SaveThrottle {
    pub fn new(window: Duration) -> Self {
        SaveThrottle {
            window,
            deadline: None,
            pending: None,
        }
    }

    /// Queue a save. A pending save for a different video is handed back so the
    /// caller can write it immediately instead of losing it.
    pub fn offer(&mut self, save: PendingSave, now: Instant) -> Option<PendingSave> {
        let displaced = match &self.pending {
            Some(pending) if pending.video_id != save.video_id => self.pending.take(),
            Some(_) => {
                debug!("Coalescing progress save for {}", save.video_id);
                None
            }
            None => None,
        };

        if self.deadline.is_none() || displaced.is_some() {
            self.deadline = Some(now + self.window);
        }
        self.pending = Some(save);
        displaced
    }

    /// Release the pending save if its window has closed
    pub fn due(&mut self, now: Instant) -> Option<PendingSave> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Release the pending save regardless of the window
    pub fn take_pending(&mut self) -> Option<PendingSave> {
        self.deadline = None;
        self.pending.take()
    }

    /// Drop a pending save for `video_id` without writing it
    pub fn discard(&mut self, video_id: &str) {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.video_id == video_id)
        {
            self.pending = None;
            self.deadline = None;
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
