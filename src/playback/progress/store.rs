use super::throttle::{PendingSave, SaveThrottle};
use super::{ProgressRecord, ProgressStorage};
use crate::descriptor::VideoType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Storage operations, applied strictly in submission order
enum StoreOp {
    Put {
        video_id: String,
        record: ProgressRecord,
    },
    Remove {
        video_id: String,
    },
    Load {
        video_id: String,
        reply: oneshot::Sender<Option<ProgressRecord>>,
    },
    Settle {
        reply: oneshot::Sender<()>,
    },
}

/// Throttled, ordered access to a `ProgressStorage`.
///
/// Saves are coalesced by a `SaveThrottle`; everything that reaches storage goes through
/// a single writer task, so a `clear` is never overtaken by an earlier save and a `load`
/// sees every write queued before it.
pub struct ProgressStore {
    throttle: SaveThrottle,
    op_tx: tokio_mpsc::UnboundedSender<StoreOp>,
}

impl ProgressStore {
    /// Spawn the writer task. Must be called from within a Tokio runtime.
    pub fn new(storage: Arc<dyn ProgressStorage>, save_interval: Duration) -> Self {
        let (op_tx, op_rx) = tokio_mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage, op_rx));

        ProgressStore {
            throttle: SaveThrottle::new(save_interval),
            op_tx,
        }
    }

    /// Record a position. Written at most once per save interval (last write wins).
    pub fn save(&mut self, video_id: &str, current_time: f64, duration: f64, video_type: VideoType) {
        let now = Instant::now();
        // Close an expired window before opening the next one
        self.flush_due_at(now);

        let save = PendingSave {
            video_id: video_id.to_string(),
            record: ProgressRecord::new(current_time, duration, video_type),
        };
        if let Some(displaced) = self.throttle.offer(save, now) {
            self.submit_put(displaced);
        }
    }

    /// Write the pending save if its window has closed. Returns true if a write was queued.
    pub fn flush_due(&mut self) -> bool {
        self.flush_due_at(Instant::now())
    }

    /// Write the pending save now, whatever the window says
    pub fn flush(&mut self) {
        if let Some(save) = self.throttle.take_pending() {
            self.submit_put(save);
        }
    }

    /// When the pending save becomes due, if there is one
    pub fn next_flush_at(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    pub fn has_pending(&self) -> bool {
        self.throttle.has_pending()
    }

    /// Fetch the stored record. The answer reflects every write queued before this call.
    pub fn load(&self, video_id: &str) -> oneshot::Receiver<Option<ProgressRecord>> {
        let (reply, rx) = oneshot::channel();
        self.submit(StoreOp::Load {
            video_id: video_id.to_string(),
            reply,
        });
        rx
    }

    /// Forget a video's position, including any save still waiting for its window
    pub fn clear(&mut self, video_id: &str) {
        self.throttle.discard(video_id);
        self.submit(StoreOp::Remove {
            video_id: video_id.to_string(),
        });
    }

    /// Natural end of a video: persist it as fully watched one last time, then clear it
    pub fn complete(&mut self, video_id: &str, duration: f64, video_type: VideoType) {
        info!("Video {} completed, clearing stored progress", video_id);
        self.throttle.discard(video_id);
        self.submit_put(PendingSave {
            video_id: video_id.to_string(),
            record: ProgressRecord::new(duration, duration, video_type),
        });
        self.clear(video_id);
    }

    /// Wait until every operation queued so far has reached storage
    pub async fn settle(&self) {
        let (reply, rx) = oneshot::channel();
        self.submit(StoreOp::Settle { reply });
        let _ = rx.await;
    }

    fn flush_due_at(&mut self, now: Instant) -> bool {
        match self.throttle.due(now) {
            Some(save) => {
                self.submit_put(save);
                true
            }
            None => false,
        }
    }

    fn submit_put(&self, save: PendingSave) {
        debug!(
            "Persisting progress for {} at {:.1}s ({:.1}%)",
            save.video_id, save.record.current_time, save.record.percentage
        );
        self.submit(StoreOp::Put {
            video_id: save.video_id,
            record: save.record,
        });
    }

    fn submit(&self, op: StoreOp) {
        if self.op_tx.send(op).is_err() {
            warn!("Progress writer has shut down, dropping operation");
        }
    }
}

async fn run_writer(
    storage: Arc<dyn ProgressStorage>,
    mut op_rx: tokio_mpsc::UnboundedReceiver<StoreOp>,
) {
    while let Some(op) = op_rx.recv().await {
        match op {
            StoreOp::Put { video_id, record } => {
                if let Err(e) = storage.put(&video_id, &record).await {
                    warn!("Failed to save progress for {}: {}", video_id, e);
                }
            }
            StoreOp::Remove { video_id } => {
                if let Err(e) = storage.remove(&video_id).await {
                    warn!("Failed to clear progress for {}: {}", video_id, e);
                }
            }
            StoreOp::Load { video_id, reply } => {
                let record = match storage.load(&video_id).await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Failed to load progress for {}: {}", video_id, e);
                        None
                    }
                };
                let _ = reply.send(record);
            }
            StoreOp::Settle { reply } => {
                let _ = reply.send(());
            }
        }
    }
    debug!("Progress writer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::progress::MemoryProgressStorage;

    fn store() -> (ProgressStore, Arc<MemoryProgressStorage>) {
        let storage = Arc::new(MemoryProgressStorage::new());
        let store = ProgressStore::new(storage.clone(), Duration::from_secs(3));
        (store, storage)
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_is_written_when_window_closes() {
        let (mut store, storage) = store();
        store.save("v1", 10.0, 100.0, VideoType::Lesson);
        store.settle().await;
        assert!(storage.load("v1").await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.flush_due());
        store.settle().await;
        assert_eq!(storage.load("v1").await.unwrap().unwrap().current_time, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_sees_earlier_flush() {
        let (mut store, _storage) = store();
        store.save("v1", 42.0, 100.0, VideoType::Lesson);
        store.flush();
        let record = store.load("v1").await.unwrap().unwrap();
        assert_eq!(record.current_time, 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_discards_pending_and_clears() {
        let (mut store, storage) = store();
        store.save("v1", 50.0, 100.0, VideoType::Lesson);
        store.complete("v1", 100.0, VideoType::Lesson);
        assert!(!store.has_pending());
        store.settle().await;
        assert!(storage.load("v1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_videos_keeps_both_positions() {
        let (mut store, storage) = store();
        store.save("v1", 30.0, 100.0, VideoType::Lesson);
        store.save("v2", 5.0, 50.0, VideoType::Intro);
        store.flush();
        store.settle().await;
        assert_eq!(storage.load("v1").await.unwrap().unwrap().current_time, 30.0);
        assert_eq!(storage.load("v2").await.unwrap().unwrap().current_time, 5.0);
    }
}
