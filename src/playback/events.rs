use crate::playback::backend::QualityLevel;
use crate::playback::state::PlaybackState;
use crate::playback::surface::ReadyState;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::info;

/// Notifications for the host UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged {
        state: PlaybackState,
    },
    TimeUpdate {
        current_time: f64,
        duration: f64,
    },
    BufferUpdate {
        buffered_percentage: f64,
    },
    ReadyStateChanged {
        ready_state: ReadyState,
    },
    VolumeChanged {
        volume: f64,
        muted: bool,
    },
    RateChanged {
        rate: f64,
    },
    FullscreenChanged {
        fullscreen: bool,
    },
    PictureInPictureChanged {
        active: bool,
    },
    TheaterModeToggled {
        enabled: bool,
    },
    QualityLevelsAvailable {
        levels: Vec<QualityLevel>,
    },
    /// A stored position was restored for this video
    ResumeApplied {
        video_id: String,
        position: f64,
    },
    VideoEnded {
        video_id: String,
    },
    NavigationRequested {
        direction: NavigationDirection,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDirection {
    Previous,
    Next,
}

type SubscriptionId = u64;

struct Subscription {
    tx: tokio_mpsc::UnboundedSender<PlayerEvent>,
}

/// Handle for subscribing to player events
#[derive(Clone)]
pub struct PlayerEventHandle {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl PlayerEventHandle {
    /// Create a new event handle and spawn the task that fans events out to subscribers
    pub fn new(
        mut event_rx: tokio_mpsc::UnboundedReceiver<PlayerEvent>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let subscriptions_clone = subscriptions.clone();

        runtime_handle.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let mut subs = subscriptions_clone
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());

                // Receivers that were dropped are removed on the next send
                subs.retain(|_, subscription| subscription.tx.send(event.clone()).is_ok());
            }
            info!("Player event channel closed, exiting");
        });

        Self {
            subscriptions,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to every player event.
    /// The subscription is removed automatically once the receiver is dropped.
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<PlayerEvent> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Subscription { tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
