//! The host's media element and presentation layer, as seen by the backends.
//!
//! A `MediaSurface` is the single live media resource (a video element, a native
//! player view). Backends attach sources to it, drive it, and subscribe to its events;
//! a backend that is destroyed must have removed every listener it registered.

use crate::error::{MediaError, PresentationError};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

pub type ListenerId = u64;
pub type SurfaceListener = Arc<dyn Fn(SurfaceEvent) + Send + Sync>;

/// Readiness of the media resource, from nothing to enough data to play through.
/// Diagnostic only: nothing in the controller branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Map the numeric HTMLMediaElement readyState (0..=4)
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }
}

/// Native events fired by the surface
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    LoadStart,
    LoadedMetadata { duration: f64 },
    CanPlay,
    Playing,
    Paused,
    /// Playback stopped because the next frame is not available
    Waiting,
    /// More media data arrived (buffered ranges changed)
    Progress,
    TimeUpdate { current_time: f64, duration: f64 },
    Seeked,
    Ended,
    ReadyStateChanged(ReadyState),
    Error(MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Point-in-time truth read back from the surface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceSnapshot {
    pub paused: bool,
    pub ended: bool,
    pub current_time: f64,
    pub duration: f64,
    pub buffered: Vec<TimeRange>,
    pub ready_state: ReadyState,
}

impl SurfaceSnapshot {
    /// Share of the duration downloaded, from the end of the last buffered range.
    /// Overestimates for sparse buffering, which is fine for a progress bar.
    pub fn buffered_percentage(&self) -> f64 {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return 0.0;
        }
        match self.buffered.last() {
            Some(range) => (range.end / self.duration * 100.0).clamp(0.0, 100.0),
            None => 0.0,
        }
    }

    /// Seconds buffered ahead of the playhead (0 when the playhead is outside every range)
    pub fn lookahead(&self) -> f64 {
        self.buffered
            .iter()
            .find(|r| r.start <= self.current_time && self.current_time <= r.end)
            .map(|r| r.end - self.current_time)
            .unwrap_or(0.0)
    }

    /// True once everything up to the end of the media is buffered
    pub fn fully_buffered(&self) -> bool {
        self.duration > 0.0
            && self
                .buffered
                .last()
                .is_some_and(|r| r.end >= self.duration - 0.05)
    }
}

/// The host's media element
pub trait MediaSurface: Send + Sync {
    fn attach_source(&self, locator: &str) -> Result<(), MediaError>;
    /// Drop the current source and any decoder/network resources behind it
    fn release(&self);
    fn play(&self) -> Result<(), MediaError>;
    fn pause(&self);
    fn seek(&self, time: f64);
    fn set_volume(&self, volume: f64);
    fn set_muted(&self, muted: bool);
    fn set_rate(&self, rate: f64);
    fn snapshot(&self) -> SurfaceSnapshot;
    fn subscribe(&self, listener: SurfaceListener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

/// Host-side fullscreen and picture-in-picture requests
#[async_trait::async_trait]
pub trait Presenter: Send + Sync {
    async fn enter_fullscreen(&self) -> Result<(), PresentationError>;
    async fn exit_fullscreen(&self) -> Result<(), PresentationError>;
    async fn enter_picture_in_picture(&self) -> Result<(), PresentationError>;
    async fn exit_picture_in_picture(&self) -> Result<(), PresentationError>;
}

/// Listener bookkeeping for `MediaSurface` implementations
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ListenerId, SurfaceListener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: SurfaceListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock().insert(id, listener);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every registered listener.
    /// Listeners are collected first so a listener may unsubscribe while being called.
    pub fn emit(&self, event: SurfaceEvent) {
        let listeners: Vec<SurfaceListener> = self.lock().values().cloned().collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ListenerId, SurfaceListener>> {
        // A panicking listener must not wedge the surface
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn snapshot(current_time: f64, duration: f64, buffered: &[(f64, f64)]) -> SurfaceSnapshot {
        SurfaceSnapshot {
            current_time,
            duration,
            buffered: buffered
                .iter()
                .map(|&(start, end)| TimeRange { start, end })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_buffered_percentage_uses_last_range() {
        let snap = snapshot(0.0, 200.0, &[(0.0, 20.0), (50.0, 100.0)]);
        assert_eq!(snap.buffered_percentage(), 50.0);
        assert_eq!(snapshot(0.0, 0.0, &[(0.0, 5.0)]).buffered_percentage(), 0.0);
        assert_eq!(snapshot(0.0, 100.0, &[]).buffered_percentage(), 0.0);
    }

    #[test]
    fn test_lookahead_from_range_containing_playhead() {
        let snap = snapshot(10.0, 100.0, &[(0.0, 12.5), (40.0, 60.0)]);
        assert_eq!(snap.lookahead(), 2.5);
        let outside = snapshot(30.0, 100.0, &[(0.0, 12.5), (40.0, 60.0)]);
        assert_eq!(outside.lookahead(), 0.0);
    }

    #[test]
    fn test_registry_stops_delivering_after_remove() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let id = registry.add(Arc::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(SurfaceEvent::CanPlay);
        assert!(registry.remove(id));
        registry.emit(SurfaceEvent::CanPlay);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
