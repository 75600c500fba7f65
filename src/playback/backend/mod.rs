//! Delivery backends: one capability interface over progressive files and
//! adaptive-streaming manifests.

mod manifest;
mod progressive;

pub use manifest::{
    parse_hls_levels, HttpManifestEngine, ManifestBackend, ManifestInfo, QualityLevel,
    StreamingEngine,
};
pub use progressive::ProgressiveBackend;

use crate::error::MediaError;
use crate::playback::surface::{
    ListenerId, MediaSurface, ReadyState, SurfaceEvent, SurfaceListener, SurfaceSnapshot,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Hls,
    Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single directly fetchable media file
    Progressive,
    /// A segmented adaptive-streaming manifest
    Manifest(ManifestFormat),
}

/// Classify a locator by its path extension (query string and fragment ignored)
pub fn classify(locator: &str) -> SourceKind {
    let path = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .to_lowercase();

    if path.ends_with(".m3u8") || locator.contains("application/vnd.apple.mpegurl") {
        SourceKind::Manifest(ManifestFormat::Hls)
    } else if path.ends_with(".mpd") {
        SourceKind::Manifest(ManifestFormat::Dash)
    } else {
        SourceKind::Progressive
    }
}

/// Events a backend reports to its controller
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    LoadingStart,
    DurationChanged(f64),
    /// Enough data to start playback (`canplay`)
    Ready,
    TimeUpdate { current_time: f64, duration: f64 },
    BufferingStart,
    BufferProgress,
    Playing,
    Paused,
    SeekComplete,
    ReadyStateChanged(ReadyState),
    Ended,
    Error(MediaError),
}

impl BackendEvent {
    fn from_surface(event: SurfaceEvent) -> Self {
        match event {
            SurfaceEvent::LoadStart => BackendEvent::LoadingStart,
            SurfaceEvent::LoadedMetadata { duration } => BackendEvent::DurationChanged(duration),
            SurfaceEvent::CanPlay => BackendEvent::Ready,
            SurfaceEvent::Playing => BackendEvent::Playing,
            SurfaceEvent::Paused => BackendEvent::Paused,
            SurfaceEvent::Waiting => BackendEvent::BufferingStart,
            SurfaceEvent::Progress => BackendEvent::BufferProgress,
            SurfaceEvent::TimeUpdate {
                current_time,
                duration,
            } => BackendEvent::TimeUpdate {
                current_time,
                duration,
            },
            SurfaceEvent::Seeked => BackendEvent::SeekComplete,
            SurfaceEvent::Ended => BackendEvent::Ended,
            SurfaceEvent::ReadyStateChanged(level) => BackendEvent::ReadyStateChanged(level),
            SurfaceEvent::Error(error) => BackendEvent::Error(error),
        }
    }
}

/// Delivers backend events to the owning controller until detached.
/// Once detached nothing more is delivered, even from clones held by in-flight work.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn Fn(BackendEvent) + Send + Sync>,
    detached: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(sink: impl Fn(BackendEvent) + Send + Sync + 'static) -> Self {
        EventEmitter {
            sink: Arc::new(sink),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn emit(&self, event: BackendEvent) {
        if self.detached.load(Ordering::SeqCst) {
            debug!("Dropping event from detached backend: {:?}", event);
            return;
        }
        (self.sink)(event);
    }

    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Capability set shared by every delivery backend
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> SourceKind;
    /// Prepare the locator for playback. Readiness is reported separately through
    /// `BackendEvent::Ready`; an `Err` here means the source can never become ready.
    async fn load(&self, locator: &str) -> Result<(), MediaError>;
    fn play(&self) -> Result<(), MediaError>;
    fn pause(&self);
    fn seek(&self, time: f64);
    fn set_volume(&self, volume: f64);
    fn set_muted(&self, muted: bool);
    fn set_rate(&self, rate: f64);
    fn snapshot(&self) -> SurfaceSnapshot;
    /// Unsubscribe every listener and release the media resource
    fn destroy(&self);
    fn quality_levels(&self) -> Vec<QualityLevel> {
        Vec::new()
    }
}

/// Builds the backend matching a source kind
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: SourceKind, emitter: EventEmitter) -> Arc<dyn Backend>;
}

/// Progressive backends drive the surface directly; manifest backends go through the
/// streaming engine first.
pub struct DefaultBackendFactory {
    surface: Arc<dyn MediaSurface>,
    engine: Arc<dyn StreamingEngine>,
}

impl DefaultBackendFactory {
    pub fn new(surface: Arc<dyn MediaSurface>, engine: Arc<dyn StreamingEngine>) -> Self {
        Self { surface, engine }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: SourceKind, emitter: EventEmitter) -> Arc<dyn Backend> {
        match kind {
            SourceKind::Progressive => {
                Arc::new(ProgressiveBackend::new(self.surface.clone(), emitter))
            }
            SourceKind::Manifest(format) => Arc::new(ManifestBackend::new(
                self.surface.clone(),
                self.engine.clone(),
                format,
                emitter,
            )),
        }
    }
}

/// Listener lifecycle shared by both backends: one surface subscription that
/// forwards translated events, removed exactly once on teardown.
struct SurfaceBinding {
    surface: Arc<dyn MediaSurface>,
    emitter: EventEmitter,
    listener: Mutex<Option<ListenerId>>,
    destroyed: AtomicBool,
}

impl SurfaceBinding {
    fn new(surface: Arc<dyn MediaSurface>, emitter: EventEmitter) -> Self {
        SurfaceBinding {
            surface,
            emitter,
            listener: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Subscribe to the surface (once) and attach the source
    fn attach(&self, locator: &str) -> Result<(), MediaError> {
        if self.is_destroyed() {
            return Err(MediaError::Aborted);
        }

        {
            let mut listener = self.lock_listener();
            if listener.is_none() {
                let emitter = self.emitter.clone();
                let forward: SurfaceListener =
                    Arc::new(move |event| emitter.emit(BackendEvent::from_surface(event)));
                *listener = Some(self.surface.subscribe(forward));
            }
        }

        self.surface.attach_source(locator)
    }

    fn teardown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Detach first so nothing queued behind the unsubscribe can reach the controller
        self.emitter.detach();
        if let Some(id) = self.lock_listener().take() {
            self.surface.unsubscribe(id);
        }
        self.surface.release();
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<ListenerId>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
