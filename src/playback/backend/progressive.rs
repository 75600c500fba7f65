use super::{Backend, BackendEvent, EventEmitter, SourceKind, SurfaceBinding};
use crate::error::MediaError;
use crate::playback::surface::{MediaSurface, SurfaceSnapshot};
use std::sync::Arc;
use tracing::info;

/// Plays a single media file natively on the surface
pub struct ProgressiveBackend {
    binding: SurfaceBinding,
}

impl ProgressiveBackend {
    pub fn new(surface: Arc<dyn MediaSurface>, emitter: EventEmitter) -> Self {
        Self {
            binding: SurfaceBinding::new(surface, emitter),
        }
    }
}

#[async_trait::async_trait]
impl Backend for ProgressiveBackend {
    fn kind(&self) -> SourceKind {
        SourceKind::Progressive
    }

    async fn load(&self, locator: &str) -> Result<(), MediaError> {
        info!("Progressive backend loading {}", locator);
        self.binding.emitter.emit(BackendEvent::LoadingStart);
        self.binding.attach(locator)
    }

    fn play(&self) -> Result<(), MediaError> {
        if self.binding.is_destroyed() {
            return Err(MediaError::Aborted);
        }
        self.binding.surface.play()
    }

    fn pause(&self) {
        if !self.binding.is_destroyed() {
            self.binding.surface.pause();
        }
    }

    fn seek(&self, time: f64) {
        if !self.binding.is_destroyed() {
            self.binding.surface.seek(time);
        }
    }

    fn set_volume(&self, volume: f64) {
        if !self.binding.is_destroyed() {
            self.binding.surface.set_volume(volume);
        }
    }

    fn set_muted(&self, muted: bool) {
        if !self.binding.is_destroyed() {
            self.binding.surface.set_muted(muted);
        }
    }

    fn set_rate(&self, rate: f64) {
        if !self.binding.is_destroyed() {
            self.binding.surface.set_rate(rate);
        }
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        self.binding.surface.snapshot()
    }

    fn destroy(&self) {
        info!("Destroying progressive backend");
        self.binding.teardown();
    }
}
