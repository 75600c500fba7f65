use super::{Backend, BackendEvent, EventEmitter, ManifestFormat, SourceKind, SurfaceBinding};
use crate::error::MediaError;
use crate::playback::surface::{MediaSurface, SurfaceSnapshot};
use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One variant stream advertised by an HLS master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLevel {
    pub index: usize,
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Result of manifest negotiation
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestInfo {
    /// Locator the surface should play (usually the manifest itself)
    pub playback_locator: String,
    pub levels: Vec<QualityLevel>,
}

/// Adaptive-streaming engine. Segment selection and fetching happen behind this
/// trait; the backend only needs to know whether the manifest is playable.
#[async_trait::async_trait]
pub trait StreamingEngine: Send + Sync {
    async fn open(&self, locator: &str, format: ManifestFormat)
        -> Result<ManifestInfo, MediaError>;
}

/// Fetches and validates manifests over HTTP
pub struct HttpManifestEngine {
    client: reqwest::Client,
}

impl HttpManifestEngine {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait::async_trait]
impl StreamingEngine for HttpManifestEngine {
    async fn open(
        &self,
        locator: &str,
        format: ManifestFormat,
    ) -> Result<ManifestInfo, MediaError> {
        info!("Fetching {:?} manifest: {}", format, locator);

        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                MediaError::fetch_failed(format!("Manifest request timed out: {}", locator))
            } else {
                MediaError::fetch_failed(format!("Manifest request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(MediaError::NotFound(locator.to_string()));
        }
        if !status.is_success() {
            return Err(MediaError::fetch_failed(format!(
                "Manifest server returned {} for {}",
                status, locator
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MediaError::fetch_failed(format!("Failed to read manifest: {}", e)))?;

        let levels = inspect_manifest(&body, format)?;
        debug!("Manifest has {} quality levels", levels.len());

        Ok(ManifestInfo {
            playback_locator: locator.to_string(),
            levels,
        })
    }
}

/// Check the manifest body matches its format and collect quality levels
pub(crate) fn inspect_manifest(
    body: &str,
    format: ManifestFormat,
) -> Result<Vec<QualityLevel>, MediaError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    match format {
        ManifestFormat::Hls => {
            if !trimmed.starts_with("#EXTM3U") {
                return Err(MediaError::UnsupportedFormat(
                    "HLS manifest is missing #EXTM3U header".to_string(),
                ));
            }
            Ok(parse_hls_levels(trimmed))
        }
        ManifestFormat::Dash => {
            if !trimmed.contains("<MPD") {
                return Err(MediaError::UnsupportedFormat(
                    "DASH manifest has no MPD element".to_string(),
                ));
            }
            Ok(Vec::new())
        }
    }
}

/// Scan `#EXT-X-STREAM-INF` lines of an HLS master playlist.
/// Media playlists have none and yield an empty list.
pub fn parse_hls_levels(playlist: &str) -> Vec<QualityLevel> {
    static BANDWIDTH: OnceLock<Regex> = OnceLock::new();
    static RESOLUTION: OnceLock<Regex> = OnceLock::new();
    let bandwidth_re =
        BANDWIDTH.get_or_init(|| Regex::new(r"(?:^|[:,])BANDWIDTH=(\d+)").expect("valid regex"));
    let resolution_re =
        RESOLUTION.get_or_init(|| Regex::new(r"RESOLUTION=(\d+)x(\d+)").expect("valid regex"));

    playlist
        .lines()
        .filter_map(|line| line.trim().strip_prefix("#EXT-X-STREAM-INF:"))
        .enumerate()
        .filter_map(|(index, attributes)| {
            let bandwidth = bandwidth_re
                .captures(attributes)
                .and_then(|c| c[1].parse().ok())?;
            let resolution = resolution_re.captures(attributes);
            Some(QualityLevel {
                index,
                bandwidth,
                width: resolution.as_ref().and_then(|c| c[1].parse().ok()),
                height: resolution.as_ref().and_then(|c| c[2].parse().ok()),
            })
        })
        .collect()
}

/// Negotiates a manifest through the streaming engine, then plays it on the surface
pub struct ManifestBackend {
    binding: SurfaceBinding,
    engine: Arc<dyn StreamingEngine>,
    format: ManifestFormat,
    levels: Mutex<Vec<QualityLevel>>,
}

impl ManifestBackend {
    pub fn new(
        surface: Arc<dyn MediaSurface>,
        engine: Arc<dyn StreamingEngine>,
        format: ManifestFormat,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            binding: SurfaceBinding::new(surface, emitter),
            engine,
            format,
            levels: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Backend for ManifestBackend {
    fn kind(&self) -> SourceKind {
        SourceKind::Manifest(self.format)
    }

    async fn load(&self, locator: &str) -> Result<(), MediaError> {
        self.binding.emitter.emit(BackendEvent::LoadingStart);

        let manifest = self.engine.open(locator, self.format).await?;

        // The controller may have moved on while the manifest was in flight
        if self.binding.is_destroyed() {
            debug!("Manifest for {} resolved after teardown, discarding", locator);
            return Err(MediaError::Aborted);
        }

        info!(
            "Manifest ready ({} quality levels), attaching {}",
            manifest.levels.len(),
            manifest.playback_locator
        );
        *self
            .levels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = manifest.levels;
        self.binding.attach(&manifest.playback_locator)
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
        info!("Destroying manifest backend");
        self.binding.teardown();
    }

    fn quality_levels(&self) -> Vec<QualityLevel> {
        self.levels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
