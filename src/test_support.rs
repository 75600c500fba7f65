// Test support utilities for both unit and integration tests

use crate::error::{MediaError, PresentationError, ProgressError};
use crate::playback::backend::{ManifestFormat, ManifestInfo, StreamingEngine};
use crate::playback::progress::{MemoryProgressStorage, ProgressRecord, ProgressStorage};
use crate::playback::surface::{
    ListenerId, ListenerRegistry, MediaSurface, Presenter, ReadyState, SurfaceEvent,
    SurfaceListener, SurfaceSnapshot, TimeRange,
};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::Notify;

/// One call made on a `SimulatedSurface`
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Attach(String),
    Release,
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
    SetMuted(bool),
    SetRate(f64),
}

struct SurfaceInner {
    source: Option<String>,
    snapshot: SurfaceSnapshot,
    ops: Vec<SurfaceOp>,
}

/// In-memory media element.
///
/// Journals every call, fires the events a video element would, and by default becomes
/// playable (`canplay`) as soon as a source is attached, fully buffered.
pub struct SimulatedSurface {
    inner: Mutex<SurfaceInner>,
    listeners: ListenerRegistry,
    default_duration: f64,
    durations: Mutex<HashMap<String, f64>>,
    failures: Mutex<HashMap<String, MediaError>>,
    auto_ready: AtomicBool,
}

impl SimulatedSurface {
    pub fn new(default_duration: f64) -> Self {
        SimulatedSurface {
            inner: Mutex::new(SurfaceInner {
                source: None,
                snapshot: SurfaceSnapshot {
                    paused: true,
                    ..Default::default()
                },
                ops: Vec::new(),
            }),
            listeners: ListenerRegistry::new(),
            default_duration,
            durations: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            auto_ready: AtomicBool::new(true),
        }
    }

    /// Duration reported for one locator
    pub fn set_duration_for(&self, locator: &str, duration: f64) {
        self.durations
            .lock()
            .unwrap()
            .insert(locator.to_string(), duration);
    }

    /// Attaching `locator` fires an error event instead of becoming ready
    pub fn fail_source(&self, locator: &str, error: MediaError) {
        self.failures
            .lock()
            .unwrap()
            .insert(locator.to_string(), error);
    }

    pub fn clear_failure(&self, locator: &str) {
        self.failures.lock().unwrap().remove(locator);
    }

    /// When false, the test fires `CanPlay` itself
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.auto_ready.store(auto_ready, Ordering::SeqCst);
    }

    pub fn fire(&self, event: SurfaceEvent) {
        self.listeners.emit(event);
    }

    /// Move the playhead as normal playback would and fire `timeupdate`
    pub fn play_to(&self, time: f64) {
        let duration = {
            let mut inner = self.inner.lock().unwrap();
            inner.snapshot.current_time = time;
            inner.snapshot.duration
        };
        self.fire(SurfaceEvent::TimeUpdate {
            current_time: time,
            duration,
        });
    }

    /// Play through to the end: the element pauses and fires `ended`
    pub fn finish(&self) {
        let duration = {
            let mut inner = self.inner.lock().unwrap();
            inner.snapshot.current_time = inner.snapshot.duration;
            inner.snapshot.paused = true;
            inner.snapshot.ended = true;
            inner.snapshot.duration
        };
        self.fire(SurfaceEvent::TimeUpdate {
            current_time: duration,
            duration,
        });
        self.fire(SurfaceEvent::Paused);
        self.fire(SurfaceEvent::Ended);
    }

    /// The element paused on its own (page hidden, OS interruption)
    pub fn pause_externally(&self) {
        self.inner.lock().unwrap().snapshot.paused = true;
        self.fire(SurfaceEvent::Paused);
    }

    /// Replace the buffered ranges and fire `progress`
    pub fn set_buffered(&self, ranges: &[(f64, f64)]) {
        self.inner.lock().unwrap().snapshot.buffered = ranges
            .iter()
            .map(|&(start, end)| TimeRange { start, end })
            .collect();
        self.fire(SurfaceEvent::Progress);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    pub fn count(&self, op: &SurfaceOp) -> usize {
        self.inner
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|recorded| *recorded == op)
            .count()
    }

    pub fn clear_ops(&self) {
        self.inner.lock().unwrap().ops.clear();
    }

    pub fn source(&self) -> Option<String> {
        self.inner.lock().unwrap().source.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn record(&self, op: SurfaceOp) {
        self.inner.lock().unwrap().ops.push(op);
    }
}

impl MediaSurface for SimulatedSurface {
    fn attach_source(&self, locator: &str) -> Result<(), MediaError> {
        self.record(SurfaceOp::Attach(locator.to_string()));

        if let Some(error) = self.failures.lock().unwrap().get(locator).cloned() {
            self.fire(SurfaceEvent::Error(error));
            return Ok(());
        }

        let duration = self
            .durations
            .lock()
            .unwrap()
            .get(locator)
            .copied()
            .unwrap_or(self.default_duration);
        let auto_ready = self.auto_ready.load(Ordering::SeqCst);

        {
            let mut inner = self.inner.lock().unwrap();
            inner.source = Some(locator.to_string());
            inner.snapshot = SurfaceSnapshot {
                paused: true,
                ended: false,
                current_time: 0.0,
                duration,
                buffered: vec![TimeRange {
                    start: 0.0,
                    end: duration,
                }],
                ready_state: if auto_ready {
                    ReadyState::HaveEnoughData
                } else {
                    ReadyState::HaveMetadata
                },
            };
        }

        self.fire(SurfaceEvent::LoadedMetadata { duration });
        if auto_ready {
            self.fire(SurfaceEvent::ReadyStateChanged(ReadyState::HaveEnoughData));
            self.fire(SurfaceEvent::CanPlay);
        }
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(SurfaceOp::Release);
        inner.source = None;
        inner.snapshot = SurfaceSnapshot {
            paused: true,
            ..Default::default()
        };
    }

    fn play(&self) -> Result<(), MediaError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.ops.push(SurfaceOp::Play);
            if inner.source.is_none() {
                return Err(MediaError::Aborted);
            }
            inner.snapshot.paused = false;
            inner.snapshot.ended = false;
        }
        self.fire(SurfaceEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let was_playing = {
            let mut inner = self.inner.lock().unwrap();
            inner.ops.push(SurfaceOp::Pause);
            !std::mem::replace(&mut inner.snapshot.paused, true)
        };
        if was_playing {
            self.fire(SurfaceEvent::Paused);
        }
    }

    fn seek(&self, time: f64) {
        let (current_time, duration) = {
            let mut inner = self.inner.lock().unwrap();
            inner.ops.push(SurfaceOp::Seek(time));
            let duration = inner.snapshot.duration;
            let clamped = if duration > 0.0 {
                time.clamp(0.0, duration)
            } else {
                time.max(0.0)
            };
            inner.snapshot.current_time = clamped;
            inner.snapshot.ended = false;
            (clamped, duration)
        };
        self.fire(SurfaceEvent::Seeked);
        self.fire(SurfaceEvent::TimeUpdate {
            current_time,
            duration,
        });
    }

    fn set_volume(&self, volume: f64) {
        self.record(SurfaceOp::SetVolume(volume));
    }

    fn set_muted(&self, muted: bool) {
        self.record(SurfaceOp::SetMuted(muted));
    }

    fn set_rate(&self, rate: f64) {
        self.record(SurfaceOp::SetRate(rate));
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    fn subscribe(&self, listener: SurfaceListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

/// Presenter that grants every request unless told to refuse
#[derive(Default)]
pub struct SimulatedPresenter {
    refuse: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
}

impl SimulatedPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: &'static str) -> Result<(), PresentationError> {
        self.calls.lock().unwrap().push(call);
        if self.refuse.load(Ordering::SeqCst) {
            Err(PresentationError::Refused(call.to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Presenter for SimulatedPresenter {
    async fn enter_fullscreen(&self) -> Result<(), PresentationError> {
        self.answer("enter_fullscreen")
    }

    async fn exit_fullscreen(&self) -> Result<(), PresentationError> {
        self.answer("exit_fullscreen")
    }

    async fn enter_picture_in_picture(&self) -> Result<(), PresentationError> {
        self.answer("enter_picture_in_picture")
    }

    async fn exit_picture_in_picture(&self) -> Result<(), PresentationError> {
        self.answer("exit_picture_in_picture")
    }
}

/// Streaming engine with canned answers per locator.
/// Unknown locators open successfully with no quality levels.
#[derive(Default)]
pub struct ScriptedEngine {
    responses: Mutex<HashMap<String, Result<ManifestInfo, MediaError>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, locator: &str, response: Result<ManifestInfo, MediaError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(locator.to_string(), response);
    }

    /// Hold every subsequent `open` until the returned gate is notified (once per open)
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release_hold(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StreamingEngine for ScriptedEngine {
    async fn open(
        &self,
        locator: &str,
        _format: ManifestFormat,
    ) -> Result<ManifestInfo, MediaError> {
        self.opened.lock().unwrap().push(locator.to_string());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .unwrap_or_else(|| {
                Ok(ManifestInfo {
                    playback_locator: locator.to_string(),
                    levels: Vec::new(),
                })
            })
    }
}

/// Memory storage that also keeps a log of every write
#[derive(Default)]
pub struct RecordingStorage {
    inner: MemoryProgressStorage,
    puts: Mutex<Vec<(String, ProgressRecord)>>,
    removes: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> Vec<(String, ProgressRecord)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn puts_for(&self, video_id: &str) -> Vec<ProgressRecord> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == video_id)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn removes(&self) -> Vec<String> {
        self.removes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProgressStorage for RecordingStorage {
    async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        self.inner.load(video_id).await
    }

    async fn put(&self, video_id: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        self.puts
            .lock()
            .unwrap()
            .push((video_id.to_string(), record.clone()));
        self.inner.put(video_id, record).await
    }

    async fn remove(&self, video_id: &str) -> Result<(), ProgressError> {
        self.removes.lock().unwrap().push(video_id.to_string());
        self.inner.remove(video_id).await
    }

    async fn list(&self) -> Result<Vec<(String, ProgressRecord)>, ProgressError> {
        self.inner.list().await
    }
}
