use crate::config::PlayerConfig;
use crate::descriptor::{DisplayFlags, VideoDescriptor};
use crate::error::{MediaError, NetworkErrorKind, PresentationError};
use crate::playback::backend::{classify, Backend, BackendEvent, BackendFactory, EventEmitter};
use crate::playback::controls::{command_for_key, Affordances, PlayerCommand};
use crate::playback::events::{NavigationDirection, PlayerEvent};
use crate::playback::health::{HealthAction, HealthMonitor};
use crate::playback::navigation::NavigationCoordinator;
use crate::playback::progress::{ProgressRecord, ProgressStorage, ProgressStore};
use crate::playback::state::{Intent, PlaybackState, StateMachine, Transition};
use crate::playback::surface::{Presenter, ReadyState};
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const MIN_RATE: f64 = 0.25;
const MAX_RATE: f64 = 4.0;

/// Host presentation requests that run asynchronously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PresentationRequest {
    EnterFullscreen,
    ExitFullscreen,
    EnterPictureInPicture,
    ExitPictureInPicture,
}

/// Everything that reaches the controller from outside a command: backend events and
/// completions of async work. Each carries the session (or generation) it was started
/// in and is dropped if that is no longer current.
pub(crate) enum Envelope {
    Backend {
        session: u64,
        event: BackendEvent,
    },
    Loaded {
        session: u64,
        result: Result<(), MediaError>,
    },
    ResumeLoaded {
        session: u64,
        record: Option<ProgressRecord>,
    },
    Presentation {
        generation: u64,
        request: PresentationRequest,
        result: Result<(), PresentationError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResumeState {
    /// Stored record still being fetched
    Pending,
    /// Position to restore on ready, if any
    Resolved(Option<f64>),
    /// Restored (or skipped) for this descriptor
    Consumed,
}

/// Host-facing view of the player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub video_id: Option<String>,
    pub state: PlaybackState,
    pub current_time: f64,
    pub duration: f64,
    pub buffered_percentage: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub fullscreen: bool,
    pub picture_in_picture: bool,
    pub theater_mode: bool,
    pub ready_state: ReadyState,
    pub online: bool,
    pub affordances: Affordances,
}

/// Owns the playback state machine, the active backend and everything derived from them.
///
/// Commands are applied synchronously through `execute`. Backend loads, progress lookups
/// and presentation requests run as spawned tasks that report back through the envelope
/// channel; `dispatch` applies them in arrival order.
pub struct PlayerController {
    config: PlayerConfig,
    factory: Arc<dyn BackendFactory>,
    presenter: Arc<dyn Presenter>,
    progress: ProgressStore,
    events: tokio_mpsc::UnboundedSender<PlayerEvent>,
    envelope_tx: tokio_mpsc::UnboundedSender<Envelope>,
    envelope_rx: tokio_mpsc::UnboundedReceiver<Envelope>,
    /// Spawned tasks whose envelope has not been dispatched yet
    in_flight: usize,
    /// Bumped whenever the backend is replaced or torn down
    session: u64,
    /// Bumped on destroy; guards presentation completions
    generation: u64,
    descriptor: Option<VideoDescriptor>,
    backend: Option<Arc<dyn Backend>>,
    machine: StateMachine,
    health: HealthMonitor,
    navigation: NavigationCoordinator,
    flags: DisplayFlags,
    autoplay: bool,
    play_on_ready: bool,
    resume: ResumeState,
    /// A surface seek issued outside Seeking (resume, pre-play or replay) not yet reported back
    seek_pending: bool,
    current_time: f64,
    duration: f64,
    buffered_percentage: f64,
    volume: f64,
    muted: bool,
    rate: f64,
    fullscreen: bool,
    picture_in_picture: bool,
    theater_mode: bool,
}

impl PlayerController {
    /// Must be called from within a Tokio runtime (the progress writer is spawned here)
    pub fn new(
        config: PlayerConfig,
        factory: Arc<dyn BackendFactory>,
        presenter: Arc<dyn Presenter>,
        storage: Arc<dyn ProgressStorage>,
        events: tokio_mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        let (envelope_tx, envelope_rx) = tokio_mpsc::unbounded_channel();
        let progress = ProgressStore::new(storage, config.progress_save_interval);
        let health = HealthMonitor::new(&config);

        PlayerController {
            config,
            factory,
            presenter,
            progress,
            events,
            envelope_tx,
            envelope_rx,
            in_flight: 0,
            session: 0,
            generation: 0,
            descriptor: None,
            backend: None,
            machine: StateMachine::new(),
            health,
            navigation: NavigationCoordinator::new(),
            flags: DisplayFlags::default(),
            autoplay: false,
            play_on_ready: false,
            resume: ResumeState::Consumed,
            seek_pending: false,
            current_time: 0.0,
            duration: 0.0,
            buffered_percentage: 0.0,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            fullscreen: false,
            picture_in_picture: false,
            theater_mode: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        self.machine.state()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            video_id: self.descriptor.as_ref().map(|d| d.id.clone()),
            state: self.machine.state().clone(),
            current_time: self.current_time,
            duration: self.duration,
            buffered_percentage: self.buffered_percentage,
            volume: self.volume,
            muted: self.muted,
            playback_rate: self.rate,
            fullscreen: self.fullscreen,
            picture_in_picture: self.picture_in_picture,
            theater_mode: self.theater_mode,
            ready_state: self.health.ready_state(),
            online: self.health.is_online(),
            affordances: Affordances::compute(
                &self.flags,
                self.descriptor.as_ref(),
                self.machine.state(),
                &self.navigation,
            ),
        }
    }

    /// Apply one command
    pub fn execute(&mut self, command: PlayerCommand) {
        if self.is_inert(&command) {
            debug!(
                "Ignoring {:?} in state {}",
                command,
                self.machine.state().name()
            );
            return;
        }

        match command {
            PlayerCommand::SetDescriptor(descriptor) => self.mount(descriptor),
            PlayerCommand::SetNavigation(context) => self.navigation.set_context(context),
            PlayerCommand::SetDisplayFlags(flags) => self.flags = flags,
            PlayerCommand::SetAutoplay(autoplay) => self.autoplay = autoplay,
            PlayerCommand::TogglePlay => self.toggle_play(),
            PlayerCommand::Play => self.play(),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Seek(time) => self.seek(time),
            PlayerCommand::Scrub(time) => {
                if self.is_skip_locked() {
                    debug!("Scrub refused: lesson not completed");
                } else {
                    self.seek(time);
                }
            }
            PlayerCommand::Skip(delta) => self.skip(delta),
            PlayerCommand::SetVolume(volume) => self.set_volume(volume),
            PlayerCommand::AdjustVolume(delta) => self.set_volume(self.volume + delta),
            PlayerCommand::ToggleMute => self.set_muted(!self.muted),
            PlayerCommand::SetRate(rate) => self.set_rate(rate),
            PlayerCommand::ToggleFullscreen => {
                let request = if self.fullscreen {
                    PresentationRequest::ExitFullscreen
                } else {
                    PresentationRequest::EnterFullscreen
                };
                self.request_presentation(request);
            }
            PlayerCommand::FullscreenExited => self.set_fullscreen(false),
            PlayerCommand::TogglePictureInPicture => {
                let request = if self.picture_in_picture {
                    PresentationRequest::ExitPictureInPicture
                } else {
                    PresentationRequest::EnterPictureInPicture
                };
                self.request_presentation(request);
            }
            PlayerCommand::PictureInPictureExited => self.left_picture_in_picture(),
            PlayerCommand::ToggleTheaterMode => {
                self.theater_mode = !self.theater_mode;
                self.emit(PlayerEvent::TheaterModeToggled {
                    enabled: self.theater_mode,
                });
            }
            PlayerCommand::Previous => self.navigate(NavigationDirection::Previous),
            PlayerCommand::Next => self.navigate(NavigationDirection::Next),
            PlayerCommand::Retry => self.retry(),
            PlayerCommand::Replay => self.replay(),
            PlayerCommand::Connectivity(online) => self.set_online(online),
            PlayerCommand::Key { key, focus_inside } => {
                if let Some(command) = command_for_key(key, focus_inside, &self.config) {
                    self.execute(command);
                }
            }
            PlayerCommand::Destroy => self.destroy(),
        }
    }

    /// Wait for the next envelope. Never resolves to `None` while the controller is alive.
    pub(crate) async fn next_envelope(&mut self) -> Option<Envelope> {
        self.envelope_rx.recv().await
    }

    pub(crate) fn dispatch(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Backend { session, event } => {
                if session != self.session {
                    debug!("Dropping event from replaced backend: {:?}", event);
                    return;
                }
                self.on_backend_event(event);
            }
            Envelope::Loaded { session, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if session != self.session {
                    debug!("Dropping stale load completion");
                    return;
                }
                self.on_loaded(result);
            }
            Envelope::ResumeLoaded { session, record } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if session != self.session {
                    debug!("Dropping stale progress record");
                    return;
                }
                self.on_resume_loaded(record);
            }
            Envelope::Presentation {
                generation,
                request,
                result,
            } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if generation != self.generation {
                    debug!("Dropping {:?} result from destroyed player", request);
                    return;
                }
                self.on_presentation(request, result);
            }
        }
    }

    /// Process envelopes until no spawned work is outstanding and the queue is empty
    pub async fn run_until_idle(&mut self) {
        loop {
            match self.envelope_rx.try_recv() {
                Ok(envelope) => self.dispatch(envelope),
                Err(_) if self.in_flight > 0 => match self.envelope_rx.recv().await {
                    Some(envelope) => self.dispatch(envelope),
                    None => break,
                },
                Err(_) => break,
            }
        }
    }

    /// Write a progress save whose throttle window has closed
    pub fn tick(&mut self) {
        self.progress.flush_due();
    }

    pub fn next_flush_at(&self) -> Option<Instant> {
        self.progress.next_flush_at()
    }

    /// Persist the current position now and wait until storage has it
    pub async fn flush_progress(&mut self) {
        self.persist_position();
        self.progress.flush();
        self.progress.settle().await;
    }

    /// Wait until every progress write queued so far has reached storage
    pub async fn settle_progress(&self) {
        self.progress.settle().await;
    }

    /// In Error every control is inert except retry and lifecycle commands
    fn is_inert(&self, command: &PlayerCommand) -> bool {
        let lifecycle = matches!(
            command,
            PlayerCommand::SetDescriptor(_)
                | PlayerCommand::SetNavigation(_)
                | PlayerCommand::SetDisplayFlags(_)
                | PlayerCommand::SetAutoplay(_)
                | PlayerCommand::FullscreenExited
                | PlayerCommand::PictureInPictureExited
                | PlayerCommand::Previous
                | PlayerCommand::Next
                | PlayerCommand::Retry
                | PlayerCommand::Connectivity(_)
                | PlayerCommand::Key { .. }
                | PlayerCommand::Destroy
        );
        !lifecycle && (self.backend.is_none() || self.machine.state().is_error())
    }

    fn mount(&mut self, descriptor: VideoDescriptor) {
        if self.backend.is_some() && self.descriptor.as_ref() == Some(&descriptor) {
            debug!("Descriptor {} unchanged, keeping current session", descriptor.id);
            return;
        }

        self.unmount();

        info!(
            "Mounting video {} ({}, {:?})",
            descriptor.id, descriptor.url, descriptor.video_type
        );
        self.duration = if descriptor.duration.is_finite() && descriptor.duration > 0.0 {
            descriptor.duration
        } else {
            0.0
        };
        self.play_on_ready = self.autoplay;
        self.resume = ResumeState::Pending;
        self.request_resume_record(&descriptor.id);
        self.descriptor = Some(descriptor);
        self.start_backend();
    }

    /// Save where we are, tear the backend down and return to Idle
    fn unmount(&mut self) {
        self.persist_position();
        self.progress.flush();
        self.teardown_backend();
        self.session += 1;

        self.transition(Transition::Reset);
        self.health.reset();
        self.current_time = 0.0;
        self.duration = 0.0;
        self.buffered_percentage = 0.0;
        self.play_on_ready = false;
        self.resume = ResumeState::Consumed;
        self.seek_pending = false;
    }

    fn destroy(&mut self) {
        info!("Destroying player");
        self.unmount();
        self.descriptor = None;
        self.generation += 1;
    }

    fn teardown_backend(&mut self) {
        if let Some(backend) = self.backend.take() {
            info!("Tearing down {:?} backend", backend.kind());
            backend.destroy();
        }
    }

    /// Create the backend for the current descriptor and start loading it
    fn start_backend(&mut self) {
        let Some(url) = self.descriptor.as_ref().map(|d| d.url.clone()) else {
            return;
        };

        let kind = classify(&url);
        let session = self.session;
        let tx = self.envelope_tx.clone();
        let emitter = EventEmitter::new(move |event| {
            let _ = tx.send(Envelope::Backend { session, event });
        });

        let backend = self.factory.create(kind, emitter);
        info!("Created {:?} backend for {}", kind, url);
        self.backend = Some(backend.clone());
        self.transition(Transition::Load);

        let tx = self.envelope_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = backend.load(&url).await;
            let _ = tx.send(Envelope::Loaded { session, result });
        });
    }

    /// Tear down and load the same descriptor again.
    ///
    /// A playhead that has moved is restored on ready. Before that the resume position
    /// still owed to this descriptor carries over, and a record lookup that was still
    /// outstanding is issued again under the new session.
    fn reload(&mut self) {
        self.play_on_ready = self.play_on_ready || self.machine.intent() == Intent::Play;
        self.teardown_backend();
        self.session += 1;
        self.health.reset();
        self.seek_pending = false;

        self.resume = if self.current_time > 0.0 {
            ResumeState::Resolved(Some(self.current_time))
        } else {
            match self.resume {
                ResumeState::Consumed => ResumeState::Resolved(None),
                owed => owed,
            }
        };
        if self.resume == ResumeState::Pending {
            if let Some(video_id) = self.descriptor.as_ref().map(|d| d.id.clone()) {
                self.request_resume_record(&video_id);
            }
        }
        debug!("Reloading with resume {:?}", self.resume);
        self.start_backend();
    }

    fn request_resume_record(&mut self, video_id: &str) {
        let record_rx = self.progress.load(video_id);
        let session = self.session;
        let tx = self.envelope_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let record = record_rx.await.unwrap_or(None);
            let _ = tx.send(Envelope::ResumeLoaded { session, record });
        });
    }

    fn on_loaded(&mut self, result: Result<(), MediaError>) {
        match result {
            Ok(()) => {
                let Some(backend) = self.backend.clone() else {
                    return;
                };
                info!("Backend loaded");
                backend.set_volume(self.volume);
                backend.set_muted(self.muted);
                backend.set_rate(self.rate);

                let levels = backend.quality_levels();
                if !levels.is_empty() {
                    self.emit(PlayerEvent::QualityLevelsAvailable { levels });
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_resume_loaded(&mut self, record: Option<ProgressRecord>) {
        if self.resume != ResumeState::Pending {
            debug!("Resume already settled, ignoring stored record");
            return;
        }

        let near_complete = self.config.near_complete_percent;
        let position = match &record {
            Some(record) => record.resume_position(near_complete),
            None => self.descriptor.as_ref().and_then(|d| {
                d.last_position.filter(|&position| {
                    position > 0.0
                        && !(d.duration > 0.0 && position / d.duration * 100.0 >= near_complete)
                })
            }),
        };

        match (&record, position) {
            (Some(record), None) if record.is_near_complete(near_complete) => {
                info!(
                    "Stored progress is {:.1}% complete, starting from the beginning",
                    record.percentage
                );
            }
            (_, Some(position)) => debug!("Will resume at {:.1}s", position),
            _ => {}
        }

        self.resume = ResumeState::Resolved(position);
        if matches!(self.machine.state(), PlaybackState::Ready) {
            self.finish_ready();
        }
    }

    /// Ready and the resume position is known: restore it once, then honour a queued play
    fn finish_ready(&mut self) {
        match std::mem::replace(&mut self.resume, ResumeState::Consumed) {
            ResumeState::Pending => {
                debug!("Ready before the stored record arrived, waiting for it");
                self.resume = ResumeState::Pending;
                return;
            }
            ResumeState::Resolved(Some(position)) => self.apply_resume(position),
            ResumeState::Resolved(None) | ResumeState::Consumed => {}
        }

        if std::mem::take(&mut self.play_on_ready) {
            self.play();
        }
    }

    fn apply_resume(&mut self, position: f64) {
        let position = self.clamp_time(position);
        if position <= 0.0 {
            return;
        }
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let Some(video_id) = self.descriptor.as_ref().map(|d| d.id.clone()) else {
            return;
        };

        info!("Resuming {} at {:.1}s", video_id, position);
        self.seek_pending = true;
        backend.seek(position);
        self.current_time = position;
        self.emit(PlayerEvent::ResumeApplied { video_id, position });
        self.emit_time();
    }

    fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::LoadingStart => debug!("Backend started loading"),
            BackendEvent::DurationChanged(duration) => {
                if duration.is_finite() && duration > 0.0 {
                    self.duration = duration;
                    self.emit_time();
                }
            }
            BackendEvent::Ready => self.on_ready(),
            BackendEvent::TimeUpdate {
                current_time,
                duration,
            } => self.on_time_update(current_time, duration),
            BackendEvent::BufferingStart => {
                if matches!(
                    self.machine.state(),
                    PlaybackState::Playing | PlaybackState::Buffering
                ) {
                    let actions = self.health.on_waiting();
                    self.apply_health(actions);
                }
            }
            BackendEvent::BufferProgress => self.evaluate_buffer(),
            BackendEvent::Playing => {
                let actions = self.health.on_data_resumed();
                self.apply_health(actions);
                self.reconcile();
            }
            BackendEvent::Paused => self.reconcile(),
            BackendEvent::SeekComplete => self.on_seek_complete(),
            BackendEvent::ReadyStateChanged(ready_state) => {
                if self.health.on_ready_state(ready_state) {
                    self.emit(PlayerEvent::ReadyStateChanged { ready_state });
                }
            }
            BackendEvent::Ended => {
                if self.transition(Transition::ReachEnd) {
                    self.finish_ended();
                }
            }
            BackendEvent::Error(e) => self.fail(e),
        }
    }

    fn on_ready(&mut self) {
        if matches!(self.machine.state(), PlaybackState::Loading) {
            self.transition(Transition::Ready);
            self.finish_ready();
        } else {
            // canplay after a stall
            let actions = self.health.on_data_resumed();
            self.apply_health(actions);
        }
    }

    fn on_time_update(&mut self, current_time: f64, duration: f64) {
        let state = self.machine.state().clone();
        if self.seek_pending || matches!(state, PlaybackState::Seeking) {
            debug!("Ignoring time update while seeking");
            return;
        }
        if duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        }
        if !current_time.is_finite() {
            return;
        }

        self.current_time = self.clamp_time(current_time);
        self.emit_time();

        if matches!(state, PlaybackState::Playing) {
            if let Some(descriptor) = &self.descriptor {
                self.progress.save(
                    &descriptor.id,
                    self.current_time,
                    self.duration,
                    descriptor.video_type,
                );
            }
        } else {
            self.progress.flush_due();
        }

        if matches!(state, PlaybackState::Playing | PlaybackState::Buffering) {
            self.evaluate_buffer();
        }
    }

    fn evaluate_buffer(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let snapshot = backend.snapshot();

        let percentage = snapshot.buffered_percentage();
        if (percentage - self.buffered_percentage).abs() > f64::EPSILON {
            self.buffered_percentage = percentage;
            self.emit(PlayerEvent::BufferUpdate {
                buffered_percentage: percentage,
            });
        }

        let wants_playback = match self.machine.state() {
            PlaybackState::Playing => true,
            PlaybackState::Buffering => self.machine.intent() == Intent::Play,
            _ => false,
        };
        if wants_playback || self.health.is_buffer_paused() {
            let actions = self.health.on_buffer_progress(&snapshot, wants_playback);
            self.apply_health(actions);
        }
    }

    fn apply_health(&mut self, actions: Vec<HealthAction>) {
        for action in actions {
            match action {
                HealthAction::EnterBuffering => {
                    self.transition(Transition::Stall);
                }
                HealthAction::ExitBuffering => {
                    self.transition(Transition::ResumeData);
                }
                HealthAction::PauseForBuffer => {
                    if let Some(backend) = &self.backend {
                        backend.pause();
                    }
                }
                HealthAction::ResumeAfterBuffer => {
                    if let Some(backend) = self.backend.clone() {
                        if let Err(e) = backend.play() {
                            self.fail(e);
                            return;
                        }
                    }
                }
                // Connectivity actions are handled where they are produced
                HealthAction::ReportOffline | HealthAction::Reload => {}
            }
        }
    }

    /// Let the surface win when it paused, played or ended without a command
    fn reconcile(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let truth = backend.snapshot();
        let Some(state) = self.machine.reconcile(&truth) else {
            return;
        };

        self.emit(PlayerEvent::StateChanged {
            state: state.clone(),
        });
        match state {
            PlaybackState::Ended => self.finish_ended(),
            PlaybackState::Paused => {
                self.persist_position();
                self.progress.flush();
            }
            _ => {}
        }
    }

    fn on_seek_complete(&mut self) {
        self.seek_pending = false;
        if !matches!(self.machine.state(), PlaybackState::Seeking) {
            debug!("Seek completed outside Seeking (resume or pre-play seek)");
            return;
        }
        let Some(backend) = self.backend.clone() else {
            return;
        };

        let truth = backend.snapshot();
        if truth.current_time.is_finite() {
            self.current_time = self.clamp_time(truth.current_time);
        }
        self.transition(Transition::SeekComplete);
        self.emit_time();

        // Bring the surface in line with the intent the seek resolved to
        let resolved = self.machine.state().clone();
        match resolved {
            PlaybackState::Playing if truth.paused => {
                if let Err(e) = backend.play() {
                    self.fail(e);
                }
            }
            PlaybackState::Paused if !truth.paused => backend.pause(),
            _ => {}
        }
    }

    fn finish_ended(&mut self) {
        if self.duration > 0.0 {
            self.current_time = self.duration;
        }
        self.emit_time();

        if let Some((video_id, video_type)) = self
            .descriptor
            .as_ref()
            .map(|d| (d.id.clone(), d.video_type))
        {
            info!("Video {} ended", video_id);
            self.progress.complete(&video_id, self.duration, video_type);
            self.emit(PlayerEvent::VideoEnded { video_id });
        }
    }

    fn fail(&mut self, error: MediaError) {
        // A fetch that failed while the host is offline is a connectivity loss
        let error = match error {
            MediaError::Network {
                kind: NetworkErrorKind::FetchFailed,
                ..
            } if !self.health.is_online() => MediaError::offline(),
            other => other,
        };

        error!("Playback failed [{}]: {}", error.code(), error);
        self.persist_position();
        self.progress.flush();
        self.transition(Transition::Fail(error));
    }

    fn toggle_play(&mut self) {
        let state = self.machine.state().clone();
        match state {
            PlaybackState::Ended => self.replay(),
            PlaybackState::Playing => self.pause(),
            PlaybackState::Buffering | PlaybackState::Seeking
                if self.machine.intent() == Intent::Play =>
            {
                self.pause()
            }
            PlaybackState::Loading => {
                self.play_on_ready = !self.play_on_ready;
                debug!("Play on ready: {}", self.play_on_ready);
            }
            _ => self.play(),
        }
    }

    fn play(&mut self) {
        let state = self.machine.state().clone();
        match state {
            PlaybackState::Loading => {
                self.play_on_ready = true;
                return;
            }
            PlaybackState::Ready if self.resume == ResumeState::Pending => {
                self.play_on_ready = true;
                return;
            }
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Seeking => {}
            // The surface is held by the health monitor; only record the intent
            PlaybackState::Buffering => {
                self.transition(Transition::Play);
                return;
            }
            _ => {
                debug!("Play ignored in state {}", state.name());
                return;
            }
        }

        let Some(backend) = self.backend.clone() else {
            return;
        };
        if let Err(e) = backend.play() {
            self.fail(e);
            return;
        }
        self.transition(Transition::Play);
    }

    fn pause(&mut self) {
        let state = self.machine.state().clone();
        match state {
            PlaybackState::Playing | PlaybackState::Seeking => {}
            PlaybackState::Buffering => self.health.clear_stall(),
            PlaybackState::Loading | PlaybackState::Ready => {
                self.play_on_ready = false;
                return;
            }
            _ => return,
        }

        if let Some(backend) = &self.backend {
            backend.pause();
        }
        self.transition(Transition::Pause);
        self.persist_position();
        self.progress.flush();
    }

    fn seek(&mut self, time: f64) {
        if !time.is_finite() {
            return;
        }
        let Some(backend) = self.backend.clone() else {
            return;
        };

        let target = self.clamp_time(time);
        let state = self.machine.state().clone();
        match state {
            PlaybackState::Ready => {
                // An explicit position before first play replaces the stored one
                if matches!(self.resume, ResumeState::Resolved(_)) {
                    self.resume = ResumeState::Consumed;
                }
                self.seek_pending = true;
            }
            PlaybackState::Playing | PlaybackState::Paused => {
                self.transition(Transition::SeekStart);
            }
            PlaybackState::Buffering => {
                self.health.clear_stall();
                self.transition(Transition::SeekStart);
            }
            PlaybackState::Seeking => debug!("Retargeting pending seek to {:.1}s", target),
            _ => {
                debug!("Seek ignored in state {}", state.name());
                return;
            }
        }

        backend.seek(target);
        self.current_time = target;
        self.emit_time();
    }

    fn skip(&mut self, delta: f64) {
        if self.is_skip_locked() {
            debug!("Skip refused: lesson not completed");
            return;
        }

        if let Some(direction) = self.navigation.edge_direction(
            delta,
            self.current_time,
            self.duration,
            self.config.navigation_edge_seconds,
        ) {
            self.navigate(direction);
            return;
        }
        self.seek(self.current_time + delta);
    }

    fn replay(&mut self) {
        if !matches!(self.machine.state(), PlaybackState::Ended) {
            return;
        }
        let Some(backend) = self.backend.clone() else {
            return;
        };

        info!("Replaying from the start");
        self.health.clear_stall();
        self.seek_pending = true;
        backend.seek(0.0);
        self.current_time = 0.0;
        if let Err(e) = backend.play() {
            self.fail(e);
            return;
        }
        self.transition(Transition::Replay);
        self.emit_time();
    }

    fn retry(&mut self) {
        if !self.machine.state().is_error() {
            debug!("Retry only applies in Error");
            return;
        }
        info!("Retrying playback from scratch");
        self.reload();
    }

    fn set_online(&mut self, online: bool) {
        match self.health.on_connectivity(online) {
            Some(HealthAction::ReportOffline) => {
                let state = self.machine.state();
                let interrupts = self.backend.is_some()
                    && !matches!(
                        state,
                        PlaybackState::Idle | PlaybackState::Ended | PlaybackState::Error(_)
                    );
                if interrupts {
                    self.fail(MediaError::offline());
                }
            }
            Some(HealthAction::Reload) => {
                let offline_error = matches!(
                    self.machine.state(),
                    PlaybackState::Error(info) if info.error.is_auto_recoverable()
                );
                if offline_error {
                    self.reload();
                }
            }
            _ => {}
        }
    }

    fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        if let Some(backend) = &self.backend {
            backend.set_volume(volume);
            if volume > 0.0 && self.muted {
                self.muted = false;
                backend.set_muted(false);
            }
        }
        self.emit(PlayerEvent::VolumeChanged {
            volume: self.volume,
            muted: self.muted,
        });
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(backend) = &self.backend {
            backend.set_muted(muted);
        }
        self.emit(PlayerEvent::VolumeChanged {
            volume: self.volume,
            muted,
        });
    }

    fn set_rate(&mut self, rate: f64) {
        if !rate.is_finite() {
            return;
        }
        let rate = rate.clamp(MIN_RATE, MAX_RATE);
        self.rate = rate;
        if let Some(backend) = &self.backend {
            backend.set_rate(rate);
        }
        self.emit(PlayerEvent::RateChanged { rate });
    }

    fn request_presentation(&mut self, request: PresentationRequest) {
        let presenter = self.presenter.clone();
        let tx = self.envelope_tx.clone();
        let generation = self.generation;
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = match request {
                PresentationRequest::EnterFullscreen => presenter.enter_fullscreen().await,
                PresentationRequest::ExitFullscreen => presenter.exit_fullscreen().await,
                PresentationRequest::EnterPictureInPicture => {
                    presenter.enter_picture_in_picture().await
                }
                PresentationRequest::ExitPictureInPicture => {
                    presenter.exit_picture_in_picture().await
                }
            };
            let _ = tx.send(Envelope::Presentation {
                generation,
                request,
                result,
            });
        });
    }

    fn on_presentation(
        &mut self,
        request: PresentationRequest,
        result: Result<(), PresentationError>,
    ) {
        if let Err(e) = result {
            warn!("{:?} failed: {}", request, e);
            return;
        }

        match request {
            PresentationRequest::EnterFullscreen => self.set_fullscreen(true),
            PresentationRequest::ExitFullscreen => self.set_fullscreen(false),
            PresentationRequest::EnterPictureInPicture => {
                if !self.picture_in_picture {
                    self.picture_in_picture = true;
                    self.emit(PlayerEvent::PictureInPictureChanged { active: true });
                }
            }
            PresentationRequest::ExitPictureInPicture => self.left_picture_in_picture(),
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen != fullscreen {
            self.fullscreen = fullscreen;
            self.emit(PlayerEvent::FullscreenChanged { fullscreen });
        }
    }

    /// Leaving picture-in-picture always pauses: there is no visible surface any more
    fn left_picture_in_picture(&mut self) {
        if self.picture_in_picture {
            self.picture_in_picture = false;
            self.emit(PlayerEvent::PictureInPictureChanged { active: false });
        }
        self.pause();
    }

    fn navigate(&mut self, direction: NavigationDirection) {
        if self.navigation.navigate(direction) {
            self.emit(PlayerEvent::NavigationRequested { direction });
        }
    }

    fn is_skip_locked(&self) -> bool {
        self.descriptor
            .as_ref()
            .map(VideoDescriptor::is_skip_locked)
            .unwrap_or(true)
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if self.duration > 0.0 {
            time.clamp(0.0, self.duration)
        } else {
            time.max(0.0)
        }
    }

    fn persist_position(&mut self) {
        if !self.machine.state().is_active() {
            return;
        }
        if let Some(descriptor) = &self.descriptor {
            self.progress.save(
                &descriptor.id,
                self.current_time,
                self.duration,
                descriptor.video_type,
            );
        }
    }

    fn transition(&mut self, transition: Transition) -> bool {
        match self.machine.apply(transition) {
            Some(state) => {
                debug!("Playback state -> {}", state.name());
                self.emit(PlayerEvent::StateChanged { state });
                true
            }
            None => false,
        }
    }

    fn emit_time(&self) {
        self.emit(PlayerEvent::TimeUpdate {
            current_time: self.current_time,
            duration: self.duration,
        });
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}
