#![allow(dead_code)]

use lectern::playback::backend::DefaultBackendFactory;
use lectern::playback::{PlaybackState, PlayerController, PlayerEvent};
use lectern::test_support::{RecordingStorage, ScriptedEngine, SimulatedPresenter, SimulatedSurface};
use lectern::PlayerConfig;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A controller wired to simulated host pieces
pub struct PlayerFixture {
    pub controller: PlayerController,
    pub surface: Arc<SimulatedSurface>,
    pub presenter: Arc<SimulatedPresenter>,
    pub engine: Arc<ScriptedEngine>,
    pub storage: Arc<RecordingStorage>,
    pub events: tokio_mpsc::UnboundedReceiver<PlayerEvent>,
}

impl PlayerFixture {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(RecordingStorage::new()))
    }

    /// Share storage between fixtures to simulate a later session
    pub fn with_storage(storage: Arc<RecordingStorage>) -> Self {
        tracing_init();

        let surface = Arc::new(SimulatedSurface::new(120.0));
        let presenter = Arc::new(SimulatedPresenter::new());
        let engine = Arc::new(ScriptedEngine::new());
        let factory = Arc::new(DefaultBackendFactory::new(surface.clone(), engine.clone()));
        let (event_tx, events) = tokio_mpsc::unbounded_channel();

        let controller = PlayerController::new(
            PlayerConfig::default(),
            factory,
            presenter.clone(),
            storage.clone(),
            event_tx,
        );

        PlayerFixture {
            controller,
            surface,
            presenter,
            engine,
            storage,
            events,
        }
    }

    /// Drain queued events
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drain queued events, keeping only state changes
    pub fn states(&mut self) -> Vec<PlaybackState> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state().clone()
    }
}
