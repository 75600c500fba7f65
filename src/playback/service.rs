use crate::config::PlayerConfig;
use crate::descriptor::{DisplayFlags, VideoDescriptor};
use crate::playback::backend::{DefaultBackendFactory, StreamingEngine};
use crate::playback::controller::{PlayerController, PlayerSnapshot};
use crate::playback::controls::{KeyInput, PlayerCommand};
use crate::playback::events::{PlayerEvent, PlayerEventHandle};
use crate::playback::navigation::NavigationContext;
use crate::playback::progress::ProgressStorage;
use crate::playback::surface::{MediaSurface, Presenter};
use std::sync::Arc;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio::time::Instant;
use tracing::info;

/// Messages sent to the player task
enum ServiceMessage {
    Command(PlayerCommand),
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the player service for sending commands
#[derive(Clone)]
pub struct PlayerHandle {
    command_tx: tokio_mpsc::UnboundedSender<ServiceMessage>,
    event_handle: PlayerEventHandle,
}

impl PlayerHandle {
    pub fn send(&self, command: PlayerCommand) {
        let _ = self.command_tx.send(ServiceMessage::Command(command));
    }

    pub fn set_descriptor(&self, descriptor: VideoDescriptor) {
        self.send(PlayerCommand::SetDescriptor(descriptor));
    }

    pub fn set_navigation(&self, context: NavigationContext) {
        self.send(PlayerCommand::SetNavigation(context));
    }

    pub fn set_display_flags(&self, flags: DisplayFlags) {
        self.send(PlayerCommand::SetDisplayFlags(flags));
    }

    pub fn set_autoplay(&self, autoplay: bool) {
        self.send(PlayerCommand::SetAutoplay(autoplay));
    }

    pub fn toggle_play(&self) {
        self.send(PlayerCommand::TogglePlay);
    }

    pub fn play(&self) {
        self.send(PlayerCommand::Play);
    }

    pub fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    pub fn seek(&self, time: f64) {
        self.send(PlayerCommand::Seek(time));
    }

    pub fn scrub(&self, time: f64) {
        self.send(PlayerCommand::Scrub(time));
    }

    pub fn skip(&self, delta: f64) {
        self.send(PlayerCommand::Skip(delta));
    }

    pub fn set_volume(&self, volume: f64) {
        self.send(PlayerCommand::SetVolume(volume));
    }

    pub fn toggle_mute(&self) {
        self.send(PlayerCommand::ToggleMute);
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.send(PlayerCommand::SetRate(rate));
    }

    pub fn toggle_fullscreen(&self) {
        self.send(PlayerCommand::ToggleFullscreen);
    }

    pub fn fullscreen_exited(&self) {
        self.send(PlayerCommand::FullscreenExited);
    }

    pub fn toggle_picture_in_picture(&self) {
        self.send(PlayerCommand::TogglePictureInPicture);
    }

    pub fn picture_in_picture_exited(&self) {
        self.send(PlayerCommand::PictureInPictureExited);
    }

    pub fn toggle_theater_mode(&self) {
        self.send(PlayerCommand::ToggleTheaterMode);
    }

    pub fn previous(&self) {
        self.send(PlayerCommand::Previous);
    }

    pub fn next(&self) {
        self.send(PlayerCommand::Next);
    }

    pub fn retry(&self) {
        self.send(PlayerCommand::Retry);
    }

    pub fn replay(&self) {
        self.send(PlayerCommand::Replay);
    }

    pub fn set_online(&self, online: bool) {
        self.send(PlayerCommand::Connectivity(online));
    }

    pub fn key(&self, key: KeyInput, focus_inside: bool) {
        self.send(PlayerCommand::Key { key, focus_inside });
    }

    pub fn destroy(&self) {
        self.send(PlayerCommand::Destroy);
    }

    /// Current player view, or `None` if the service has stopped
    pub async fn snapshot(&self) -> Option<PlayerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command_tx.send(ServiceMessage::Snapshot(reply)).ok()?;
        rx.await.ok()
    }

    /// Stop the service after persisting the current position
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(ServiceMessage::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<PlayerEvent> {
        self.event_handle.subscribe_all()
    }
}

/// Runs a `PlayerController` on its own task
pub struct PlayerService {
    controller: PlayerController,
    command_rx: tokio_mpsc::UnboundedReceiver<ServiceMessage>,
}

impl PlayerService {
    pub fn start(
        config: PlayerConfig,
        surface: Arc<dyn MediaSurface>,
        presenter: Arc<dyn Presenter>,
        engine: Arc<dyn StreamingEngine>,
        storage: Arc<dyn ProgressStorage>,
        runtime_handle: tokio::runtime::Handle,
    ) -> PlayerHandle {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();

        let event_handle = PlayerEventHandle::new(event_rx, runtime_handle.clone());

        let handle = PlayerHandle {
            command_tx,
            event_handle,
        };

        let factory = Arc::new(DefaultBackendFactory::new(surface, engine));
        runtime_handle.spawn(async move {
            let controller = PlayerController::new(config, factory, presenter, storage, event_tx);
            let mut service = PlayerService {
                controller,
                command_rx,
            };
            service.run().await;
        });

        handle
    }

    async fn run(&mut self) {
        info!("PlayerService started");

        loop {
            let flush_at = self.controller.next_flush_at();
            tokio::select! {
                message = self.command_rx.recv() => match message {
                    Some(ServiceMessage::Command(command)) => self.controller.execute(command),
                    Some(ServiceMessage::Snapshot(reply)) => {
                        let _ = reply.send(self.controller.snapshot());
                    }
                    Some(ServiceMessage::Shutdown(reply)) => {
                        self.controller.flush_progress().await;
                        self.controller.execute(PlayerCommand::Destroy);
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.controller.flush_progress().await;
                        self.controller.execute(PlayerCommand::Destroy);
                        break;
                    }
                },
                Some(envelope) = self.controller.next_envelope() => {
                    self.controller.dispatch(envelope);
                }
                _ = wait_until(flush_at) => self.controller.tick(),
            }
        }

        info!("PlayerService stopped");
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
