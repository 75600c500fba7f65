pub mod backend;
mod controller;
pub mod controls;
pub mod events;
pub mod health;
pub mod navigation;
pub mod progress;
pub mod service;
pub mod state;
pub mod surface;

pub use backend::{classify, Backend, BackendEvent, ManifestFormat, QualityLevel, SourceKind};
pub use controller::{PlayerController, PlayerSnapshot};
pub use controls::{Affordances, KeyInput, PlayerCommand};
pub use events::{NavigationDirection, PlayerEvent, PlayerEventHandle};
pub use navigation::NavigationContext;
pub use progress::{ProgressRecord, ProgressStorage, ProgressStore};
pub use service::{PlayerHandle, PlayerService};
pub use state::{ErrorInfo, PlaybackState};
pub use surface::{MediaSurface, Presenter, ReadyState, SurfaceEvent, SurfaceSnapshot};
