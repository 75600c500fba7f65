// Library exports for the player binary and integration tests

pub mod config;
pub mod descriptor;
pub mod error;
pub mod playback;

pub use config::PlayerConfig;
pub use descriptor::{DisplayFlags, VideoDescriptor, VideoType};
pub use error::{MediaError, NetworkErrorKind, PresentationError, ProgressError};

// Test support (unit tests, or integration tests via the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
