use thiserror::Error;

/// Whether a network failure came from losing connectivity or from the server side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The host reported no connectivity
    Offline,
    /// The locator or manifest could not be fetched (HTTP failure, timeout, refused)
    FetchFailed,
}

/// Media-level failures a backend can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Network error ({kind:?}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Playback aborted")]
    Aborted,
    #[error("Media not found: {0}")]
    NotFound(String),
}

impl MediaError {
    pub fn offline() -> Self {
        MediaError::Network {
            kind: NetworkErrorKind::Offline,
            message: "No network connection".to_string(),
        }
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        MediaError::Network {
            kind: NetworkErrorKind::FetchFailed,
            message: message.into(),
        }
    }

    /// Only a connectivity loss recovers on its own (reload when the host is back online)
    pub fn is_auto_recoverable(&self) -> bool {
        matches!(
            self,
            MediaError::Network {
                kind: NetworkErrorKind::Offline,
                ..
            }
        )
    }

    /// Stable short code for logs and host UIs
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::UnsupportedFormat(_) => "unsupported_format",
            MediaError::Network {
                kind: NetworkErrorKind::Offline,
                ..
            } => "network_offline",
            MediaError::Network {
                kind: NetworkErrorKind::FetchFailed,
                ..
            } => "network_fetch_failed",
            MediaError::Decode(_) => "decode_error",
            MediaError::Aborted => "aborted",
            MediaError::NotFound(_) => "not_found",
        }
    }
}

/// Errors from the progress persistence layer
#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Progress writer has shut down")]
    WriterClosed,
}

/// Errors from host fullscreen / picture-in-picture requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresentationError {
    #[error("Request refused: {0}")]
    Refused(String),
    #[error("Not supported on this surface")]
    Unsupported,
}
