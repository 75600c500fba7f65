use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Player configuration
/// In debug builds a .env file is loaded first; every field can be overridden with a
/// `LECTERN_*` environment variable.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Minimum wall time between two persisted progress writes
    pub progress_save_interval: Duration,
    /// Records at or above this percentage are not restored on reload
    pub near_complete_percent: f64,
    /// Seconds moved by one skip gesture
    pub skip_seconds: f64,
    /// Volume change for one arrow-up/down press
    pub volume_step: f64,
    /// Pause playback when less than this share of the video is buffered
    pub critical_buffer_percent: f64,
    /// Resume a buffer-pause once this share is buffered
    pub resume_buffer_percent: f64,
    /// Buffered lookahead below which a playing video counts as stalled
    pub min_lookahead_seconds: f64,
    /// Skip gestures this close to either end navigate to the adjacent track instead
    pub navigation_edge_seconds: f64,
    /// Directory for file-backed progress storage
    pub progress_dir: Option<PathBuf>,
    /// HTTP timeout for manifest requests
    pub manifest_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            progress_save_interval: Duration::from_secs(3),
            near_complete_percent: 95.0,
            skip_seconds: 10.0,
            volume_step: 0.1,
            critical_buffer_percent: 10.0,
            resume_buffer_percent: 20.0,
            min_lookahead_seconds: 0.5,
            navigation_edge_seconds: 1.0,
            progress_dir: None,
            manifest_timeout: Duration::from_secs(15),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from the environment (and .env in debug builds)
    pub fn from_env() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            } else {
                tracing::debug!("Config: No .env file found");
            }
        }

        let mut config = PlayerConfig::default();

        if let Some(ms) = env_parse::<u64>("LECTERN_PROGRESS_SAVE_INTERVAL_MS") {
            config.progress_save_interval = Duration::from_millis(ms);
        }
        if let Some(v) = env_parse("LECTERN_NEAR_COMPLETE_PERCENT") {
            config.near_complete_percent = v;
        }
        if let Some(v) = env_parse("LECTERN_SKIP_SECONDS") {
            config.skip_seconds = v;
        }
        if let Some(v) = env_parse("LECTERN_VOLUME_STEP") {
            config.volume_step = v;
        }
        if let Some(v) = env_parse("LECTERN_CRITICAL_BUFFER_PERCENT") {
            config.critical_buffer_percent = v;
        }
        if let Some(v) = env_parse("LECTERN_RESUME_BUFFER_PERCENT") {
            config.resume_buffer_percent = v;
        }
        if let Some(v) = env_parse("LECTERN_MIN_LOOKAHEAD_SECONDS") {
            config.min_lookahead_seconds = v;
        }
        if let Some(v) = env_parse("LECTERN_NAVIGATION_EDGE_SECONDS") {
            config.navigation_edge_seconds = v;
        }
        if let Some(secs) = env_parse::<u64>("LECTERN_MANIFEST_TIMEOUT_SECS") {
            config.manifest_timeout = Duration::from_secs(secs);
        }
        config.progress_dir = std::env::var("LECTERN_PROGRESS_DIR").ok().map(PathBuf::from);

        info!("Config: {:?}", config);
        config
    }

    /// Directory used by the file and SQLite progress stores.
    /// Falls back to the platform data dir, then the current directory.
    pub fn get_progress_dir(&self) -> PathBuf {
        if let Some(path) = &self.progress_dir {
            return path.clone();
        }

        dirs::data_local_dir()
            .map(|dir| dir.join("lectern"))
            .unwrap_or_else(|| PathBuf::from(".lectern"))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Config: ignoring unparseable {}={}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.progress_save_interval, Duration::from_secs(3));
        assert_eq!(config.near_complete_percent, 95.0);
        assert_eq!(config.skip_seconds, 10.0);
    }

    #[test]
    fn test_explicit_progress_dir_wins() {
        let config = PlayerConfig {
            progress_dir: Some(PathBuf::from("/tmp/lectern-test")),
            ..Default::default()
        };
        assert_eq!(config.get_progress_dir(), PathBuf::from("/tmp/lectern-test"));
    }
}
