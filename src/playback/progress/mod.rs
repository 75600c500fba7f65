//! Per-video playback position persistence.
//!
//! `ProgressStore` is what the controller talks to: throttled saves, loads and clears,
//! all funnelled in order through one writer task into a `ProgressStorage`.

mod storage;
mod store;
mod throttle;

pub use storage::{
    JsonFileProgressStorage, MemoryProgressStorage, ProgressStorage, SqliteProgressStorage,
};
pub use store::ProgressStore;
pub use throttle::{PendingSave, SaveThrottle};

use crate::descriptor::VideoType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored viewing position of one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub current_time: f64,
    pub duration: f64,
    pub percentage: f64,
    #[serde(rename = "type")]
    pub video_type: VideoType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(current_time: f64, duration: f64, video_type: VideoType) -> Self {
        let current_time = if current_time.is_finite() {
            current_time.max(0.0)
        } else {
            0.0
        };
        let percentage = if duration.is_finite() && duration > 0.0 {
            (current_time / duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        ProgressRecord {
            current_time,
            duration,
            percentage,
            video_type,
            updated_at: Utc::now(),
        }
    }

    pub fn is_near_complete(&self, near_complete_percent: f64) -> bool {
        self.percentage >= near_complete_percent
    }

    /// Position to restore, if any. Near-complete records start over from zero.
    pub fn resume_position(&self, near_complete_percent: f64) -> Option<f64> {
        if self.is_near_complete(near_complete_percent) || self.current_time <= 0.0 {
            None
        } else {
            Some(self.current_time)
        }
    }
}
