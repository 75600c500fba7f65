use serde::{Deserialize, Serialize};

/// Logical role of a video within a course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    Intro,
    End,
    Lesson,
}

impl VideoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoType::Intro => "intro",
            VideoType::End => "end",
            VideoType::Lesson => "lesson",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "intro" => Some(VideoType::Intro),
            "end" => Some(VideoType::End),
            "lesson" => Some(VideoType::Lesson),
            _ => None,
        }
    }
}

/// Everything the controller needs to know about one playable unit.
///
/// Immutable for a playback session: supplying a different descriptor tears down the
/// backend and state machine and starts over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDescriptor {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Duration hint in seconds, used until the backend reports the real value
    pub duration: f64,
    #[serde(rename = "type")]
    pub video_type: VideoType,
    /// Last known position in seconds, supplied by the lesson collaborator
    pub last_position: Option<f64>,
    /// Completed lessons may be scrubbed freely; incomplete ones are skip-locked
    pub completion: bool,
}

impl VideoDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: String::new(),
            duration: 0.0,
            video_type: VideoType::Lesson,
            last_position: None,
            completion: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_type(mut self, video_type: VideoType) -> Self {
        self.video_type = video_type;
        self
    }

    pub fn with_last_position(mut self, position: f64) -> Self {
        self.last_position = Some(position);
        self
    }

    pub fn with_completion(mut self, completion: bool) -> Self {
        self.completion = completion;
        self
    }

    /// Skipping and scrubbing are disabled until the lesson has been completed once
    pub fn is_skip_locked(&self) -> bool {
        !self.completion
    }
}

/// Host display flags. They only gate which affordances are offered; the state machine
/// behaves identically whatever they are set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayFlags {
    pub show_volume_control: bool,
    pub show_skip_controls: bool,
    pub show_fullscreen: bool,
    pub show_settings: bool,
    pub show_theater_mode: bool,
    pub show_picture_in_picture: bool,
    pub allow_seeking: bool,
}

impl Default for DisplayFlags {
    fn default() -> Self {
        DisplayFlags {
            show_volume_control: true,
            show_skip_controls: true,
            show_fullscreen: true,
            show_settings: true,
            show_theater_mode: true,
            show_picture_in_picture: true,
            allow_seeking: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_serializes_with_host_field_names() {
        let descriptor = VideoDescriptor::new("v1", "lesson.mp4")
            .with_duration(120.0)
            .with_completion(true);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "lesson");
        assert_eq!(json["lastPosition"], serde_json::Value::Null);
        assert_eq!(json["completion"], true);
    }

    #[test]
    fn test_skip_lock_follows_completion() {
        assert!(VideoDescriptor::new("v1", "a.mp4").is_skip_locked());
        assert!(!VideoDescriptor::new("v1", "a.mp4")
            .with_completion(true)
            .is_skip_locked());
    }

    #[test]
    fn test_video_type_parse() {
        assert_eq!(VideoType::parse("intro"), Some(VideoType::Intro));
        assert_eq!(VideoType::parse("outro"), None);
    }
}
