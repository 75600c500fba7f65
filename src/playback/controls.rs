use crate::config::PlayerConfig;
use crate::descriptor::{DisplayFlags, VideoDescriptor};
use crate::playback::events::NavigationDirection;
use crate::playback::navigation::{NavigationContext, NavigationCoordinator};
use crate::playback::state::PlaybackState;

/// Commands accepted by the player. Every state change goes through one of these.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    SetDescriptor(VideoDescriptor),
    SetNavigation(NavigationContext),
    SetDisplayFlags(DisplayFlags),
    SetAutoplay(bool),
    TogglePlay,
    Play,
    Pause,
    /// Programmatic seek, clamped to the timeline
    Seek(f64),
    /// Scrubber drag; refused while the lesson is skip-locked
    Scrub(f64),
    /// Relative skip in seconds; refused while the lesson is skip-locked
    Skip(f64),
    SetVolume(f64),
    AdjustVolume(f64),
    ToggleMute,
    SetRate(f64),
    ToggleFullscreen,
    /// The host left fullscreen on its own (escape key, OS gesture)
    FullscreenExited,
    TogglePictureInPicture,
    /// The system closed the picture-in-picture window
    PictureInPictureExited,
    ToggleTheaterMode,
    Previous,
    Next,
    Retry,
    Replay,
    Connectivity(bool),
    Key {
        key: KeyInput,
        focus_inside: bool,
    },
    Destroy,
}

/// Keys the player responds to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Space,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Char(char),
}

impl KeyInput {
    /// Parse a DOM `KeyboardEvent.key` value
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            " " | "Space" | "Spacebar" => Some(KeyInput::Space),
            "ArrowLeft" => Some(KeyInput::ArrowLeft),
            "ArrowRight" => Some(KeyInput::ArrowRight),
            "ArrowUp" => Some(KeyInput::ArrowUp),
            "ArrowDown" => Some(KeyInput::ArrowDown),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(KeyInput::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

/// Keyboard shortcut table. Keys pressed while focus is outside the player do nothing.
pub fn command_for_key(
    key: KeyInput,
    focus_inside: bool,
    config: &PlayerConfig,
) -> Option<PlayerCommand> {
    if !focus_inside {
        return None;
    }

    match key {
        KeyInput::Space => Some(PlayerCommand::TogglePlay),
        KeyInput::ArrowLeft => Some(PlayerCommand::Skip(-config.skip_seconds)),
        KeyInput::ArrowRight => Some(PlayerCommand::Skip(config.skip_seconds)),
        KeyInput::ArrowUp => Some(PlayerCommand::AdjustVolume(config.volume_step)),
        KeyInput::ArrowDown => Some(PlayerCommand::AdjustVolume(-config.volume_step)),
        KeyInput::Char('m' | 'M') => Some(PlayerCommand::ToggleMute),
        KeyInput::Char('f' | 'F') => Some(PlayerCommand::ToggleFullscreen),
        KeyInput::Char(_) => None,
    }
}

/// Which controls the host should render as enabled.
/// Display flags only hide affordances; they never change what a command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Affordances {
    pub play: bool,
    pub volume: bool,
    pub skip: bool,
    pub seeking: bool,
    pub fullscreen: bool,
    pub settings: bool,
    pub theater_mode: bool,
    pub picture_in_picture: bool,
    pub previous: bool,
    pub next: bool,
    pub retry: bool,
}

impl Affordances {
    pub fn compute(
        flags: &DisplayFlags,
        descriptor: Option<&VideoDescriptor>,
        state: &PlaybackState,
        navigation: &NavigationCoordinator,
    ) -> Self {
        let Some(descriptor) = descriptor else {
            return Affordances::default();
        };

        let live = !matches!(state, PlaybackState::Idle | PlaybackState::Error(_));
        let unlocked = !descriptor.is_skip_locked();

        Affordances {
            play: live,
            volume: live && flags.show_volume_control,
            skip: live && unlocked && flags.show_skip_controls,
            seeking: live && unlocked && flags.allow_seeking,
            fullscreen: live && flags.show_fullscreen,
            settings: live && flags.show_settings,
            theater_mode: live && flags.show_theater_mode,
            picture_in_picture: live && flags.show_picture_in_picture,
            previous: navigation.can_go(NavigationDirection::Previous),
            next: navigation.can_go(NavigationDirection::Next),
            retry: state.is_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcuts_ignored_outside_player() {
        let config = PlayerConfig::default();
        assert!(command_for_key(KeyInput::Space, false, &config).is_none());
        assert!(matches!(
            command_for_key(KeyInput::Space, true, &config),
            Some(PlayerCommand::TogglePlay)
        ));
    }

    #[test]
    fn test_shortcut_table() {
        let config = PlayerConfig::default();
        assert!(matches!(
            command_for_key(KeyInput::ArrowLeft, true, &config),
            Some(PlayerCommand::Skip(s)) if s == -10.0
        ));
        assert!(matches!(
            command_for_key(KeyInput::ArrowUp, true, &config),
            Some(PlayerCommand::AdjustVolume(v)) if (v - 0.1).abs() < 1e-9
        ));
        assert!(matches!(
            command_for_key(KeyInput::Char('M'), true, &config),
            Some(PlayerCommand::ToggleMute)
        ));
        assert!(matches!(
            command_for_key(KeyInput::Char('f'), true, &config),
            Some(PlayerCommand::ToggleFullscreen)
        ));
        assert!(command_for_key(KeyInput::Char('x'), true, &config).is_none());
    }

    #[test]
    fn test_parse_dom_keys() {
        assert_eq!(KeyInput::parse(" "), Some(KeyInput::Space));
        assert_eq!(KeyInput::parse("ArrowRight"), Some(KeyInput::ArrowRight));
        assert_eq!(KeyInput::parse("m"), Some(KeyInput::Char('m')));
        assert_eq!(KeyInput::parse("Escape"), None);
    }

    #[test]
    fn test_skip_affordance_follows_completion_and_flags() {
        let navigation = NavigationCoordinator::new();
        let locked = VideoDescriptor::new("v1", "lesson.mp4");
        let affordances = Affordances::compute(
            &DisplayFlags::default(),
            Some(&locked),
            &PlaybackState::Playing,
            &navigation,
        );
        assert!(!affordances.skip);
        assert!(!affordances.seeking);
        assert!(affordances.volume);

        let done = locked.with_completion(true);
        let flags = DisplayFlags {
            show_skip_controls: false,
            ..Default::default()
        };
        let affordances =
            Affordances::compute(&flags, Some(&done), &PlaybackState::Paused, &navigation);
        assert!(!affordances.skip);
        assert!(affordances.seeking);
    }
}
