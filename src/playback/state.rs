use crate::error::MediaError;
use crate::playback::surface::SurfaceSnapshot;
use tracing::debug;

/// Error payload carried by `PlaybackState::Error`
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub error: MediaError,
    /// Human-readable text for the host UI
    pub message: String,
}

impl From<MediaError> for ErrorInfo {
    fn from(error: MediaError) -> Self {
        let message = error.to_string();
        ErrorInfo { error, message }
    }
}

/// Current playback state
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Seeking,
    Ended,
    Error(ErrorInfo),
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Seeking => "seeking",
            PlaybackState::Ended => "ended",
            PlaybackState::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlaybackState::Error(_))
    }

    /// States in which media is loaded and the playhead is meaningful
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Buffering
                | PlaybackState::Seeking
        )
    }
}

/// Inputs to the state machine, from backend events or control commands
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Load,
    Ready,
    Play,
    Pause,
    Stall,
    ResumeData,
    SeekStart,
    SeekComplete,
    ReachEnd,
    Replay,
    Fail(MediaError),
    Reset,
}

/// What the viewer wants once a stall or seek resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Play,
    Pause,
}

impl Intent {
    fn resolved(self) -> PlaybackState {
        match self {
            Intent::Play => PlaybackState::Playing,
            Intent::Pause => PlaybackState::Paused,
        }
    }
}

/// Sole owner of `PlaybackState`.
///
/// ```text
/// Idle --load--> Loading --ready--> Ready --play--> Playing
/// Playing <--pause/play--> Paused
/// Playing --stall--> Buffering --resume-data--> Playing | Paused (intent at stall)
/// Playing/Paused/Buffering --seek--> Seeking --seek-complete--> prior
/// active --reach-end--> Ended --replay--> Playing (from zero)
/// Ended/Error --load--> Loading
/// any --fail--> Error, any --reset--> Idle
/// ```
#[derive(Debug)]
pub struct StateMachine {
    state: PlaybackState,
    /// Resolution target for Buffering and Seeking
    intent: Intent,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: PlaybackState::Idle,
            intent: Intent::Pause,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Apply a transition. Returns the new state when it changed, `None` when the
    /// transition is not legal from the current state (it is then ignored).
    pub fn apply(&mut self, transition: Transition) -> Option<PlaybackState> {
        use PlaybackState as S;

        let next = match (&self.state, transition) {
            (_, Transition::Reset) => S::Idle,
            (_, Transition::Fail(error)) => S::Error(ErrorInfo::from(error)),

            (S::Idle | S::Ended | S::Error(_), Transition::Load) => S::Loading,
            (S::Loading, Transition::Ready) => S::Ready,

            (S::Ready | S::Paused, Transition::Play) => {
                self.intent = Intent::Play;
                S::Playing
            }
            (S::Buffering | S::Seeking, Transition::Play) => {
                self.intent = Intent::Play;
                return None;
            }
            (S::Playing | S::Buffering, Transition::Pause) => {
                self.intent = Intent::Pause;
                S::Paused
            }
            (S::Seeking, Transition::Pause) => {
                self.intent = Intent::Pause;
                return None;
            }

            (S::Playing, Transition::Stall) => {
                self.intent = Intent::Play;
                S::Buffering
            }
            (S::Buffering, Transition::ResumeData) => self.intent.resolved(),

            (S::Playing, Transition::SeekStart) => {
                self.intent = Intent::Play;
                S::Seeking
            }
            (S::Paused, Transition::SeekStart) => {
                self.intent = Intent::Pause;
                S::Seeking
            }
            // Keeps the intent recorded at stall time
            (S::Buffering, Transition::SeekStart) => S::Seeking,
            (S::Seeking, Transition::SeekComplete) => self.intent.resolved(),

            (S::Playing | S::Paused | S::Buffering | S::Seeking, Transition::ReachEnd) => {
                self.intent = Intent::Pause;
                S::Ended
            }
            (S::Ended, Transition::Replay) => {
                self.intent = Intent::Play;
                S::Playing
            }

            (state, transition) => {
                debug!(
                    "Ignoring transition {:?} in state {}",
                    transition,
                    state.name()
                );
                return None;
            }
        };

        if next == self.state {
            return None;
        }
        self.state = next.clone();
        Some(next)
    }

    /// Re-derive Playing/Paused/Ended from what the surface actually reports.
    ///
    /// The surface may pause on its own (page hidden, OS interruption) or reach the end
    /// between events; the surface wins over the last commanded intent.
    pub fn reconcile(&mut self, truth: &SurfaceSnapshot) -> Option<PlaybackState> {
        match self.state.clone() {
            PlaybackState::Playing | PlaybackState::Paused if truth.ended => {
                self.apply(Transition::ReachEnd)
            }
            PlaybackState::Playing if truth.paused => {
                debug!("Surface paused without a command, reconciling to Paused");
                self.apply(Transition::Pause)
            }
            PlaybackState::Paused if !truth.paused => {
                debug!("Surface playing without a command, reconciling to Playing");
                self.apply(Transition::Play)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> StateMachine {
        let mut machine = StateMachine::new();
        machine.apply(Transition::Load);
        machine.apply(Transition::Ready);
        machine.apply(Transition::Play);
        machine
    }

    #[test]
    fn test_happy_path() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.apply(Transition::Load), Some(PlaybackState::Loading));
        assert_eq!(machine.apply(Transition::Ready), Some(PlaybackState::Ready));
        assert_eq!(machine.apply(Transition::Play), Some(PlaybackState::Playing));
        assert_eq!(machine.apply(Transition::Pause), Some(PlaybackState::Paused));
    }

    #[test]
    fn test_play_before_ready_is_ignored() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.apply(Transition::Play), None);
        machine.apply(Transition::Load);
        assert_eq!(machine.apply(Transition::Play), None);
        assert_eq!(machine.state(), &PlaybackState::Loading);
    }

    #[test]
    fn test_buffering_resolves_to_pre_stall_intent() {
        let mut machine = playing();
        assert_eq!(machine.apply(Transition::Stall), Some(PlaybackState::Buffering));
        assert_eq!(
            machine.apply(Transition::ResumeData),
            Some(PlaybackState::Playing)
        );
    }

    #[test]
    fn test_seek_returns_to_prior_state() {
        let mut machine = playing();
        machine.apply(Transition::Pause);
        machine.apply(Transition::SeekStart);
        assert_eq!(machine.state(), &PlaybackState::Seeking);
        assert_eq!(
            machine.apply(Transition::SeekComplete),
            Some(PlaybackState::Paused)
        );

        machine.apply(Transition::Play);
        machine.apply(Transition::SeekStart);
        assert_eq!(
            machine.apply(Transition::SeekComplete),
            Some(PlaybackState::Playing)
        );
    }

    #[test]
    fn test_pause_during_seek_changes_resolution() {
        let mut machine = playing();
        machine.apply(Transition::SeekStart);
        assert_eq!(machine.apply(Transition::Pause), None);
        assert_eq!(
            machine.apply(Transition::SeekComplete),
            Some(PlaybackState::Paused)
        );
    }

    #[test]
    fn test_ended_is_terminal_until_replay_or_load() {
        let mut machine = playing();
        machine.apply(Transition::ReachEnd);
        assert_eq!(machine.apply(Transition::Play), None);
        assert_eq!(machine.apply(Transition::SeekStart), None);
        assert_eq!(machine.state(), &PlaybackState::Ended);
        assert_eq!(machine.apply(Transition::Replay), Some(PlaybackState::Playing));
    }

    #[test]
    fn test_fail_from_anywhere_and_retry_loads() {
        let mut machine = playing();
        let state = machine.apply(Transition::Fail(MediaError::Decode("bad".into())));
        assert!(matches!(state, Some(PlaybackState::Error(_))));
        assert_eq!(machine.apply(Transition::Play), None);
        assert_eq!(machine.apply(Transition::Load), Some(PlaybackState::Loading));
    }

    #[test]
    fn test_reconcile_prefers_surface_truth() {
        let mut machine = playing();
        let paused = SurfaceSnapshot {
            paused: true,
            ..Default::default()
        };
        assert_eq!(machine.reconcile(&paused), Some(PlaybackState::Paused));
        let ended = SurfaceSnapshot {
            paused: true,
            ended: true,
            ..Default::default()
        };
        assert_eq!(machine.reconcile(&ended), Some(PlaybackState::Ended));
    }
}
