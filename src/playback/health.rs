use crate::config::PlayerConfig;
use crate::playback::surface::{ReadyState, SurfaceSnapshot};
use tracing::{debug, info};

/// Decisions the health monitor hands back to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// Playback is stalled: move to Buffering
    EnterBuffering,
    /// Every stall reason cleared: leave Buffering
    ExitBuffering,
    /// Buffer critically low: pause the surface until enough data arrives
    PauseForBuffer,
    /// Enough data after a buffer pause: restart the surface
    ResumeAfterBuffer,
    /// Connectivity lost
    ReportOffline,
    /// Connectivity restored after a loss that interrupted playback
    Reload,
}

/// Watches buffering, stall and connectivity signals.
///
/// Buffering is the union of three reasons: the surface reported `waiting`, the
/// buffered lookahead fell below the minimum, or playback was paused because the
/// buffer was critically low. Buffering ends when none of them hold.
#[derive(Debug)]
pub struct HealthMonitor {
    critical_buffer_percent: f64,
    resume_buffer_percent: f64,
    min_lookahead_seconds: f64,
    surface_waiting: bool,
    low_lookahead: bool,
    buffer_paused: bool,
    online: bool,
    reload_on_reconnect: bool,
    ready_state: ReadyState,
}

impl HealthMonitor {
    pub fn new(config: &PlayerConfig) -> Self {
        HealthMonitor {
            critical_buffer_percent: config.critical_buffer_percent,
            resume_buffer_percent: config.resume_buffer_percent,
            min_lookahead_seconds: config.min_lookahead_seconds,
            surface_waiting: false,
            low_lookahead: false,
            buffer_paused: false,
            online: true,
            reload_on_reconnect: false,
            ready_state: ReadyState::HaveNothing,
        }
    }

    /// Forget per-media stall state (new descriptor, retry, replay)
    pub fn reset(&mut self) {
        self.surface_waiting = false;
        self.low_lookahead = false;
        self.buffer_paused = false;
        self.ready_state = ReadyState::HaveNothing;
    }

    /// Drop stall reasons after the viewer paused or seeked away; the next buffer
    /// signal re-evaluates them
    pub fn clear_stall(&mut self) {
        self.surface_waiting = false;
        self.low_lookahead = false;
        self.buffer_paused = false;
    }

    pub fn is_stalled(&self) -> bool {
        self.surface_waiting || self.low_lookahead || self.buffer_paused
    }

    pub fn is_buffer_paused(&self) -> bool {
        self.buffer_paused
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Record a readiness level; returns true when it changed
    pub fn on_ready_state(&mut self, ready_state: ReadyState) -> bool {
        if self.ready_state == ready_state {
            return false;
        }
        debug!("Ready state {:?} -> {:?}", self.ready_state, ready_state);
        self.ready_state = ready_state;
        true
    }

    /// The surface ran out of data
    pub fn on_waiting(&mut self) -> Vec<HealthAction> {
        let was_stalled = self.is_stalled();
        self.surface_waiting = true;
        Self::edges(was_stalled, self.is_stalled())
    }

    /// The surface has data again (`playing` / `canplay` after `waiting`)
    pub fn on_data_resumed(&mut self) -> Vec<HealthAction> {
        let was_stalled = self.is_stalled();
        self.surface_waiting = false;
        Self::edges(was_stalled, self.is_stalled())
    }

    /// Evaluate buffered ranges. `wants_playback` is true while the viewer expects
    /// the video to be moving (Playing, or Buffering with a play intent).
    pub fn on_buffer_progress(
        &mut self,
        snapshot: &SurfaceSnapshot,
        wants_playback: bool,
    ) -> Vec<HealthAction> {
        let was_stalled = self.is_stalled();
        let mut actions = Vec::new();

        let percentage = snapshot.buffered_percentage();
        let fully_buffered = snapshot.fully_buffered();

        if self.buffer_paused {
            if fully_buffered || percentage >= self.resume_buffer_percent || !wants_playback {
                info!("Buffer recovered to {:.1}%, resuming", percentage);
                self.buffer_paused = false;
                if wants_playback {
                    actions.push(HealthAction::ResumeAfterBuffer);
                }
            }
        } else if wants_playback
            && snapshot.current_time > 0.0
            && !fully_buffered
            && percentage < self.critical_buffer_percent
        {
            info!(
                "Buffer critically low ({:.1}% at {:.1}s), pausing until it recovers",
                percentage, snapshot.current_time
            );
            self.buffer_paused = true;
            actions.push(HealthAction::PauseForBuffer);
        }

        self.low_lookahead = wants_playback
            && !self.buffer_paused
            && !fully_buffered
            && snapshot.duration > 0.0
            && snapshot.current_time < snapshot.duration
            && snapshot.lookahead() < self.min_lookahead_seconds;

        actions.extend(Self::edges(was_stalled, self.is_stalled()));
        actions
    }

    /// Connectivity signal from the host
    pub fn on_connectivity(&mut self, online: bool) -> Option<HealthAction> {
        if self.online == online {
            return None;
        }
        self.online = online;

        if !online {
            info!("Connectivity lost");
            self.reload_on_reconnect = true;
            Some(HealthAction::ReportOffline)
        } else if std::mem::take(&mut self.reload_on_reconnect) {
            info!("Connectivity restored, reloading");
            Some(HealthAction::Reload)
        } else {
            None
        }
    }

    fn edges(was_stalled: bool, is_stalled: bool) -> Vec<HealthAction> {
        match (was_stalled, is_stalled) {
            (false, true) => vec![HealthAction::EnterBuffering],
            (true, false) => vec![HealthAction::ExitBuffering],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::surface::TimeRange;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&PlayerConfig::default())
    }

    fn snapshot(current_time: f64, duration: f64, buffered_end: f64) -> SurfaceSnapshot {
        SurfaceSnapshot {
            current_time,
            duration,
            buffered: vec![TimeRange {
                start: 0.0,
                end: buffered_end,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_waiting_enters_and_exits_buffering() {
        let mut health = monitor();
        assert_eq!(health.on_waiting(), vec![HealthAction::EnterBuffering]);
        assert!(health.on_waiting().is_empty());
        assert_eq!(health.on_data_resumed(), vec![HealthAction::ExitBuffering]);
    }

    #[test]
    fn test_critical_buffer_pauses_then_resumes() {
        let mut health = monitor();
        // 5% buffered of a 1000s video, 10s in
        let actions = health.on_buffer_progress(&snapshot(10.0, 1000.0, 50.0), true);
        assert_eq!(
            actions,
            vec![HealthAction::PauseForBuffer, HealthAction::EnterBuffering]
        );
        assert!(health.is_buffer_paused());

        // Still under the resume threshold
        assert!(health
            .on_buffer_progress(&snapshot(10.0, 1000.0, 150.0), true)
            .is_empty());

        let actions = health.on_buffer_progress(&snapshot(10.0, 1000.0, 250.0), true);
        assert_eq!(
            actions,
            vec![HealthAction::ResumeAfterBuffer, HealthAction::ExitBuffering]
        );
    }

    #[test]
    fn test_no_critical_pause_at_start_or_when_paused() {
        let mut health = monitor();
        assert!(!health
            .on_buffer_progress(&snapshot(0.0, 1000.0, 50.0), true)
            .contains(&HealthAction::PauseForBuffer));
        assert!(health
            .on_buffer_progress(&snapshot(10.0, 1000.0, 50.0), false)
            .is_empty());
    }

    #[test]
    fn test_low_lookahead_counts_as_stall() {
        let mut health = monitor();
        // 50% buffered but playhead sits at the edge of the buffered range
        let actions = health.on_buffer_progress(&snapshot(499.9, 1000.0, 500.0), true);
        assert_eq!(actions, vec![HealthAction::EnterBuffering]);
        let actions = health.on_buffer_progress(&snapshot(499.9, 1000.0, 520.0), true);
        assert_eq!(actions, vec![HealthAction::ExitBuffering]);
    }

    #[test]
    fn test_fully_buffered_never_stalls() {
        let mut health = monitor();
        assert!(health
            .on_buffer_progress(&snapshot(59.9, 60.0, 60.0), true)
            .is_empty());
    }

    #[test]
    fn test_reload_only_after_a_loss() {
        let mut health = monitor();
        assert_eq!(health.on_connectivity(true), None);
        assert_eq!(
            health.on_connectivity(false),
            Some(HealthAction::ReportOffline)
        );
        assert!(!health.is_online());
        assert_eq!(health.on_connectivity(true), Some(HealthAction::Reload));
        assert_eq!(health.on_connectivity(true), None);
    }

    #[test]
    fn test_ready_state_changes_reported_once() {
        let mut health = monitor();
        assert!(health.on_ready_state(ReadyState::HaveMetadata));
        assert!(!health.on_ready_state(ReadyState::HaveMetadata));
        assert_eq!(health.ready_state(), ReadyState::HaveMetadata);
    }
}
