//! Event gate: turns per-iteration detections into rate-limited actions.
//!
//! Three timers, all compared with strict `>` against one monotonic clock:
//! - event cooldown: minimum spacing between recognized events, so one long
//!   splash is only recognized once;
//! - action debounce: minimum spacing between performed actions;
//! - watchdog: forces a recast when nothing has acted for too long.
//!
//! `last_event` moves only when a qualifying detection is recognized (even if
//! the debounce then suppresses the action). `last_action` moves only when an
//! action is actually performed.

use std::time::{Duration, Instant};

use crate::config::{Config, DetectionMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Recognized bite: catch at the target, then recast.
    Event,
    /// Liveness recovery: recast only.
    Watchdog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No qualifying event, watchdog not due.
    Idle,
    /// Qualifying event inside the cooldown window; ignored.
    CoolingDown,
    /// Event recognized but an action happened too recently.
    Debounced,
    Act(Trigger),
}

impl Decision {
    pub fn is_action(self) -> bool {
        matches!(self, Decision::Act(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    pub last_event: Option<Instant>,
    pub last_action: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct EventGate {
    mode: DetectionMode,
    event_cooldown: Duration,
    action_debounce: Duration,
    watchdog_timeout: Duration,
    /// Watchdog reference until the first action.
    started: Instant,
    state: GateState,
}

impl EventGate {
    pub fn new(
        mode: DetectionMode,
        event_cooldown: Duration,
        action_debounce: Duration,
        watchdog_timeout: Duration,
        started: Instant,
    ) -> Self {
        Self {
            mode,
            event_cooldown,
            action_debounce,
            watchdog_timeout,
            started,
            state: GateState::default(),
        }
    }

    pub fn from_config(config: &Config, started: Instant) -> Self {
        Self::new(
            config.mode,
            config.event_cooldown,
            config.action_debounce,
            config.watchdog_timeout,
            started,
        )
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn should_act(&mut self, now: Instant, detection_present: bool, signal_spike: bool) -> bool {
        self.decide(now, detection_present, signal_spike).is_action()
    }

    pub fn decide(&mut self, now: Instant, detection_present: bool, signal_spike: bool) -> Decision {
        let mut decision = Decision::Idle;

        if self.mode.qualifies(detection_present, signal_spike) {
            decision = self.recognize(now);
        }
        if decision.is_action() {
            return decision;
        }

        let watchdog_ref = self.state.last_action.unwrap_or(self.started);
        if now.saturating_duration_since(watchdog_ref) > self.watchdog_timeout {
            self.state.last_action = Some(now);
            return Decision::Act(Trigger::Watchdog);
        }
        decision
    }

    /// Re-stamps the last action once the post-action settle delay is over.
    pub fn complete_action(&mut self, now: Instant) {
        self.state.last_action = Some(now);
    }

    fn recognize(&mut self, now: Instant) -> Decision {
        if !elapsed_beyond(self.state.last_event, now, self.event_cooldown) {
            return Decision::CoolingDown;
        }
        self.state.last_event = Some(now);

        if !elapsed_beyond(self.state.last_action, now, self.action_debounce) {
            return Decision::Debounced;
        }
        self.state.last_action = Some(now);
        Decision::Act(Trigger::Event)
    }
}

/// `true` when `since` is unset or more than `window` ago.
fn elapsed_beyond(since: Option<Instant>, now: Instant, window: Duration) -> bool {
    since.is_none_or(|t| now.saturating_duration_since(t) > window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn gate(mode: DetectionMode, cooldown: f64, debounce: f64, watchdog: f64) -> (EventGate, Instant) {
        let t0 = Instant::now();
        (EventGate::new(mode, secs(cooldown), secs(debounce), secs(watchdog), t0), t0)
    }

    #[test]
    fn test_fresh_gate_acts_on_first_event() {
        let (mut g, t0) = gate(DetectionMode::Combined, 2.0, 2.0, 30.0);
        assert!(g.should_act(t0, true, true));
        assert_eq!(g.state().last_action, Some(t0));
        assert_eq!(g.state().last_event, Some(t0));
    }

    #[test]
    fn test_cooldown_suppresses_second_event() {
        let (mut g, t0) = gate(DetectionMode::Motion, 2.0, 0.0, 30.0);
        assert_eq!(g.decide(t0, true, false), Decision::Act(Trigger::Event));
        assert_eq!(g.decide(t0 + secs(1.0), true, false), Decision::CoolingDown);
        assert_eq!(g.state().last_event, Some(t0));
    }

    #[test]
    fn test_cooldown_allows_spaced_events() {
        let (mut g, t0) = gate(DetectionMode::Motion, 2.0, 0.0, 30.0);
        assert!(g.should_act(t0, true, false));
        assert!(g.should_act(t0 + secs(3.0), true, false));
        assert_eq!(g.state().last_event, Some(t0 + secs(3.0)));
    }

    #[test]
    fn test_cooldown_boundary_is_strict() {
        let (mut g, t0) = gate(DetectionMode::Audio, 2.0, 0.0, 30.0);
        assert!(g.should_act(t0, false, true));
        assert!(!g.should_act(t0 + secs(2.0), false, true));
    }

    #[test]
    fn test_debounce_recognizes_without_acting() {
        let (mut g, t0) = gate(DetectionMode::Audio, 1.0, 5.0, 30.0);
        assert!(g.should_act(t0, false, true));
        assert_eq!(g.decide(t0 + secs(2.0), false, true), Decision::Debounced);
        let state = g.state();
        assert_eq!(state.last_event, Some(t0 + secs(2.0)));
        assert_eq!(state.last_action, Some(t0));
        assert!(g.should_act(t0 + secs(6.0), false, true));
    }

    #[test]
    fn test_combined_mode_needs_both_signals() {
        let (mut g, t0) = gate(DetectionMode::Combined, 2.0, 2.0, 30.0);
        assert_eq!(g.decide(t0, true, false), Decision::Idle);
        assert_eq!(g.decide(t0, false, true), Decision::Idle);
        assert_eq!(g.state(), GateState::default());
    }

    #[test]
    fn test_watchdog_fires_once_after_timeout() {
        let (mut g, t0) = gate(DetectionMode::Combined, 2.0, 2.0, 30.0);
        let mut fired = Vec::new();
        for i in 0..=310u64 {
            let now = t0 + Duration::from_millis(i * 100);
            if let Decision::Act(trigger) = g.decide(now, false, false) {
                fired.push((i, trigger));
            }
        }
        assert_eq!(fired, vec![(301, Trigger::Watchdog)]);
        assert_eq!(g.state().last_event, None);
    }

    #[test]
    fn test_watchdog_not_due_at_exact_timeout() {
        let (mut g, t0) = gate(DetectionMode::Motion, 2.0, 2.0, 30.0);
        assert_eq!(g.decide(t0 + secs(30.0), false, false), Decision::Idle);
    }

    #[test]
    fn test_event_action_takes_precedence_over_watchdog() {
        let (mut g, t0) = gate(DetectionMode::Motion, 2.0, 2.0, 30.0);
        assert_eq!(g.decide(t0 + secs(40.0), true, false), Decision::Act(Trigger::Event));
        assert_eq!(g.decide(t0 + secs(40.5), false, false), Decision::Idle);
    }

    #[test]
    fn test_watchdog_fires_when_event_debounced() {
        let (mut g, t0) = gate(DetectionMode::Motion, 1.0, 100.0, 30.0);
        assert!(g.should_act(t0, true, false));
        assert_eq!(
            g.decide(t0 + secs(31.0), true, false),
            Decision::Act(Trigger::Watchdog)
        );
    }

    #[test]
    fn test_complete_action_restarts_watchdog() {
        let (mut g, t0) = gate(DetectionMode::Motion, 2.0, 2.0, 30.0);
        assert!(g.should_act(t0 + secs(1.0), true, false));
        g.complete_action(t0 + secs(7.0));
        assert!(!g.should_act(t0 + secs(36.0), false, false));
        assert!(g.should_act(t0 + secs(37.5), false, false));
    }
}
