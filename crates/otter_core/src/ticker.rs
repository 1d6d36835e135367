//! Central scheduling authority.
//!
//! The [`Ticker`] owns every periodic and one-shot timer in the simulation
//! and runs on a virtual clock counted in whole milliseconds, so repeated
//! runs with the same inputs fire the same callbacks at the same instants.
//!
//! The ticker only decides *when* something is due. It hands back a
//! [`Fired`] record naming a [`TickTarget`]; the [`World`](crate::world::World)
//! dispatches it. Timers that share a deadline fire in scheduling order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::{CommandId, RunId};
use crate::error::{GameError, Result};
use crate::resource::ResourceId;
use crate::world::StackRef;

/// Cadence used when `track` is called without an interval, in seconds.
pub const DEFAULT_TICK_INTERVAL: f64 = 0.05;

/// Milliseconds per second of game time.
const MILLIS_PER_SECOND: f64 = 1000.0;

/// Deadline of timers pushed past the end of the clock. They never fire.
const NEVER: u64 = u64::MAX;

/// Latest instant the clock can reach.
pub const LAST_INSTANT_MILLIS: u64 = NEVER - 1;

/// Handle to a tracked or scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something the world knows how to tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TickTarget {
    /// Accumulate total play time.
    TimePlayed,
    /// Persist registries to the attached store.
    Autosave,
    /// Passive accumulation of a resource.
    Generation(ResourceId),
    /// Recompute a resource's visibility flag.
    ResourceVisibility(ResourceId),
    /// Recompute a command's visibility flag.
    CommandVisibility(CommandId),
    /// Recompute a command's cached `can_run` flag.
    CommandAvailability(CommandId),
    /// Count down a timed modifier.
    ModifierCountdown {
        /// Stack holding the modifier.
        stack: StackRef,
        /// Entry key.
        key: String,
    },
    /// A command run reaches the end of its duration.
    RunFinished {
        /// Command being run.
        command: CommandId,
        /// Run handle.
        run: RunId,
    },
    /// A command cooldown expires.
    CooldownFinished {
        /// Command on cooldown.
        command: CommandId,
        /// Run handle that started the cooldown.
        run: RunId,
    },
    /// A periodic callback registered on the world.
    Callback(u64),
}

impl fmt::Display for TickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimePlayed => write!(f, "time-played"),
            Self::Autosave => write!(f, "autosave"),
            Self::Generation(id) => write!(f, "generation:{id}"),
            Self::ResourceVisibility(id) => write!(f, "visibility:{id}"),
            Self::CommandVisibility(id) => write!(f, "visibility:{id}"),
            Self::CommandAvailability(id) => write!(f, "availability:{id}"),
            Self::ModifierCountdown { stack, key } => write!(f, "countdown:{stack}:{key}"),
            Self::RunFinished { command, run } => write!(f, "run-finished:{command}#{}", run.0),
            Self::CooldownFinished { command, run } => {
                write!(f, "cooldown-finished:{command}#{}", run.0)
            }
            Self::Callback(id) => write!(f, "callback:{id}"),
        }
    }
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    /// Timer handle.
    pub timer: TimerId,
    /// What to tick.
    pub target: TickTarget,
    /// Elapsed seconds covered by this firing.
    pub delta: f64,
}

#[derive(Debug, Clone)]
struct Scheduled {
    id: TimerId,
    target: TickTarget,
    due: u64,
    since: u64,
    seq: u64,
    /// `Some` for periodic timers.
    interval: Option<u64>,
}

/// Convert seconds to whole milliseconds; non-finite and negative input is zero.
#[must_use]
pub fn seconds_to_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * MILLIS_PER_SECOND).round() as u64
}

/// Convert milliseconds to seconds.
#[must_use]
pub fn millis_to_seconds(millis: u64) -> f64 {
    millis as f64 / MILLIS_PER_SECOND
}

/// Virtual clock owning all periodic and one-shot timers.
#[derive(Debug, Clone, Default)]
pub struct Ticker {
    now: u64,
    time_played: f64,
    next_timer: u64,
    next_seq: u64,
    scheduled: Vec<Scheduled>,
}

impl Ticker {
    /// Create a ticker at time zero with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        millis_to_seconds(self.now)
    }

    /// Current virtual time in milliseconds.
    #[must_use]
    pub const fn now_millis(&self) -> u64 {
        self.now
    }

    /// Total play time accumulated by the time-played tick.
    #[must_use]
    pub const fn time_played(&self) -> f64 {
        self.time_played
    }

    /// Overwrite total play time (restore path).
    pub fn set_time_played(&mut self, seconds: f64) {
        self.time_played = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
    }

    pub(crate) fn add_time_played(&mut self, delta: f64) {
        if delta.is_finite() && delta > 0.0 {
            self.time_played += delta;
        }
    }

    /// Begin periodic ticking of `target` every `interval` seconds
    /// ([`DEFAULT_TICK_INTERVAL`] when `None`).
    ///
    /// # Errors
    ///
    /// [`GameError::AlreadyTracked`] if `target` already has a periodic timer.
    pub fn track(&mut self, target: TickTarget, interval: Option<f64>) -> Result<TimerId> {
        if self
            .scheduled
            .iter()
            .any(|s| s.interval.is_some() && s.target == target)
        {
            return Err(GameError::AlreadyTracked(target.to_string()));
        }
        let interval = seconds_to_millis(interval.unwrap_or(DEFAULT_TICK_INTERVAL)).max(1);
        Ok(self.push(target, interval, Some(interval)))
    }

    /// Schedule a single firing of `target` after `delay` seconds.
    pub fn schedule_once(&mut self, target: TickTarget, delay: f64) -> TimerId {
        self.push(target, seconds_to_millis(delay), None)
    }

    /// Stop a periodic or one-shot timer.
    ///
    /// # Errors
    ///
    /// [`GameError::NotTracked`] if the timer does not exist.
    pub fn untrack(&mut self, timer: TimerId) -> Result<()> {
        let index = self
            .scheduled
            .iter()
            .position(|s| s.id == timer)
            .ok_or_else(|| GameError::NotTracked(format!("timer {timer}")))?;
        self.scheduled.remove(index);
        Ok(())
    }

    /// Stop the periodic timer ticking `target`.
    ///
    /// # Errors
    ///
    /// [`GameError::NotTracked`] if `target` is not tracked.
    pub fn untrack_target(&mut self, target: &TickTarget) -> Result<()> {
        let timer = self
            .scheduled
            .iter()
            .find(|s| s.interval.is_some() && s.target == *target)
            .map(|s| s.id)
            .ok_or_else(|| GameError::NotTracked(target.to_string()))?;
        self.untrack(timer)
    }

    /// Whether a timer is still pending.
    #[must_use]
    pub fn is_tracked(&self, timer: TimerId) -> bool {
        self.scheduled.iter().any(|s| s.id == timer)
    }

    /// Target ticked by a pending timer.
    #[must_use]
    pub fn target_of(&self, timer: TimerId) -> Option<&TickTarget> {
        self.scheduled
            .iter()
            .find(|s| s.id == timer)
            .map(|s| &s.target)
    }

    /// Periodic timers in registration order.
    #[must_use]
    pub fn tracked(&self) -> Vec<(TimerId, TickTarget)> {
        self.scheduled
            .iter()
            .filter(|s| s.interval.is_some())
            .map(|s| (s.id, s.target.clone()))
            .collect()
    }

    /// Number of pending timers, periodic and one-shot.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    /// Deadline `millis` after now, capped at [`LAST_INSTANT_MILLIS`].
    #[must_use]
    pub fn deadline_after(&self, millis: u64) -> u64 {
        self.now.saturating_add(millis).min(LAST_INSTANT_MILLIS)
    }

    /// Pop the earliest timer due at or before `until` (milliseconds).
    ///
    /// Moves the clock to the timer's deadline. Periodic timers are
    /// rescheduled one interval later; one-shot timers are removed.
    pub(crate) fn pop_due(&mut self, until: u64) -> Option<Fired> {
        let index = self
            .scheduled
            .iter()
            .enumerate()
            .filter(|(_, s)| s.due <= until)
            .min_by_key(|(_, s)| (s.due, s.seq))
            .map(|(i, _)| i)?;

        let seq = self.next_seq;
        let entry = &mut self.scheduled[index];
        self.now = self.now.max(entry.due);
        let fired = Fired {
            timer: entry.id,
            target: entry.target.clone(),
            delta: millis_to_seconds(entry.due - entry.since),
        };

        if let Some(interval) = entry.interval {
            entry.since = entry.due;
            entry.due = entry.due.saturating_add(interval);
            entry.seq = seq;
            self.next_seq += 1;
        } else {
            self.scheduled.remove(index);
        }
        Some(fired)
    }

    /// Move the clock forward to `until` (milliseconds) once nothing is due.
    pub(crate) fn settle(&mut self, until: u64) {
        self.now = self.now.max(until.min(LAST_INSTANT_MILLIS));
    }

    fn push(&mut self, target: TickTarget, delay: u64, interval: Option<u64>) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.scheduled.push(Scheduled {
            id,
            target,
            due: self.now.saturating_add(delay),
            since: self.now,
            seq,
            interval,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ticker: &mut Ticker, until: u64) -> Vec<(u64, TickTarget)> {
        let mut fired = Vec::new();
        while let Some(f) = ticker.pop_due(until) {
            fired.push((ticker.now_millis(), f.target));
        }
        ticker.settle(until);
        fired
    }

    #[test]
    fn test_seconds_to_millis() {
        assert_eq!(seconds_to_millis(0.1), 100);
        assert_eq!(seconds_to_millis(1.3), 1300);
        assert_eq!(seconds_to_millis(-2.0), 0);
        assert_eq!(seconds_to_millis(f64::NAN), 0);
    }

    #[test]
    fn test_track_twice_is_an_error() {
        let mut ticker = Ticker::new();
        ticker.track(TickTarget::TimePlayed, Some(0.1)).unwrap();
        let result = ticker.track(TickTarget::TimePlayed, Some(0.2));
        assert!(matches!(result, Err(GameError::AlreadyTracked(_))));
        assert_eq!(ticker.tracked().len(), 1);
    }

    #[test]
    fn test_untrack_unknown_is_an_error() {
        let mut ticker = Ticker::new();
        let timer = ticker.track(TickTarget::Autosave, None).unwrap();
        assert!(ticker.untrack(timer).is_ok());
        assert!(matches!(ticker.untrack(timer), Err(GameError::NotTracked(_))));
        assert!(ticker.untrack_target(&TickTarget::Autosave).is_err());
    }

    #[test]
    fn test_periodic_fires_on_cadence() {
        let mut ticker = Ticker::new();
        ticker.track(TickTarget::TimePlayed, Some(0.1)).unwrap();

        let fired = drain(&mut ticker, 350);
        let times: Vec<u64> = fired.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(ticker.now_millis(), 350);

        let fired = drain(&mut ticker, 400);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_far_deadlines_saturate_instead_of_overflowing() {
        let mut ticker = Ticker::new();
        drain(&mut ticker, 100);
        let far = ticker.schedule_once(TickTarget::Autosave, 1e17);
        ticker.track(TickTarget::TimePlayed, Some(1e17)).unwrap();

        let until = ticker.deadline_after(seconds_to_millis(1e17));
        assert_eq!(until, LAST_INSTANT_MILLIS);
        assert!(drain(&mut ticker, until).is_empty());
        assert_eq!(ticker.now_millis(), LAST_INSTANT_MILLIS);
        assert!(ticker.is_tracked(far));

        let late = ticker.schedule_once(TickTarget::Autosave, 0.5);
        let until = ticker.deadline_after(1000);
        assert!(drain(&mut ticker, until).is_empty());
        assert!(ticker.is_tracked(late));
    }

    #[test]
    fn test_default_interval() {
        let mut ticker = Ticker::new();
        ticker.track(TickTarget::Autosave, None).unwrap();
        let fired = drain(&mut ticker, 100);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut ticker = Ticker::new();
        let timer = ticker.schedule_once(TickTarget::Autosave, 0.5);
        assert!(ticker.is_tracked(timer));

        let fired = drain(&mut ticker, 1000);
        assert_eq!(fired, vec![(500, TickTarget::Autosave)]);
        assert!(!ticker.is_tracked(timer));
        assert!(ticker.tracked().is_empty());
    }

    #[test]
    fn test_same_deadline_fires_in_scheduling_order() {
        let mut ticker = Ticker::new();
        ticker.schedule_once(TickTarget::Autosave, 0.2);
        ticker.schedule_once(TickTarget::TimePlayed, 0.2);

        let fired = drain(&mut ticker, 200);
        assert_eq!(
            fired,
            vec![(200, TickTarget::Autosave), (200, TickTarget::TimePlayed)]
        );
    }

    #[test]
    fn test_one_shot_delta_covers_delay() {
        let mut ticker = Ticker::new();
        ticker.schedule_once(TickTarget::Autosave, 1.5);
        let fired = ticker.pop_due(2000).unwrap();
        assert!((fired.delta - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_time_played_ignores_bad_input() {
        let mut ticker = Ticker::new();
        ticker.add_time_played(0.5);
        ticker.add_time_played(f64::NAN);
        ticker.add_time_played(-1.0);
        assert_eq!(ticker.time_played(), 0.5);

        ticker.set_time_played(f64::INFINITY);
        assert_eq!(ticker.time_played(), 0.0);
    }
}
