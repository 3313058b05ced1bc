//! Playback transport built on an external monotonic clock.
//!
//! Current time is never accumulated from frame deltas. Every `tick` derives
//! it from the clock reading and the stored epoch offset, so jitter in the
//! frame callback cannot drift the timeline away from audio.

use std::{cell::Cell, rc::Rc, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{Result, TimelineError};

/// Source of monotonically non-decreasing readings, in seconds.
pub trait MonotonicClock {
    /// One-time acquisition of the underlying clock resource.
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`]. Readings are relative to acquisition.
#[derive(Debug, Default, Clone)]
pub struct SystemClock {
    origin: Option<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MonotonicClock for SystemClock {
    fn acquire(&mut self) -> Result<()> {
        self.origin.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn now(&self) -> f64 {
        self.origin
            .map(|origin| origin.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Clock that only moves when told to. Clones share the same reading, so a
/// test (or an offline renderer) can keep a handle after giving one to the
/// engine.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    reading: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.reading.get() + seconds.max(0.0));
    }

    /// Moves the reading to `seconds`. Attempts to go backwards are ignored.
    pub fn set(&self, seconds: f64) {
        if seconds > self.reading.get() {
            self.reading.set(seconds);
        }
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> f64 {
        self.reading.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// The single source of truth for "now".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current_time_seconds: f64,
    /// Subtracted from the clock reading to obtain timeline time while playing.
    pub epoch_offset: f64,
}

/// Result of a transport command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Started { from: f64 },
    Paused { at: f64 },
    Stopped,
    /// The command was a no-op in the current state.
    Unchanged,
}

#[derive(Debug)]
pub struct PlaybackClock<C> {
    source: C,
    state: PlaybackState,
    duration_seconds: f64,
    ready: bool,
}

impl<C: MonotonicClock> PlaybackClock<C> {
    pub fn new(source: C, duration_seconds: f64) -> Self {
        Self {
            source,
            state: PlaybackState::default(),
            duration_seconds: duration_seconds.max(0.0),
            ready: false,
        }
    }

    /// Acquires the clock resource. Must succeed before [`PlaybackClock::play`]
    /// is accepted; repeated calls after success are no-ops.
    pub fn initialize(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.source.acquire().map_err(|err| match err {
            TimelineError::ResourceUnavailable(_) => err,
            other => TimelineError::ResourceUnavailable(other.to_string()),
        })?;
        self.ready = true;
        tracing::debug!("playback clock ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.state.status == PlaybackStatus::Playing
    }

    pub fn duration(&self) -> f64 {
        self.duration_seconds
    }

    /// Updates the seekable range. The current position is left alone; a
    /// position beyond the new end is clamped by the next `play` or `seek`.
    pub fn set_duration(&mut self, duration_seconds: f64) {
        self.duration_seconds = duration_seconds.max(0.0);
    }

    /// Starts playback from `from` (or the current position). Already playing
    /// is a no-op.
    pub fn play(&mut self, from: Option<f64>) -> Result<Transition> {
        if !self.ready {
            return Err(TimelineError::NotReady);
        }
        if self.is_playing() {
            return Ok(Transition::Unchanged);
        }

        let from = self.clamp(from.unwrap_or(self.state.current_time_seconds));
        self.state = PlaybackState {
            status: PlaybackStatus::Playing,
            current_time_seconds: from,
            epoch_offset: self.source.now() - from,
        };
        tracing::debug!(from, "playback clock started");
        Ok(Transition::Started { from })
    }

    /// Freezes time at the value computed by the last `tick` (or `play`/`seek`).
    /// The clock is not read again, so nothing the frame driver has not seen
    /// is skipped. Only meaningful while playing.
    pub fn pause(&mut self) -> Transition {
        if !self.is_playing() {
            return Transition::Unchanged;
        }
        let at = self.state.current_time_seconds;
        self.state.status = PlaybackStatus::Paused;
        tracing::debug!(at, "playback clock paused");
        Transition::Paused { at }
    }

    /// Returns to zero from any state.
    pub fn stop(&mut self) -> Transition {
        let previous = self.state;
        self.state = PlaybackState::default();
        if previous == self.state {
            Transition::Unchanged
        } else {
            tracing::debug!("playback clock stopped");
            Transition::Stopped
        }
    }

    /// Moves to `to_seconds`, clamped to `[0, duration]`. Returns the position
    /// actually applied.
    pub fn seek(&mut self, to_seconds: f64) -> f64 {
        let target = self.clamp(to_seconds);
        if self.is_playing() {
            self.state.epoch_offset = self.source.now() - target;
        }
        self.state.current_time_seconds = target;
        target
    }

    /// Re-derives current time from the clock while playing; otherwise returns
    /// the frozen time untouched.
    pub fn tick(&mut self) -> f64 {
        if self.is_playing() {
            let derived = self.source.now() - self.state.epoch_offset;
            // Never moves backwards while playing, even for a misbehaving source.
            self.state.current_time_seconds = derived.max(self.state.current_time_seconds);
        }
        self.state.current_time_seconds
    }

    fn clamp(&self, seconds: f64) -> f64 {
        if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.duration_seconds)
        }
    }
}
