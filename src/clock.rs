//! # Playback Clock
//!
//! Anchors real elapsed time to a position on the playback timeline.
//!
//! ## Anchors
//! Two real-clock instants are tracked:
//! - the **playback anchor**: the instant that maps to timeline zero. Elapsed timeline time is
//!   `now - playback_anchor`. `None` means playback was never started (or was rewound).
//! - the **measure anchor**: the instant the current measure visit began. The offset inside the
//!   measure is `now - measure_anchor`.
//!
//! Both are recomputed on every seek, shifted forward on resume by the time spent paused, and
//! the measure anchor is reset when the synchronization loop enters a new measure.
//!
//! ## Time Sources
//! Every operation takes `now` explicitly. Hosts read it from a [`TimeSource`]:
//! [`SystemTimeSource`] for real playback, [`ManualTimeSource`] for deterministic stepping.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::sequencer::EventStreamPlayer;

/// Millisecond clock that "now" is read from.
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Milliseconds since the source was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A settable clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Rc<Cell<f64>>,
}

impl ManualTimeSource {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: f64) {
        self.now.set(self.now.get() + delta);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Position inside the document. `measure_offset` is relative to `measure_start`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePosition {
    pub measure_index: usize,
    pub measure_start: f64,
    pub measure_offset: f64,
}

impl TimelinePosition {
    pub fn new(measure_index: usize, measure_start: f64, measure_offset: f64) -> Self {
        Self {
            measure_index,
            measure_start,
            measure_offset,
        }
    }
}

/// Transport state and clock anchors.
///
/// Owns the underlying event-stream player and keeps it in step with every transition.
pub struct PlaybackClock {
    state: PlaybackState,
    position: TimelinePosition,
    measure_anchor: f64,
    playback_anchor: Option<f64>,
    pause_instant: f64,
    player: Box<dyn EventStreamPlayer>,
}

impl fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("measure_anchor", &self.measure_anchor)
            .field("playback_anchor", &self.playback_anchor)
            .field("pause_instant", &self.pause_instant)
            .finish_non_exhaustive()
    }
}

impl PlaybackClock {
    pub fn new(player: Box<dyn EventStreamPlayer>) -> Self {
        Self {
            state: PlaybackState::Stopped,
            position: TimelinePosition::default(),
            measure_anchor: 0.0,
            playback_anchor: None,
            pause_instant: 0.0,
            player,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Instant that maps to timeline zero, `None` if never started.
    pub fn playback_anchor(&self) -> Option<f64> {
        self.playback_anchor
    }

    /// Current position. The offset advances with `now` only while playing.
    pub fn position(&self, now: f64) -> TimelinePosition {
        match self.state {
            PlaybackState::Playing => TimelinePosition {
                measure_offset: (now - self.measure_anchor).max(0.0),
                ..self.position
            },
            _ => self.position,
        }
    }

    /// Elapsed timeline time, clamped to 0.
    pub fn elapsed(&self, now: f64) -> f64 {
        match self.state {
            PlaybackState::Playing => self
                .playback_anchor
                .map_or(0.0, |anchor| (now - anchor).max(0.0)),
            _ => self.position.measure_start + self.position.measure_offset,
        }
    }

    pub fn player(&self) -> &dyn EventStreamPlayer {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> &mut dyn EventStreamPlayer {
        self.player.as_mut()
    }

    /// Absolute seek. Leaves the playback state unchanged.
    pub fn move_to(
        &mut self,
        measure_index: usize,
        measure_start: f64,
        measure_offset: f64,
        now: f64,
    ) {
        let measure_offset = measure_offset.max(0.0);
        let target = measure_start + measure_offset;

        self.position = TimelinePosition::new(measure_index, measure_start, measure_offset);
        self.measure_anchor = now - measure_offset;
        self.playback_anchor = Some(now - target);
        if self.state != PlaybackState::Playing {
            self.pause_instant = now;
        }
        self.player.seek(target);

        log::debug!(
            "Moved to measure {} (start {:.1}ms, offset {:.1}ms)",
            measure_index,
            measure_start,
            measure_offset
        );
    }

    /// Start or resume playback. Returns `false` if already playing.
    pub fn play(&mut self, now: f64) -> bool {
        if self.state == PlaybackState::Playing {
            return false;
        }

        match self.playback_anchor {
            Some(anchor) => {
                let paused_for = now - self.pause_instant;
                self.playback_anchor = Some(anchor + paused_for);
                self.measure_anchor += paused_for;
            }
            None => {
                self.playback_anchor = Some(now);
                self.measure_anchor = now;
                self.position = TimelinePosition::default();
                self.player.seek(0.0);
            }
        }

        self.player.play();
        self.state = PlaybackState::Playing;
        log::info!("Playback started at measure {}", self.position.measure_index);
        true
    }

    /// Pause playback. Returns `false` if not playing.
    pub fn pause(&mut self, now: f64) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }

        self.player.pause();
        self.position.measure_offset = (now - self.measure_anchor).max(0.0);
        self.pause_instant = now;
        self.state = PlaybackState::Paused;
        log::info!("Playback paused at measure {}", self.position.measure_index);
        true
    }

    /// Stop and return to the never-started state at measure 0.
    pub fn rewind(&mut self) {
        self.player.stop();
        self.playback_anchor = None;
        self.measure_anchor = 0.0;
        self.pause_instant = 0.0;
        self.position = TimelinePosition::default();
        self.state = PlaybackState::Stopped;
        log::info!("Playback rewound");
    }

    /// Record that a new measure visit began at `now`.
    pub(crate) fn enter_measure(&mut self, measure_index: usize, measure_start: f64, now: f64) {
        self.position.measure_index = measure_index;
        self.position.measure_start = measure_start;
        self.position.measure_offset = 0.0;
        self.measure_anchor = now;
    }
}
