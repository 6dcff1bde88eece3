//! # Synchronization Loop
//!
//! Per-frame reconciliation of the playback clock with the timemap.
//!
//! ## Each Tick
//! 1. Elapsed timeline time is read from the clock (`now - playback_anchor`, clamped to 0).
//! 2. The raw timemap is floor-searched for the visit containing that time.
//! 3. If the visit belongs to a different measure than the one being tracked, the clock's
//!    measure anchor is reset to `now`, so the offset restarts at 0.
//! 4. The offset is `now - measure_anchor`.
//! 5. The cursor position (with the canonical start and duration from the index) is returned
//!    for the renderer, and the sequencer is advanced to the elapsed time.
//! 6. The task reschedules itself.
//!
//! Measure identity is re-derived from the raw timemap on every tick rather than incremented,
//! which is what keeps repeats and jumps correct.
//!
//! ## Cancellation
//! The loop is a [`FrameTask`] that is either scheduled or not. Every tick first consumes the
//! schedule, then checks the clock: if playback is no longer running the tick does nothing and
//! does not reschedule. So after a pause or rewind at most one stray no-op tick runs.

use serde::{Deserialize, Serialize};

use crate::clock::PlaybackClock;
use crate::timemap::Timeline;

#[cfg(test)]
mod tests;

/// What the renderer is told on every tick and seek.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub measure_index: usize,
    pub measure_start: f64,
    pub measure_offset: f64,
    pub measure_duration: f64,
}

/// A frame callback that is either pending or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTask {
    scheduled: bool,
}

impl FrameTask {
    pub fn schedule(&mut self) {
        self.scheduled = true;
    }

    pub fn cancel(&mut self) {
        self.scheduled = false;
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Consume the pending schedule. Returns whether the frame should run.
    fn take(&mut self) -> bool {
        std::mem::take(&mut self.scheduled)
    }
}

#[derive(Debug, Default)]
pub struct SyncLoop {
    task: FrameTask,
    ticks: u64,
}

impl SyncLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.task.schedule();
    }

    /// Drop the pending frame so no further tick runs, stray or not.
    pub fn stop(&mut self) {
        self.task.cancel();
    }

    pub fn is_scheduled(&self) -> bool {
        self.task.is_scheduled()
    }

    /// Ticks that produced a cursor position.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one frame. Returns the cursor position when the tick did work.
    pub fn tick(
        &mut self,
        clock: &mut PlaybackClock,
        timeline: &Timeline,
        now: f64,
    ) -> Option<CursorPosition> {
        if !self.task.take() {
            return None;
        }
        if !clock.is_playing() {
            log::trace!("Sync loop stopped");
            return None;
        }

        let elapsed = clock.elapsed(now);
        let location = timeline.locate(elapsed);
        if location.measure != clock.position(now).measure_index {
            match timeline.measure(location.measure) {
                Some(record) => {
                    log::debug!(
                        "Entering measure {} at {:.1}ms",
                        record.measure_index,
                        elapsed
                    );
                    clock.enter_measure(record.measure_index, record.start, now);
                }
                None => log::warn!("Measure {} missing from timemap index", location.measure),
            }
        }

        let position = clock.position(now);
        let measure_duration = timeline
            .measure(position.measure_index)
            .map_or(0.0, |record| record.duration);
        clock.player_mut().advance(elapsed, now);

        self.task.schedule();
        self.ticks += 1;

        Some(CursorPosition {
            measure_index: position.measure_index,
            measure_start: position.measure_start,
            measure_offset: position.measure_offset,
            measure_duration,
        })
    }
}
