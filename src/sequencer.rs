//! # Sequencer
//!
//! The event-stream player that drives output during playback.
//!
//! The playback clock tells it where the timeline is (`seek`, `advance`) and whether it should
//! be running (`play`, `pause`, `stop`). On every advance it dispatches the events that fall
//! inside the lookahead window, stamping each with the real-clock instant it is due at.

use serde::{Deserialize, Serialize};

use crate::clock::PlaybackState;
use crate::output::{NoteTracker, OutputEventRouter};

/// One output buffer due at `time` milliseconds into the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEvent {
    pub time: f64,
    pub data: Vec<u8>,
}

impl TimedEvent {
    pub fn new(time: f64, data: Vec<u8>) -> Self {
        Self { time, data }
    }
}

/// Time-ordered output events for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    events: Vec<TimedEvent>,
}

impl EventStream {
    /// Build a stream, sorting events by time. Events at the same time keep their order.
    pub fn new(mut events: Vec<TimedEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { events }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the last event.
    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |event| event.time)
    }
}

/// Player for a timed event stream, controlled by the playback clock.
pub trait EventStreamPlayer {
    fn state(&self) -> PlaybackState;

    /// Timeline position of the last seek or advance.
    fn position(&self) -> f64;

    /// Start, or continue from the current position.
    fn play(&mut self);

    fn pause(&mut self);

    /// Stop and return to the start.
    fn stop(&mut self);

    fn seek(&mut self, position: f64);

    /// Dispatch events up to `position` (plus lookahead). Returns how many were dispatched.
    fn advance(&mut self, position: f64, now: f64) -> usize;

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);
}

#[derive(Debug)]
pub struct Sequencer {
    stream: EventStream,
    cursor: usize,
    position: f64,
    state: PlaybackState,
    lookahead: f64,
    router: OutputEventRouter,
    notes: NoteTracker,
}

impl Sequencer {
    pub fn new(stream: EventStream, router: OutputEventRouter, lookahead: f64) -> Self {
        Self {
            stream,
            cursor: 0,
            position: 0.0,
            state: PlaybackState::Stopped,
            lookahead: lookahead.max(0.0),
            router,
            notes: NoteTracker::new(),
        }
    }

    /// Notes sounding according to the dispatched stream, muted or not.
    pub fn notes(&self) -> &NoteTracker {
        &self.notes
    }

    pub fn router(&self) -> &OutputEventRouter {
        &self.router
    }

    fn release(&mut self) {
        self.router.clear();
        self.notes.release_all();
    }
}

impl EventStreamPlayer for Sequencer {
    fn state(&self) -> PlaybackState {
        self.state
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn play(&mut self) {
        self.state = PlaybackState::Playing;
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            self.release();
        }
    }

    fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.cursor = 0;
        self.position = 0.0;
        self.release();
    }

    fn seek(&mut self, position: f64) {
        let position = position.max(0.0);
        self.cursor = self
            .stream
            .events
            .partition_point(|event| event.time < position);
        self.position = position;
        self.release();
    }

    fn advance(&mut self, position: f64, now: f64) -> usize {
        if self.state != PlaybackState::Playing {
            return 0;
        }

        self.position = position;
        let horizon = position + self.lookahead;
        let mut dispatched = 0;
        while let Some(event) = self.stream.events.get(self.cursor) {
            if event.time > horizon {
                break;
            }
            self.notes.observe(&event.data);
            self.router
                .send(&event.data, now + (event.time - position).max(0.0));
            self.cursor += 1;
            dispatched += 1;
        }
        self.router.retire(now);
        dispatched
    }

    fn is_muted(&self) -> bool {
        self.router.is_muted()
    }

    fn set_muted(&mut self, muted: bool) {
        self.router.set_muted(muted);
    }
}
