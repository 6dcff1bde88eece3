//! # Output Routing
//!
//! Sits between the sequencer and the output sink.
//!
//! Buffers are read as consecutive 3-byte units. Each unit is classified by its status byte:
//! - `0x80..=0xEF` - channel message (note on/off, control change, ...), forwarded to the sink
//! - `0xF0..=0xFF` - system/meta message (tempo, markers, ...), consumed here
//! - anything else - no status byte, dropped
//!
//! Muting suppresses everything reaching the sink. The sequencer still tracks note state
//! from the full stream, so unmuting mid-piece does not leave it confused.

use std::collections::BTreeSet;
use std::fmt;

/// Size of one message unit in an output buffer.
pub const EVENT_SIZE: usize = 3;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const ALL_SOUND_OFF: u8 = 120;
const ALL_NOTES_OFF: u8 = 123;

/// Destination for channel messages.
pub trait OutputSink {
    /// Deliver one channel message at a real-clock timestamp in milliseconds.
    fn send(&mut self, data: &[u8], timestamp: f64);

    /// Cancel scheduled output and release anything still sounding.
    fn clear(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Channel,
    NonChannel,
    Malformed,
}

pub fn classify(status: u8) -> EventClass {
    match status {
        0x80..=0xEF => EventClass::Channel,
        0xF0..=0xFF => EventClass::NonChannel,
        _ => EventClass::Malformed,
    }
}

/// Forwards channel messages to a sink, honoring the mute flag.
pub struct OutputEventRouter {
    sink: Box<dyn OutputSink>,
    muted: bool,
    pending: Vec<f64>,
}

impl fmt::Debug for OutputEventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputEventRouter")
            .field("muted", &self.muted)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl OutputEventRouter {
    pub fn new(sink: Box<dyn OutputSink>, muted: bool) -> Self {
        Self {
            sink,
            muted,
            pending: Vec::new(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Route every unit in `data`. Returns how many reached the sink.
    pub fn send(&mut self, data: &[u8], timestamp: f64) -> usize {
        let mut forwarded = 0;
        for unit in data.chunks(EVENT_SIZE) {
            match classify(unit[0]) {
                EventClass::Channel => {
                    if !self.muted {
                        self.sink.send(unit, timestamp);
                        self.pending.push(timestamp);
                        forwarded += 1;
                    }
                }
                EventClass::NonChannel => {}
                EventClass::Malformed => {
                    log::debug!("Dropping output unit without status byte: {:02x?}", unit);
                }
            }
        }
        forwarded
    }

    /// Forget forwarded events whose timestamp has passed.
    pub fn retire(&mut self, now: f64) {
        self.pending.retain(|&timestamp| timestamp > now);
    }

    /// Events forwarded to the sink that are still scheduled in the future.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.sink.clear();
        self.pending.clear();
    }
}

/// Tracks which (channel, key) pairs are sounding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteTracker {
    sounding: BTreeSet<(u8, u8)>,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from every unit in a buffer.
    pub fn observe(&mut self, data: &[u8]) {
        for unit in data.chunks(EVENT_SIZE) {
            self.observe_unit(unit);
        }
    }

    fn observe_unit(&mut self, unit: &[u8]) {
        let (status, key, value) = match *unit {
            [status, key, value] => (status, key, value),
            _ => return,
        };
        let channel = status & 0x0F;
        match status & 0xF0 {
            NOTE_ON if value > 0 => {
                self.sounding.insert((channel, key));
            }
            NOTE_ON | NOTE_OFF => {
                self.sounding.remove(&(channel, key));
            }
            CONTROL_CHANGE if key == ALL_NOTES_OFF || key == ALL_SOUND_OFF => {
                self.sounding.retain(|&(c, _)| c != channel);
            }
            _ => {}
        }
    }

    pub fn is_sounding(&self, channel: u8, key: u8) -> bool {
        self.sounding.contains(&(channel, key))
    }

    pub fn len(&self) -> usize {
        self.sounding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounding.is_empty()
    }

    /// Release every note; returns how many were sounding.
    pub fn release_all(&mut self) -> usize {
        let released = self.sounding.len();
        self.sounding.clear();
        released
    }
}

/// Built-in default sink: a voice tracker standing in for a synthesizer.
#[derive(Debug, Default)]
pub struct SynthSink {
    voices: NoteTracker,
    received: usize,
}

impl SynthSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voices(&self) -> &NoteTracker {
        &self.voices
    }

    pub fn received(&self) -> usize {
        self.received
    }
}

impl OutputSink for SynthSink {
    fn send(&mut self, data: &[u8], _timestamp: f64) {
        self.voices.observe(data);
        self.received += 1;
    }

    fn clear(&mut self) {
        let released = self.voices.release_all();
        if released > 0 {
            log::debug!("Released {} sounding voices", released);
        }
    }
}
