//! Synchronizes a rendered score with MIDI playback.
//!
//! A converter turns a MusicXML document into an event stream and a timemap (when each
//! visit to each measure happens). While playing, a frame-driven loop maps elapsed time
//! onto the timemap and moves the renderer's cursor, while a sequencer routes the event
//! stream to an output sink. Playback can also be driven by a shared clock so that several
//! players stay together.
//!
//! [`Player`] ties the pieces together; the modules can also be used on their own.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod debounce;
pub mod document;
pub mod error;
pub mod external;
pub mod output;
pub mod player;
pub mod sequencer;
pub mod sync;
pub mod timemap;
pub mod transport;

pub use clock::{
    ManualTimeSource, PlaybackClock, PlaybackState, SystemTimeSource, TimeSource,
    TimelinePosition,
};
pub use collaborators::{Conversion, Converter, Renderer};
pub use config::PlayerOptions;
pub use document::{unroll, ScoreDocument};
pub use error::*;
pub use external::{ExternalClockAdapter, ExternalVector, SharedClock, TimingObject};
pub use output::{OutputEventRouter, OutputSink, SynthSink};
pub use player::{Player, PlayerBuilder, Versions};
pub use sequencer::{EventStream, EventStreamPlayer, Sequencer, TimedEvent};
pub use sync::{CursorPosition, SyncLoop};
pub use timemap::{MeasureRecord, RawTimemapEntry, Timeline, TimemapIndex};
pub use transport::{TransportCommand, TransportHandle};
