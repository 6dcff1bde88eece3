//! Capabilities the player consumes from its collaborators.
//!
//! - [`Renderer`] draws the document and the playback cursor.
//! - [`Converter`] turns the document into an event stream and a timemap.
//!
//! Output sinks and shared clocks are defined next to the code that drives them
//! ([`crate::output::OutputSink`], [`crate::external::SharedClock`]).

use crate::error::PlayerError;
use crate::sequencer::EventStream;
use crate::sync::CursorPosition;
use crate::timemap::RawTimemapEntry;
use crate::transport::TransportHandle;

/// Draws the score and a cursor.
pub trait Renderer {
    /// Called once while loading. `transport` is the way back into the player, e.g. to seek
    /// when the user clicks a measure.
    fn initialize(
        &mut self,
        transport: TransportHandle,
        container: &str,
        document: &str,
    ) -> Result<(), PlayerError>;

    /// Called on every synchronization tick and every seek.
    fn move_to(&mut self, cursor: &CursorPosition);

    fn resize(&mut self);

    fn destroy(&mut self);

    fn version(&self) -> String;
}

/// Output of a [`Converter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub events: EventStream,
    /// Every visit to every measure, ascending by timestamp.
    pub timemap: Vec<RawTimemapEntry>,
}

/// Turns a document into something playable.
pub trait Converter {
    fn convert(&mut self, document: &str) -> Result<Conversion, PlayerError>;

    fn version(&self) -> String;
}
