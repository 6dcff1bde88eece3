//! # Player
//!
//! The top-level transport object. A [`Player`] owns every piece of mutable playback state
//! (clock anchors, the synchronization loop, the sequencer) together with its collaborators,
//! and tears all of it down on [`Player::destroy`] or drop.
//!
//! ## Loading
//! [`PlayerBuilder::load`] runs in this order and stops at the first failure, so a failed
//! load never leaves a renderer or listener behind:
//! 1. check that a container was given
//! 2. read the document (title, measure count)
//! 3. unroll repeats if asked to; a failed unroll falls back to the original document
//! 4. convert the document into an event stream and a timemap
//! 5. build the timeline from the timemap
//! 6. initialize the renderer
//! 7. attach the shared clock, if any
//!
//! ## Driving
//! The host calls [`Player::on_frame`] once per display refresh. It applies queued transport
//! commands, fires a pending resize, and runs one synchronization tick.
//!
//! ```rust,no_run
//! # use score_sync::{Player, PlayerOptions, Renderer, Converter};
//! # fn host(renderer: Box<dyn Renderer>, converter: Box<dyn Converter>, xml: String)
//! #     -> Result<(), score_sync::PlayerError> {
//! let mut player = Player::builder(xml)
//!     .options(PlayerOptions::default().with_container("sheet"))
//!     .renderer(renderer)
//!     .converter(converter)
//!     .load()?;
//!
//! player.play();
//! loop {
//!     if player.on_frame().is_none() && !player.is_running() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::clock::{
    PlaybackClock, PlaybackState, SystemTimeSource, TimeSource, TimelinePosition,
};
use crate::collaborators::{Converter, Renderer};
use crate::config::PlayerOptions;
use crate::debounce::Debouncer;
use crate::document::{self, ScoreDocument};
use crate::error::PlayerError;
use crate::external::{ExternalClockAdapter, SharedClock};
use crate::output::{OutputEventRouter, OutputSink, SynthSink};
use crate::sequencer::Sequencer;
use crate::sync::{CursorPosition, SyncLoop};
use crate::timemap::Timeline;
use crate::transport::{TransportCommand, TransportHandle};

/// Version identifiers of the player and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    pub player: String,
    pub renderer: String,
    pub converter: String,
}

fn initialization_failure(reason: impl fmt::Display) -> PlayerError {
    log::error!("Player initialization failed: {}", reason);
    PlayerError::InitializationFailure(reason.to_string())
}

/// Collects the document, options and collaborators for [`PlayerBuilder::load`].
pub struct PlayerBuilder {
    document: String,
    options: PlayerOptions,
    renderer: Option<Box<dyn Renderer>>,
    converter: Option<Box<dyn Converter>>,
    output: Option<Box<dyn OutputSink>>,
    shared_clock: Option<Rc<dyn SharedClock>>,
    time: Option<Box<dyn TimeSource>>,
}

impl fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("options", &self.options)
            .field("renderer", &self.renderer.is_some())
            .field("converter", &self.converter.is_some())
            .field("output", &self.output.is_some())
            .field("shared_clock", &self.shared_clock.is_some())
            .finish_non_exhaustive()
    }
}

impl PlayerBuilder {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            options: PlayerOptions::default(),
            renderer: None,
            converter: None,
            output: None,
            shared_clock: None,
            time: None,
        }
    }

    pub fn options(mut self, options: PlayerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn converter(mut self, converter: Box<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Output sink for the sequencer. Defaults to [`SynthSink`].
    pub fn output(mut self, output: Box<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn shared_clock(mut self, clock: Rc<dyn SharedClock>) -> Self {
        self.shared_clock = Some(clock);
        self
    }

    /// Where "now" is read from. Defaults to [`SystemTimeSource`].
    pub fn time_source(mut self, time: Box<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn load(self) -> Result<Player, PlayerError> {
        let PlayerBuilder {
            document,
            options,
            renderer,
            converter,
            output,
            shared_clock,
            time,
        } = self;

        let container = options
            .container
            .clone()
            .ok_or_else(|| initialization_failure("no container given"))?;
        let mut renderer = renderer.ok_or_else(|| initialization_failure("no renderer given"))?;
        let mut converter =
            converter.ok_or_else(|| initialization_failure("no converter given"))?;

        let parsed = ScoreDocument::parse(&document).map_err(initialization_failure)?;

        let unrolled = if options.unroll {
            match document::unroll(&document) {
                Ok(unrolled) => Some(unrolled.into_owned()),
                Err(e) => {
                    log::warn!("{}; playing the document as written", e);
                    None
                }
            }
        } else {
            None
        };
        let document = unrolled.unwrap_or(document);

        let conversion = converter
            .convert(&document)
            .map_err(|e| initialization_failure(format!("conversion failed: {}", e)))?;
        let timeline = Timeline::new(conversion.timemap, options.epsilon_ms).map_err(|e| {
            log::error!("Player initialization failed: {}", e);
            e
        })?;

        let transport = TransportHandle::new();
        renderer
            .initialize(transport.clone(), &container, &document)
            .map_err(|e| initialization_failure(format!("renderer failed: {}", e)))?;

        let output = output.unwrap_or_else(|| Box::new(SynthSink::new()));
        let event_count = conversion.events.len();
        let sequencer = Sequencer::new(
            conversion.events,
            OutputEventRouter::new(output, options.mute),
            options.lookahead_ms,
        );

        let mut external = ExternalClockAdapter::new();
        external.attach(shared_clock, &transport);

        let title = options
            .title
            .clone()
            .or(parsed.title)
            .unwrap_or_default();

        log::info!(
            "Loaded '{}': {} measures, {} timemap entries, {} events",
            title,
            timeline.index().len(),
            timeline.raw().len(),
            event_count
        );

        Ok(Player {
            resize: Debouncer::new(options.resize_debounce_ms),
            options,
            title,
            document,
            timeline,
            clock: PlaybackClock::new(Box::new(sequencer)),
            sync: SyncLoop::new(),
            renderer,
            converter,
            external,
            transport,
            time: time.unwrap_or_else(|| Box::new(SystemTimeSource::new())),
            destroyed: false,
        })
    }
}

pub struct Player {
    options: PlayerOptions,
    title: String,
    document: String,
    timeline: Timeline,
    clock: PlaybackClock,
    sync: SyncLoop,
    renderer: Box<dyn Renderer>,
    converter: Box<dyn Converter>,
    external: ExternalClockAdapter,
    transport: TransportHandle,
    resize: Debouncer,
    time: Box<dyn TimeSource>,
    destroyed: bool,
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("title", &self.title)
            .field("clock", &self.clock)
            .field("sync", &self.sync)
            .field("external", &self.external)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl Player {
    pub fn builder(document: impl Into<String>) -> PlayerBuilder {
        PlayerBuilder::new(document)
    }

    fn now(&self) -> f64 {
        self.time.now()
    }

    fn is_live(&self, operation: &str) -> bool {
        if self.destroyed {
            log::warn!("Ignoring {} on a destroyed player", operation);
        }
        !self.destroyed
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The document handed to the renderer and converter, unrolled or not.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    /// Whether a synchronization tick is scheduled for the next frame.
    pub fn is_running(&self) -> bool {
        self.sync.is_scheduled()
    }

    /// A handle for issuing transport commands from callbacks.
    pub fn transport(&self) -> TransportHandle {
        self.transport.clone()
    }

    pub fn position(&self) -> Result<TimelinePosition, PlayerError> {
        if self.destroyed {
            return Err(PlayerError::UninitializedAccess("position"));
        }
        Ok(self.clock.position(self.now()))
    }

    pub fn versions(&self) -> Result<Versions, PlayerError> {
        if self.destroyed {
            return Err(PlayerError::UninitializedAccess("versions"));
        }
        Ok(Versions {
            player: env!("CARGO_PKG_VERSION").to_string(),
            renderer: self.renderer.version(),
            converter: self.converter.version(),
        })
    }

    pub fn is_muted(&self) -> bool {
        self.clock.player().is_muted()
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.clock.player_mut().set_muted(mute);
        log::debug!("Output {}", if mute { "muted" } else { "unmuted" });
    }

    /// Replace the shared clock driving the transport. `None` detaches.
    pub fn set_shared_clock(&mut self, clock: Option<Rc<dyn SharedClock>>) {
        if self.is_live("set_shared_clock") {
            self.external.attach(clock, &self.transport);
        }
    }

    pub fn play(&mut self) {
        if !self.is_live("play") {
            return;
        }
        let now = self.now();
        if self.clock.play(now) {
            self.sync.start();
        }
    }

    pub fn pause(&mut self) {
        if self.is_live("pause") {
            let now = self.now();
            self.clock.pause(now);
        }
    }

    pub fn rewind(&mut self) {
        if !self.is_live("rewind") {
            return;
        }
        self.clock.rewind();
        let start = self.timeline.measure(0).map_or(0.0, |record| record.start);
        let cursor = self.cursor(0, start, 0.0);
        self.renderer.move_to(&cursor);
    }

    pub fn move_to(&mut self, measure_index: usize, measure_start: f64, measure_offset: f64) {
        if !self.is_live("move_to") {
            return;
        }
        let now = self.now();
        self.clock
            .move_to(measure_index, measure_start, measure_offset, now);
        let position = self.clock.position(now);
        let cursor = self.cursor(
            position.measure_index,
            position.measure_start,
            position.measure_offset,
        );
        self.renderer.move_to(&cursor);
    }

    fn cursor(
        &self,
        measure_index: usize,
        measure_start: f64,
        measure_offset: f64,
    ) -> CursorPosition {
        CursorPosition {
            measure_index,
            measure_start,
            measure_offset,
            measure_duration: self
                .timeline
                .measure(measure_index)
                .map_or(0.0, |record| record.duration),
        }
    }

    /// Request a redraw. Requests are debounced.
    pub fn resize(&mut self) {
        let now = self.now();
        self.resize.request(now);
    }

    /// Apply the transport commands queued so far. Commands queued while these are being
    /// applied wait for the next call. Returns how many were applied.
    pub fn process_commands(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        let commands = self.transport.take_all();
        for command in &commands {
            log::trace!("Applying {:?}", command);
            match *command {
                TransportCommand::MoveTo {
                    measure_index,
                    measure_start,
                    measure_offset,
                } => self.move_to(measure_index, measure_start, measure_offset),
                TransportCommand::Play => self.play(),
                TransportCommand::Pause => self.pause(),
                TransportCommand::Rewind => self.rewind(),
            }
        }
        commands.len()
    }

    /// One display frame. Returns the cursor position pushed to the renderer, if any.
    pub fn on_frame(&mut self) -> Option<CursorPosition> {
        if self.destroyed {
            return None;
        }
        self.process_commands();

        let now = self.now();
        if self.resize.poll(now) {
            log::debug!("Resizing renderer");
            self.renderer.resize();
        }

        let cursor = self.sync.tick(&mut self.clock, &self.timeline, now)?;
        self.renderer.move_to(&cursor);
        Some(cursor)
    }

    /// Detach the shared clock, stop output and destroy the renderer. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.external.detach();
        self.sync.stop();
        self.clock.rewind();
        self.transport.take_all();
        self.renderer.destroy();
        self.destroyed = true;
        log::info!("Destroyed player for '{}'", self.title);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}
