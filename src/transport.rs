//! Transport commands issued from outside the player.
//!
//! Renderers (on user clicks) and shared-clock listeners run inside callbacks that cannot
//! borrow the player. They push commands onto a [`TransportHandle`] instead, and the player
//! applies them on its next `process_commands` or `on_frame`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    MoveTo {
        measure_index: usize,
        measure_start: f64,
        measure_offset: f64,
    },
    Play,
    Pause,
    Rewind,
}

/// Cloneable queue of transport commands. Clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct TransportHandle {
    queue: Rc<RefCell<VecDeque<TransportCommand>>>,
}

impl TransportHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: TransportCommand) {
        self.queue.borrow_mut().push_back(command);
    }

    pub fn move_to(&self, measure_index: usize, measure_start: f64, measure_offset: f64) {
        self.push(TransportCommand::MoveTo {
            measure_index,
            measure_start,
            measure_offset,
        });
    }

    pub fn play(&self) {
        self.push(TransportCommand::Play);
    }

    pub fn pause(&self) {
        self.push(TransportCommand::Pause);
    }

    pub fn rewind(&self) {
        self.push(TransportCommand::Rewind);
    }

    /// Remove and return everything queued so far.
    pub fn take_all(&self) -> Vec<TransportCommand> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
