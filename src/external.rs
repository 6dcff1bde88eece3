//! # External Clock
//!
//! Lets a shared clock owned by someone else drive the transport.
//!
//! A shared clock reports a `{position, velocity}` vector and notifies listeners when it
//! changes. Each notification is mapped to a transport command:
//!
//! | velocity | position | command  |
//! |----------|----------|----------|
//! | 0        | 0        | rewind   |
//! | 0        | != 0     | pause    |
//! | != 0     | any      | play     |
//!
//! Commands go through the player's [`TransportHandle`], so a notification fired while the
//! player is busy never re-enters it. The transport never writes back to the shared clock and
//! play/pause/rewind are idempotent, so redundant notifications are harmless.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::transport::{TransportCommand, TransportHandle};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExternalVector {
    pub position: f64,
    pub velocity: f64,
}

impl ExternalVector {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ChangeListener = Box<dyn FnMut()>;

/// A clock shared between independent players.
pub trait SharedClock {
    fn query(&self) -> ExternalVector;

    /// Register a change listener.
    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    fn remove_change_listener(&self, id: ListenerId);
}

/// Transport command for a shared clock vector.
pub fn command_for_vector(vector: ExternalVector) -> TransportCommand {
    if vector.velocity != 0.0 {
        TransportCommand::Play
    } else if vector.position == 0.0 {
        TransportCommand::Rewind
    } else {
        TransportCommand::Pause
    }
}

/// In-process shared clock.
///
/// Listeners added while a notification is running are first called on the next one. A
/// listener removed during a notification is not called again. An `update` made from inside a
/// listener is delivered once the current round of notifications finishes.
#[derive(Default)]
pub struct TimingObject {
    vector: Cell<ExternalVector>,
    listeners: RefCell<Vec<(ListenerId, ChangeListener)>>,
    removed: RefCell<Vec<ListenerId>>,
    next_id: Cell<u64>,
    dispatching: Cell<bool>,
    renotify: Cell<bool>,
}

impl fmt::Debug for TimingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingObject")
            .field("vector", &self.vector.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl TimingObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new vector and notify every listener.
    pub fn update(&self, vector: ExternalVector) {
        self.vector.set(vector);
        self.notify();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn notify(&self) {
        if self.dispatching.get() {
            self.renotify.set(true);
            return;
        }

        self.dispatching.set(true);
        loop {
            let mut current = std::mem::take(&mut *self.listeners.borrow_mut());
            for (id, listener) in current.iter_mut() {
                if self.removed.borrow().contains(id) {
                    continue;
                }
                listener();
            }

            let mut listeners = self.listeners.borrow_mut();
            current.append(&mut listeners);
            *listeners = current;
            drop(listeners);

            if !self.renotify.replace(false) {
                break;
            }
        }
        self.dispatching.set(false);

        let removed = std::mem::take(&mut *self.removed.borrow_mut());
        self.listeners
            .borrow_mut()
            .retain(|(id, _)| !removed.contains(id));
    }
}

impl SharedClock for TimingObject {
    fn query(&self) -> ExternalVector {
        self.vector.get()
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_change_listener(&self, id: ListenerId) {
        if self.dispatching.get() {
            self.removed.borrow_mut().push(id);
        }
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
    }
}

struct Attachment {
    clock: Rc<dyn SharedClock>,
    listener: ListenerId,
}

/// Keeps at most one listener registered on a shared clock.
#[derive(Default)]
pub struct ExternalClockAdapter {
    attached: Option<Attachment>,
}

impl fmt::Debug for ExternalClockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalClockAdapter")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ExternalClockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Replace the attached clock. The previous listener is removed first; `None` only detaches.
    pub fn attach(&mut self, clock: Option<Rc<dyn SharedClock>>, transport: &TransportHandle) {
        self.detach();

        let Some(clock) = clock else {
            return;
        };

        let source = Rc::downgrade(&clock);
        let transport = transport.clone();
        let listener = clock.add_change_listener(Box::new(move || {
            if let Some(clock) = source.upgrade() {
                let vector = clock.query();
                let command = command_for_vector(vector);
                log::debug!(
                    "Shared clock changed to position {} velocity {}: {:?}",
                    vector.position,
                    vector.velocity,
                    command
                );
                transport.push(command);
            }
        }));

        log::info!("Attached shared clock");
        self.attached = Some(Attachment { clock, listener });
    }

    pub fn detach(&mut self) {
        if let Some(attachment) = self.attached.take() {
            attachment.clock.remove_change_listener(attachment.listener);
            log::info!("Detached shared clock");
        }
    }
}

impl Drop for ExternalClockAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_mapping() {
        assert_eq!(
            command_for_vector(ExternalVector::new(0.0, 0.0)),
            TransportCommand::Rewind
        );
        assert_eq!(
            command_for_vector(ExternalVector::new(12.5, 0.0)),
            TransportCommand::Pause
        );
        assert_eq!(
            command_for_vector(ExternalVector::new(0.0, 1.0)),
            TransportCommand::Play
        );
        assert_eq!(
            command_for_vector(ExternalVector::new(40.0, -1.0)),
            TransportCommand::Play
        );
    }

    #[test]
    fn test_notifications_become_commands() {
        let clock = Rc::new(TimingObject::new());
        let transport = TransportHandle::new();
        let mut adapter = ExternalClockAdapter::new();
        adapter.attach(Some(clock.clone() as Rc<dyn SharedClock>), &transport);

        clock.update(ExternalVector::new(0.0, 1.0));
        clock.update(ExternalVector::new(3.0, 0.0));
        clock.update(ExternalVector::new(0.0, 0.0));

        assert_eq!(
            transport.take_all(),
            vec![
                TransportCommand::Play,
                TransportCommand::Pause,
                TransportCommand::Rewind
            ]
        );
    }

    #[test]
    fn test_reattach_does_not_duplicate_listeners() {
        let clock = Rc::new(TimingObject::new());
        let transport = TransportHandle::new();
        let mut adapter = ExternalClockAdapter::new();

        adapter.attach(Some(clock.clone() as Rc<dyn SharedClock>), &transport);
        adapter.attach(Some(clock.clone() as Rc<dyn SharedClock>), &transport);
        assert_eq!(clock.listener_count(), 1);

        clock.update(ExternalVector::new(0.0, 1.0));
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_detach_with_none() {
        let clock = Rc::new(TimingObject::new());
        let transport = TransportHandle::new();
        let mut adapter = ExternalClockAdapter::new();
        adapter.attach(Some(clock.clone() as Rc<dyn SharedClock>), &transport);
        adapter.attach(None, &transport);

        assert!(!adapter.is_attached());
        assert_eq!(clock.listener_count(), 0);
        clock.update(ExternalVector::new(0.0, 1.0));
        assert!(transport.is_empty());
    }

    #[test]
    fn test_drop_unregisters() {
        let clock = Rc::new(TimingObject::new());
        {
            let mut adapter = ExternalClockAdapter::new();
            adapter.attach(
                Some(clock.clone() as Rc<dyn SharedClock>),
                &TransportHandle::new(),
            );
            assert_eq!(clock.listener_count(), 1);
        }
        assert_eq!(clock.listener_count(), 0);
    }

    #[test]
    fn test_listener_removed_during_notification() {
        let clock = Rc::new(TimingObject::new());
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&clock);
        let listener_id = Rc::clone(&own_id);
        let listener_calls = Rc::clone(&calls);
        let id = clock.add_change_listener(Box::new(move || {
            listener_calls.set(listener_calls.get() + 1);
            if let (Some(clock), Some(id)) = (weak.upgrade(), listener_id.get()) {
                clock.remove_change_listener(id);
            }
        }));
        own_id.set(Some(id));

        clock.update(ExternalVector::new(0.0, 1.0));
        clock.update(ExternalVector::new(0.0, 0.0));
        assert_eq!(calls.get(), 1);
        assert_eq!(clock.listener_count(), 0);
    }

    #[test]
    fn test_update_from_listener_keeps_removals() {
        let clock = Rc::new(TimingObject::new());
        let removed_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let leader_calls = Rc::new(Cell::new(0));
        let follower_calls = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&clock);
        let target = Rc::clone(&removed_id);
        let calls = Rc::clone(&leader_calls);
        clock.add_change_listener(Box::new(move || {
            calls.set(calls.get() + 1);
            let Some(clock) = weak.upgrade() else {
                return;
            };
            if let Some(id) = target.take() {
                clock.remove_change_listener(id);
                clock.update(ExternalVector::new(7.0, 0.0));
            }
        }));

        let calls = Rc::clone(&follower_calls);
        let follower = clock.add_change_listener(Box::new(move || calls.set(calls.get() + 1)));
        removed_id.set(Some(follower));

        clock.update(ExternalVector::new(0.0, 1.0));
        assert_eq!(leader_calls.get(), 2);
        assert_eq!(follower_calls.get(), 0);
        assert_eq!(clock.listener_count(), 1);
        assert_eq!(clock.query(), ExternalVector::new(7.0, 0.0));

        clock.update(ExternalVector::new(0.0, 0.0));
        assert_eq!(leader_calls.get(), 3);
        assert_eq!(follower_calls.get(), 0);
    }

    #[test]
    fn test_update_from_listener_reaches_adapter() {
        let clock = Rc::new(TimingObject::new());
        let transport = TransportHandle::new();
        let mut adapter = ExternalClockAdapter::new();

        let weak = Rc::downgrade(&clock);
        let nested = Rc::new(Cell::new(false));
        let once = Rc::clone(&nested);
        clock.add_change_listener(Box::new(move || {
            if let (Some(clock), false) = (weak.upgrade(), once.replace(true)) {
                clock.update(ExternalVector::new(0.0, 0.0));
            }
        }));
        adapter.attach(Some(clock.clone() as Rc<dyn SharedClock>), &transport);

        clock.update(ExternalVector::new(0.0, 1.0));
        assert_eq!(
            transport.take_all(),
            vec![TransportCommand::Rewind, TransportCommand::Rewind]
        );
    }
}
