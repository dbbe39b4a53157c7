//! zwp_relative_pointer_manager_v1
//!
//! Clients subscribe to unaccelerated motion per `wl_pointer`. Any number of
//! relative pointers may hang off one pointer.

use crate::state::CompositorState;
use log::{debug, info};
use wayland_protocols::wp::relative_pointer::zv1::server::{
    zwp_relative_pointer_manager_v1::{self, ZwpRelativePointerManagerV1},
    zwp_relative_pointer_v1::{self, ZwpRelativePointerV1},
};
use wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

pub const RELATIVE_POINTER_VERSION: u32 = 1;

pub fn create_global(dh: &DisplayHandle) -> GlobalId {
    info!(
        "Supporting zwp_relative_pointer_manager_v1 (protocol version {})",
        RELATIVE_POINTER_VERSION
    );
    dh.create_global::<CompositorState, ZwpRelativePointerManagerV1, _>(RELATIVE_POINTER_VERSION, ())
}

/// Split a microsecond timestamp into the protocol's hi/lo words
pub fn split_utime(micros: u64) -> (u32, u32) {
    ((micros >> 32) as u32, micros as u32)
}

/// Receiver of relative motion events
pub trait RelativeMotionSink {
    fn send_motion(&self, utime_hi: u32, utime_lo: u32, delta: (f64, f64), unaccel: (f64, f64));
}

impl RelativeMotionSink for ZwpRelativePointerV1 {
    fn send_motion(&self, utime_hi: u32, utime_lo: u32, delta: (f64, f64), unaccel: (f64, f64)) {
        self.relative_motion(utime_hi, utime_lo, delta.0, delta.1, unaccel.0, unaccel.1);
    }
}

/// Relative pointers keyed by the `wl_pointer` they were created for
#[derive(Debug)]
pub struct RelativePointers<K = ObjectId, R = ZwpRelativePointerV1> {
    entries: Vec<(K, R)>,
}

impl<K, R> Default for RelativePointers<K, R> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: PartialEq, R: RelativeMotionSink> RelativePointers<K, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pointer: K, relative: R) {
        self.entries.push((pointer, relative));
    }

    /// Drop relative pointers matching `predicate`, returning how many went
    pub fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&R) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|(_, r)| !predicate(r));
        before - self.entries.len()
    }

    /// The parent pointer went away; its relative pointers go inert
    pub fn pointer_released(&mut self, pointer: &K) {
        self.entries.retain(|(p, _)| p != pointer);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_for(&self, pointer: &K) -> usize {
        self.entries.iter().filter(|(p, _)| p == pointer).count()
    }

    /// Send one motion to every relative pointer of `pointers`. The seat has
    /// no acceleration, so accelerated and raw deltas are equal.
    pub fn send_relative_motion<'a, I>(&self, pointers: I, time_us: u64, delta: (f64, f64)) -> usize
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let (hi, lo) = split_utime(time_us);
        let mut sent = 0;
        for pointer in pointers {
            for (_, relative) in self.entries.iter().filter(|(p, _)| p == pointer) {
                relative.send_motion(hi, lo, delta, delta);
                sent += 1;
            }
        }
        sent
    }
}

impl GlobalDispatch<ZwpRelativePointerManagerV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwpRelativePointerManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

impl Dispatch<ZwpRelativePointerManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwpRelativePointerManagerV1,
        request: zwp_relative_pointer_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwp_relative_pointer_manager_v1::Request::GetRelativePointer { id, pointer } => {
                let relative = data_init.init(id, ());
                debug!("Relative pointer {} for {}", relative.id(), pointer.id());
                state.relative_pointers.add(pointer.id(), relative);
            }
            zwp_relative_pointer_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<ZwpRelativePointerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwpRelativePointerV1,
        request: zwp_relative_pointer_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_relative_pointer_v1::Request::Destroy = request {
            state
                .relative_pointers
                .remove_where(|r| r.id() == resource.id());
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &ZwpRelativePointerV1, _data: &()) {
        state
            .relative_pointers
            .remove_where(|r| r.id() == resource.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Events = Rc<RefCell<Vec<(u32, u32, f64, f64)>>>;

    struct Recorder {
        tag: u32,
        events: Events,
    }

    impl RelativeMotionSink for Recorder {
        fn send_motion(&self, hi: u32, lo: u32, delta: (f64, f64), unaccel: (f64, f64)) {
            assert_eq!(delta, unaccel);
            self.events.borrow_mut().push((hi, lo, delta.0, delta.1));
        }
    }

    #[test]
    fn test_split_utime() {
        assert_eq!(split_utime(0x1_0000_0002), (1, 2));
        assert_eq!(split_utime(42), (0, 42));
    }

    #[test]
    fn test_motion_reaches_every_subscription_of_pointer() {
        let events: Events = Rc::default();
        let mut pointers: RelativePointers<u32, Recorder> = RelativePointers::new();
        pointers.add(1, Recorder { tag: 10, events: events.clone() });
        pointers.add(1, Recorder { tag: 11, events: events.clone() });
        pointers.add(2, Recorder { tag: 20, events: events.clone() });

        let sent = pointers.send_relative_motion(&[1], 5_000_000, (3.0, -2.0));
        assert_eq!(sent, 2);
        assert_eq!(events.borrow().len(), 2);
        assert_eq!(events.borrow()[0], (0, 5_000_000, 3.0, -2.0));

        assert_eq!(pointers.send_relative_motion(&[1, 2], 1, (1.0, 1.0)), 3);
    }

    #[test]
    fn test_release_and_destroy() {
        let events: Events = Rc::default();
        let mut pointers: RelativePointers<u32, Recorder> = RelativePointers::new();
        pointers.add(1, Recorder { tag: 10, events: events.clone() });
        pointers.add(1, Recorder { tag: 11, events: events.clone() });
        pointers.add(2, Recorder { tag: 20, events: events.clone() });

        assert_eq!(pointers.remove_where(|r| r.tag == 11), 1);
        assert_eq!(pointers.count_for(&1), 1);

        pointers.pointer_released(&1);
        assert_eq!(pointers.count_for(&1), 0);
        assert_eq!(pointers.len(), 1);
        assert_eq!(pointers.send_relative_motion(&[1], 0, (1.0, 0.0)), 0);
        assert!(events.borrow().is_empty());
    }
}
