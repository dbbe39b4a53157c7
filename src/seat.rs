//! The single compositor seat
//!
//! Exposes `wl_seat` with pointer and keyboard capabilities. Pointer objects
//! are tracked so relative-pointer subscriptions can be tied to them, and the
//! seat remembers the cursor position to derive relative motion deltas.

use crate::state::CompositorState;
use crate::window::Point;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use wayland_server::{
    backend::ClientId,
    protocol::{wl_keyboard, wl_pointer, wl_seat},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use xkbcommon::xkb;

pub const SEAT_VERSION: u32 = 7;

#[derive(Debug)]
pub struct Seat {
    name: String,
    keymap: Option<String>,
    pointers: Vec<wl_pointer::WlPointer>,
    keyboards: Vec<wl_keyboard::WlKeyboard>,
    cursor: Point,
}

impl Seat {
    pub fn new(name: impl Into<String>) -> Self {
        let keymap = build_keymap("us");
        if keymap.is_none() {
            warn!("Could not compile a default xkb keymap, keyboards get none");
        }
        Self {
            name: name.into(),
            keymap,
            pointers: Vec::new(),
            keyboards: Vec::new(),
            cursor: Point::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn pointers(&self) -> &[wl_pointer::WlPointer] {
        &self.pointers
    }

    pub fn keyboards(&self) -> &[wl_keyboard::WlKeyboard] {
        &self.keyboards
    }

    /// Move the cursor, returning the delta from the previous position
    pub fn move_cursor(&mut self, to: Point) -> (f64, f64) {
        let delta = to - self.cursor;
        self.cursor = to;
        (delta.x as f64, delta.y as f64)
    }

    fn forget_pointer(&mut self, pointer: &wl_pointer::WlPointer) {
        self.pointers.retain(|p| p.id() != pointer.id());
    }

    fn forget_keyboard(&mut self, keyboard: &wl_keyboard::WlKeyboard) {
        self.keyboards.retain(|k| k.id() != keyboard.id());
    }
}

/// Compile a keymap for `layout` and serialize it in text v1 format
pub fn build_keymap(layout: &str) -> Option<String> {
    let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
    let keymap = xkb::Keymap::new_from_names(
        &context,
        "",
        "",
        layout,
        "",
        None,
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )?;
    Some(keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1))
}

/// Anonymous memory file holding `data` plus a trailing NUL
fn keymap_fd(data: &str) -> Result<OwnedFd> {
    let fd = unsafe { libc::memfd_create(b"hollywood-keymap\0".as_ptr() as *const libc::c_char, 0) };
    if fd < 0 {
        return Err(anyhow!("memfd_create failed: {}", std::io::Error::last_os_error()));
    }
    let mut file = unsafe { File::from_raw_fd(fd) };
    file.write_all(data.as_bytes())?;
    file.write_all(&[0])?;
    Ok(OwnedFd::from(file))
}

impl GlobalDispatch<wl_seat::WlSeat, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_seat::WlSeat>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let seat = data_init.init(resource, ());
        seat.capabilities(wl_seat::Capability::Keyboard | wl_seat::Capability::Pointer);
        if seat.version() >= 2 {
            seat.name(state.seat.name.clone());
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                let pointer = data_init.init(id, ());
                state.seat.pointers.push(pointer);
            }
            wl_seat::Request::GetKeyboard { id } => {
                let keyboard = data_init.init(id, ());
                if let Some(keymap) = &state.seat.keymap {
                    match keymap_fd(keymap) {
                        Ok(fd) => keyboard.keymap(
                            wl_keyboard::KeymapFormat::XkbV1,
                            fd.as_fd(),
                            keymap.len() as u32 + 1,
                        ),
                        Err(e) => warn!("Failed to share keymap: {}", e),
                    }
                }
                if keyboard.version() >= 4 {
                    keyboard.repeat_info(25, 600);
                }
                state.seat.keyboards.push(keyboard);
            }
            wl_seat::Request::GetTouch { id } => {
                debug!("Touch requested on a seat without touch capability");
                data_init.init(id, ());
            }
            wl_seat::Request::Release => {}
            _ => {}
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_pointer::WlPointer,
        request: wl_pointer::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_pointer::Request::Release = request {
            state.seat.forget_pointer(resource);
            state.relative_pointers.pointer_released(&resource.id());
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &wl_pointer::WlPointer, _data: &()) {
        state.seat.forget_pointer(resource);
        state.relative_pointers.pointer_released(&resource.id());
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_keyboard::WlKeyboard,
        request: wl_keyboard::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_keyboard::Request::Release = request {
            state.seat.forget_keyboard(resource);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &wl_keyboard::WlKeyboard, _data: &()) {
        state.seat.forget_keyboard(resource);
    }
}

impl Dispatch<wayland_server::protocol::wl_touch::WlTouch, ()> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wayland_server::protocol::wl_touch::WlTouch,
        _request: wayland_server::protocol::wl_touch::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}
