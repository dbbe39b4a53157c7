//! wlr-screencopy-unstable-v1
//!
//! A frame goes Created (buffer parameters advertised) → Ready (client
//! attached a matching shm buffer) → Sent (pixels copied during the next
//! paint of its output). Any buffer that does not match the advertised
//! parameters is a protocol error and leaves the frame untouched.

use crate::output::{Output, OutputId};
use crate::protocol::output::OutputGlobals;
use crate::render::Renderer;
use crate::shm::ShmBuffer;
use crate::state::CompositorState;
use crate::window::Rectangle;
use anyhow::Result;
use log::{debug, info, warn};
use thiserror::Error;
use wayland_protocols_wlr::screencopy::v1::server::{
    zwlr_screencopy_frame_v1::{self, ZwlrScreencopyFrameV1},
    zwlr_screencopy_manager_v1::{self, ZwlrScreencopyManagerV1},
};
use wayland_server::{
    backend::{ClientId, GlobalId},
    protocol::{wl_output, wl_shm},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum,
};

pub const SCREENCOPY_VERSION: u32 = 1;

/// `wl_display.error.invalid_object`, posted on a wl_output that no longer
/// names a live output
pub const DISPLAY_INVALID_OBJECT: u32 = 0;

/// Captures are always delivered as premultiplied ARGB8888
pub const CAPTURE_FORMAT: wl_shm::Format = wl_shm::Format::Argb8888;

pub fn create_global(dh: &DisplayHandle) -> GlobalId {
    info!(
        "Supporting zwlr_screencopy_manager_v1 (protocol version {})",
        SCREENCOPY_VERSION
    );
    dh.create_global::<CompositorState, ZwlrScreencopyManagerV1, _>(SCREENCOPY_VERSION, ())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreencopyError {
    #[error("frame already used")]
    AlreadyUsed,
    #[error("invalid buffer: not a shm buffer")]
    NotShm,
    #[error("invalid buffer format: expected {expected:?}, got {actual:?}")]
    Format {
        expected: wl_shm::Format,
        actual: WEnum<wl_shm::Format>,
    },
    #[error("invalid buffer width: expected {expected}, got {actual}")]
    Width { expected: i32, actual: i32 },
    #[error("invalid buffer height: expected {expected}, got {actual}")]
    Height { expected: i32, actual: i32 },
    #[error("invalid buffer stride: expected {expected}, got {actual}")]
    Stride { expected: i32, actual: i32 },
}

impl ScreencopyError {
    pub fn code(&self) -> zwlr_screencopy_frame_v1::Error {
        match self {
            ScreencopyError::AlreadyUsed => zwlr_screencopy_frame_v1::Error::AlreadyUsed,
            _ => zwlr_screencopy_frame_v1::Error::InvalidBuffer,
        }
    }
}

/// CLOCK_MONOTONIC presentation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub sec: u64,
    pub nsec: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Self {
            sec: ts.tv_sec as u64,
            nsec: ts.tv_nsec as u32,
        }
    }

    /// (tv_sec_hi, tv_sec_lo, tv_nsec)
    pub fn split(&self) -> (u32, u32, u32) {
        ((self.sec >> 32) as u32, self.sec as u32, self.nsec)
    }
}

/// Events a frame sends to its client
pub trait FrameEvents {
    fn buffer(&self, format: wl_shm::Format, width: u32, height: u32, stride: u32);
    fn flags(&self, y_invert: bool);
    fn damage(&self, x: u32, y: u32, width: u32, height: u32);
    fn ready(&self, timestamp: Timestamp);
    fn failed(&self);
    fn protocol_error(&self, error: &ScreencopyError);
}

impl FrameEvents for ZwlrScreencopyFrameV1 {
    fn buffer(&self, format: wl_shm::Format, width: u32, height: u32, stride: u32) {
        ZwlrScreencopyFrameV1::buffer(self, format, width, height, stride);
    }

    fn flags(&self, y_invert: bool) {
        let flags = if y_invert {
            zwlr_screencopy_frame_v1::Flags::YInvert
        } else {
            zwlr_screencopy_frame_v1::Flags::empty()
        };
        ZwlrScreencopyFrameV1::flags(self, flags);
    }

    fn damage(&self, x: u32, y: u32, width: u32, height: u32) {
        if self.version() >= 2 {
            ZwlrScreencopyFrameV1::damage(self, x, y, width, height);
        }
    }

    fn ready(&self, timestamp: Timestamp) {
        let (hi, lo, nsec) = timestamp.split();
        ZwlrScreencopyFrameV1::ready(self, hi, lo, nsec);
    }

    fn failed(&self) {
        ZwlrScreencopyFrameV1::failed(self);
    }

    fn protocol_error(&self, error: &ScreencopyError) {
        self.post_error(error.code(), error.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Created,
    Ready,
    Sent,
    Failed,
}

/// One single-shot capture request
#[derive(Debug)]
pub struct ScreencopyFrame<E = ZwlrScreencopyFrameV1> {
    events: E,
    output: OutputId,
    /// Global coordinates
    region: Rectangle,
    format: wl_shm::Format,
    stride: i32,
    overlay_cursor: bool,
    with_damage: bool,
    state: FrameState,
    buffer: Option<ShmBuffer>,
    timestamp: Timestamp,
}

impl<E: FrameEvents> ScreencopyFrame<E> {
    /// Create the frame and advertise its buffer parameters. `region` is in
    /// global coordinates.
    pub fn new(events: E, output: OutputId, region: Rectangle, overlay_cursor: bool) -> Self {
        let stride = region.width * 4;
        events.buffer(CAPTURE_FORMAT, region.width as u32, region.height as u32, stride as u32);
        Self {
            events,
            output,
            region,
            format: CAPTURE_FORMAT,
            stride,
            overlay_cursor,
            with_damage: false,
            state: FrameState::Created,
            buffer: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn region(&self) -> Rectangle {
        self.region
    }

    pub fn stride(&self) -> i32 {
        self.stride
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn overlay_cursor(&self) -> bool {
        self.overlay_cursor
    }

    /// Check a client buffer against the advertised parameters
    pub fn validate_buffer(&self, buffer: Option<&ShmBuffer>) -> Result<(), ScreencopyError> {
        if self.state != FrameState::Created {
            return Err(ScreencopyError::AlreadyUsed);
        }
        let buffer = buffer.ok_or(ScreencopyError::NotShm)?;
        if buffer.format != WEnum::Value(self.format) {
            return Err(ScreencopyError::Format {
                expected: self.format,
                actual: buffer.format,
            });
        }
        if buffer.width != self.region.width {
            return Err(ScreencopyError::Width {
                expected: self.region.width,
                actual: buffer.width,
            });
        }
        if buffer.height != self.region.height {
            return Err(ScreencopyError::Height {
                expected: self.region.height,
                actual: buffer.height,
            });
        }
        if buffer.stride != self.stride {
            return Err(ScreencopyError::Stride {
                expected: self.stride,
                actual: buffer.stride,
            });
        }
        Ok(())
    }

    /// `copy` / `copy_with_damage`. On error the protocol error has been
    /// posted and the frame stays in its previous state.
    pub fn attach(&mut self, buffer: Option<ShmBuffer>, with_damage: bool) -> Result<(), ScreencopyError> {
        if let Err(e) = self.validate_buffer(buffer.as_ref()) {
            self.events.protocol_error(&e);
            return Err(e);
        }
        self.buffer = buffer;
        self.with_damage = with_damage;
        self.state = FrameState::Ready;
        Ok(())
    }

    /// Copy the region out of the current frame into the client buffer and
    /// send `flags` + `ready`. Returns whether the frame was serviced.
    pub fn service(&mut self, renderer: &mut dyn Renderer) -> bool {
        if self.state != FrameState::Ready {
            return false;
        }
        match self.copy_pixels(renderer) {
            Ok(()) => {
                if self.with_damage {
                    self.events
                        .damage(0, 0, self.region.width as u32, self.region.height as u32);
                }
                self.events.flags(renderer.y_inverted());
                self.events.ready(self.timestamp);
                self.state = FrameState::Sent;
            }
            Err(e) => {
                warn!("Screencopy of {:?} failed: {:#}", self.region, e);
                self.fail();
            }
        }
        true
    }

    fn copy_pixels(&self, renderer: &mut dyn Renderer) -> Result<()> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ready frame without a buffer"))?;
        let rgba = renderer.read_pixels(self.region)?;
        let argb = rgba_to_argb8888(&rgba, self.region.width as usize, self.region.height as usize, self.stride as usize);
        buffer.write(&argb)?;
        Ok(())
    }

    /// Give up on the capture, e.g. when the output went away
    pub fn fail(&mut self) {
        if matches!(self.state, FrameState::Sent | FrameState::Failed) {
            return;
        }
        self.events.failed();
        self.state = FrameState::Failed;
    }
}

/// Convert tightly packed premultiplied RGBA rows into little-endian
/// ARGB8888 (bytes B, G, R, A) with the given stride
pub fn rgba_to_argb8888(rgba: &[u8], width: usize, height: usize, stride: usize) -> Vec<u8> {
    let mut out = vec![0u8; stride * height];
    for (y, row) in rgba.chunks_exact(width * 4).take(height).enumerate() {
        let dst = &mut out[y * stride..y * stride + width * 4];
        for (src, px) in row.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            px[0] = src[2];
            px[1] = src[1];
            px[2] = src[0];
            px[3] = src[3];
        }
    }
    out
}

/// Live frames of every client
#[derive(Debug)]
pub struct ScreencopyState<E = ZwlrScreencopyFrameV1> {
    frames: Vec<ScreencopyFrame<E>>,
}

impl<E> Default for ScreencopyState<E> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<E: FrameEvents> ScreencopyState<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: ScreencopyFrame<E>) {
        self.frames.push(frame);
    }

    pub fn find_mut<F>(&mut self, predicate: F) -> Option<&mut ScreencopyFrame<E>>
    where
        F: Fn(&E) -> bool,
    {
        self.frames.iter_mut().find(|f| predicate(&f.events))
    }

    pub fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&E) -> bool,
    {
        let before = self.frames.len();
        self.frames.retain(|f| !predicate(&f.events));
        before - self.frames.len()
    }

    pub fn has_ready(&self, output: OutputId) -> bool {
        self.frames
            .iter()
            .any(|f| f.output == output && f.state == FrameState::Ready)
    }

    /// Service every ready frame of `output` from the frame just painted
    pub fn service_output(&mut self, output: OutputId, renderer: &mut dyn Renderer) -> usize {
        self.frames
            .iter_mut()
            .filter(|f| f.output == output)
            .map(|f| f.service(renderer))
            .filter(|serviced| *serviced)
            .count()
    }

    /// Fail every pending frame of an output that went away
    pub fn output_removed(&mut self, output: OutputId) {
        for frame in self.frames.iter_mut().filter(|f| f.output == output) {
            frame.fail();
        }
    }
}

impl GlobalDispatch<ZwlrScreencopyManagerV1, ()> for CompositorState {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwlrScreencopyManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        data_init.init(resource, ());
    }
}

/// Global region to capture on `output`. `local` is output-local and
/// clipped to the output. `None` when nothing can be captured: the output is
/// disabled, or the region misses it or leaves the coordinate space.
pub fn capture_region(output: &Output, local: Option<Rectangle>) -> Option<Rectangle> {
    if !output.is_enabled() {
        return None;
    }
    let geometry = output.geometry();
    match local {
        Some(local) => local
            .checked_translated(geometry.x, geometry.y)?
            .intersection(&geometry),
        None => Some(geometry),
    }
}

impl CompositorState {
    fn capture(
        &mut self,
        frame: New<ZwlrScreencopyFrameV1>,
        output: &wl_output::WlOutput,
        overlay_cursor: i32,
        region: Option<Rectangle>,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let resource = data_init.init(frame, ());
        let target = OutputGlobals::resolve(output).and_then(|id| self.outputs.output(id));
        let Some(target) = target else {
            output.post_error(
                DISPLAY_INVALID_OBJECT,
                format!("invalid output object {}", output.id()),
            );
            return;
        };

        let output_id = target.id();
        match capture_region(target, region) {
            Some(region) => {
                debug!("Screencopy of {:?} on {:?}", region, output_id);
                self.screencopy
                    .push(ScreencopyFrame::new(resource, output_id, region, overlay_cursor != 0));
            }
            None => {
                debug!("Nothing to capture on {:?} for {:?}", output_id, region);
                resource.failed();
            }
        }
    }
}

impl Dispatch<ZwlrScreencopyManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &ZwlrScreencopyManagerV1,
        request: zwlr_screencopy_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_screencopy_manager_v1::Request::CaptureOutput {
                frame,
                overlay_cursor,
                output,
            } => state.capture(frame, &output, overlay_cursor, None, data_init),
            zwlr_screencopy_manager_v1::Request::CaptureOutputRegion {
                frame,
                overlay_cursor,
                output,
                x,
                y,
                width,
                height,
            } => {
                let region = Rectangle::new(x, y, width, height);
                state.capture(frame, &output, overlay_cursor, Some(region), data_init)
            }
            zwlr_screencopy_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<ZwlrScreencopyFrameV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwlrScreencopyFrameV1,
        request: zwlr_screencopy_frame_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let (buffer, with_damage) = match request {
            zwlr_screencopy_frame_v1::Request::Copy { buffer } => (buffer, false),
            zwlr_screencopy_frame_v1::Request::CopyWithDamage { buffer } => (buffer, true),
            zwlr_screencopy_frame_v1::Request::Destroy => {
                state.screencopy.remove_where(|f| f.id() == resource.id());
                return;
            }
            _ => return,
        };

        let shm = state.buffers.get(&buffer).cloned();
        let Some(frame) = state.screencopy.find_mut(|f| f.id() == resource.id()) else {
            debug!("copy on unknown screencopy frame {}", resource.id());
            return;
        };
        if frame.attach(shm, with_damage).is_ok() {
            let output = frame.output();
            if let Some(output) = state.outputs.output_mut(output) {
                output.window_mut().ready_for_screencopy();
            }
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &ZwlrScreencopyFrameV1, _data: &()) {
        state.screencopy.remove_where(|f| f.id() == resource.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockRenderer;
    use crate::shm::ShmPool;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Buffer(u32, u32, u32),
        Flags(bool),
        Damage(u32, u32, u32, u32),
        Ready,
        Failed,
        Error(zwlr_screencopy_frame_v1::Error),
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl Recorder {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl FrameEvents for Recorder {
        fn buffer(&self, _format: wl_shm::Format, width: u32, height: u32, stride: u32) {
            self.0.borrow_mut().push(Event::Buffer(width, height, stride));
        }
        fn flags(&self, y_invert: bool) {
            self.0.borrow_mut().push(Event::Flags(y_invert));
        }
        fn damage(&self, x: u32, y: u32, width: u32, height: u32) {
            self.0.borrow_mut().push(Event::Damage(x, y, width, height));
        }
        fn ready(&self, _timestamp: Timestamp) {
            self.0.borrow_mut().push(Event::Ready);
        }
        fn failed(&self) {
            self.0.borrow_mut().push(Event::Failed);
        }
        fn protocol_error(&self, error: &ScreencopyError) {
            self.0.borrow_mut().push(Event::Error(error.code()));
        }
    }

    fn shm_buffer(width: i32, height: i32, stride: i32, format: wl_shm::Format) -> ShmBuffer {
        let size = (stride * height).max(1) as usize;
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&vec![0u8; size]).unwrap();
        let pool = Arc::new(ShmPool::new(file, size).unwrap());
        ShmBuffer::new(pool, 0, width, height, stride, WEnum::Value(format))
    }

    fn frame(recorder: &Recorder) -> ScreencopyFrame<Recorder> {
        ScreencopyFrame::new(recorder.clone(), OutputId::new(1), Rectangle::new(100, 0, 2, 2), false)
    }

    #[test]
    fn test_creation_advertises_buffer() {
        let recorder = Recorder::default();
        let frame = frame(&recorder);
        assert_eq!(recorder.take(), vec![Event::Buffer(2, 2, 8)]);
        assert_eq!(frame.state(), FrameState::Created);
    }

    #[test]
    fn test_matching_buffer_becomes_ready() {
        let recorder = Recorder::default();
        let mut frame = frame(&recorder);
        recorder.take();

        frame
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap();
        assert_eq!(frame.state(), FrameState::Ready);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_any_mismatch_is_a_protocol_error() {
        let cases = [
            (shm_buffer(2, 2, 8, wl_shm::Format::Xrgb8888), "format"),
            (shm_buffer(3, 2, 12, wl_shm::Format::Argb8888), "width"),
            (shm_buffer(2, 3, 8, wl_shm::Format::Argb8888), "height"),
            (shm_buffer(2, 2, 16, wl_shm::Format::Argb8888), "stride"),
        ];
        for (buffer, field) in cases {
            let recorder = Recorder::default();
            let mut frame = frame(&recorder);
            recorder.take();

            let err = frame.attach(Some(buffer), false).unwrap_err();
            assert!(err.to_string().contains(field), "{} not in {}", field, err);
            assert_eq!(
                recorder.take(),
                vec![Event::Error(zwlr_screencopy_frame_v1::Error::InvalidBuffer)]
            );
            assert_eq!(frame.state(), FrameState::Created);
        }
    }

    #[test]
    fn test_non_shm_buffer_is_a_protocol_error() {
        let recorder = Recorder::default();
        let mut frame = frame(&recorder);
        recorder.take();
        assert_eq!(frame.attach(None, false), Err(ScreencopyError::NotShm));
        assert_eq!(
            recorder.take(),
            vec![Event::Error(zwlr_screencopy_frame_v1::Error::InvalidBuffer)]
        );
    }

    #[test]
    fn test_second_copy_is_already_used() {
        let recorder = Recorder::default();
        let mut frame = frame(&recorder);
        frame
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap();
        recorder.take();

        let err = frame
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap_err();
        assert_eq!(err, ScreencopyError::AlreadyUsed);
        assert_eq!(
            recorder.take(),
            vec![Event::Error(zwlr_screencopy_frame_v1::Error::AlreadyUsed)]
        );
    }

    #[test]
    fn test_service_copies_translated_region() {
        let recorder = Recorder::default();
        let mut frame = frame(&recorder);
        let buffer = shm_buffer(2, 2, 8, wl_shm::Format::Argb8888);
        frame.attach(Some(buffer.clone()), true).unwrap();
        recorder.take();

        let mut renderer = MockRenderer::new();
        renderer
            .expect_read_pixels()
            .withf(|region| *region == Rectangle::new(100, 0, 2, 2))
            .times(1)
            .returning(|_| Ok([10u8, 20, 30, 255].repeat(4)));
        renderer.expect_y_inverted().return_const(false);

        assert!(frame.service(&mut renderer));
        assert_eq!(frame.state(), FrameState::Sent);
        assert_eq!(
            recorder.take(),
            vec![Event::Damage(0, 0, 2, 2), Event::Flags(false), Event::Ready]
        );
        assert_eq!(buffer.read().unwrap(), [30u8, 20, 10, 255].repeat(4));

        assert!(!frame.service(&mut renderer), "frames are single shot");
    }

    #[test]
    fn test_failed_readback_sends_failed() {
        let recorder = Recorder::default();
        let mut frame = frame(&recorder);
        frame
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap();
        recorder.take();

        let mut renderer = MockRenderer::new();
        renderer
            .expect_read_pixels()
            .returning(|_| Err(anyhow::anyhow!("no frame")));
        assert!(frame.service(&mut renderer));
        assert_eq!(frame.state(), FrameState::Failed);
        assert_eq!(recorder.take(), vec![Event::Failed]);
    }

    #[test]
    fn test_state_services_only_ready_frames_of_output() {
        let mut state: ScreencopyState<Recorder> = ScreencopyState::new();
        let a = Recorder::default();
        let b = Recorder::default();
        let c = Recorder::default();

        let mut ready = frame(&a);
        ready
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap();
        state.push(ready);
        state.push(frame(&b));
        let mut other =
            ScreencopyFrame::new(c.clone(), OutputId::new(2), Rectangle::new(0, 0, 2, 2), false);
        other
            .attach(Some(shm_buffer(2, 2, 8, wl_shm::Format::Argb8888)), false)
            .unwrap();
        state.push(other);
        assert!(state.has_ready(OutputId::new(1)));

        let mut renderer = MockRenderer::new();
        renderer
            .expect_read_pixels()
            .times(1)
            .returning(|_| Ok(vec![0u8; 16]));
        renderer.expect_y_inverted().return_const(false);

        assert_eq!(state.service_output(OutputId::new(1), &mut renderer), 1);
        assert!(!state.has_ready(OutputId::new(1)));

        state.output_removed(OutputId::new(2));
        assert_eq!(c.take().last(), Some(&Event::Failed));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_rgba_to_argb_respects_stride() {
        let rgba = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = rgba_to_argb8888(&rgba, 1, 2, 8);
        assert_eq!(out, vec![3, 2, 1, 4, 0, 0, 0, 0, 7, 6, 5, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn test_timestamp_split() {
        let ts = Timestamp {
            sec: 0x2_0000_0005,
            nsec: 7,
        };
        assert_eq!(ts.split(), (2, 5, 7));
        assert!(Timestamp::now().sec > 0 || Timestamp::now().nsec > 0);
    }

    fn side_output() -> Output {
        let mut output = Output::new(
            OutputId::new(2),
            crate::output::ScreenInfo::new("DP-2", 1920, 1080, 60_000),
        );
        output.set_position(crate::window::Point::new(1920, 0));
        output
    }

    #[test]
    fn test_capture_region_is_output_local_and_clipped() {
        let output = side_output();
        assert_eq!(capture_region(&output, None), Some(Rectangle::new(1920, 0, 1920, 1080)));
        assert_eq!(
            capture_region(&output, Some(Rectangle::new(1800, 1000, 400, 400))),
            Some(Rectangle::new(3720, 1000, 120, 80))
        );
        assert_eq!(capture_region(&output, Some(Rectangle::new(0, 0, 0, 10))), None);
        assert_eq!(capture_region(&output, Some(Rectangle::new(0, 0, -5, 10))), None);
    }

    #[test]
    fn test_capture_region_near_i32_limits_fails() {
        let output = side_output();
        assert_eq!(
            capture_region(&output, Some(Rectangle::new(i32::MAX - 100, 0, 64, 64))),
            None
        );
        assert_eq!(
            capture_region(&output, Some(Rectangle::new(0, i32::MAX, i32::MAX, i32::MAX))),
            None
        );
        assert_eq!(
            capture_region(&output, Some(Rectangle::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX))),
            None
        );
    }

    #[test]
    fn test_disabled_output_cannot_be_captured() {
        let mut output = side_output();
        output.set_enabled(false);
        assert_eq!(capture_region(&output, None), None);
        assert_eq!(capture_region(&output, Some(Rectangle::new(0, 0, 10, 10))), None);
    }
}
