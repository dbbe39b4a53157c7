//! Outputs: one logical display each
//!
//! An [`Output`] carries the advertised mode list, current mode, scale,
//! rotation and global position of a display, plus the layer-shell
//! reservations that shrink its usable area. It owns exactly one
//! [`OutputWindow`], the render and input surface for that display.
//!
//! [`OutputManager`] owns the set of outputs.

pub mod manager;
pub mod window;

pub use manager::{ConfigurationReport, HeadChange, OutputManager, RemovalReport};
pub use window::{CursorShape, Edges, GrabState, OutputWindow, WindowRequest};

use crate::config::{DisplayPreferences, DisplaySection};
use crate::window::{Anchor, Layer, LayerState, Point, Rectangle, Size, Surface, SurfaceId};
use log::{debug, info};
use thiserror::Error;
use wayland_server::protocol::{wl_callback, wl_output};

/// Stable identifier, never reused within a compositor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u32);

impl OutputId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// One advertised mode, refresh in mHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub size: Size,
    pub refresh: i32,
}

impl Mode {
    pub const fn new(width: i32, height: i32, refresh: i32) -> Self {
        Self {
            size: Size::new(width, height),
            refresh,
        }
    }
}

/// Output rotation; flipped transforms are not supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Rotation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Normal),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Normal => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn to_transform(self) -> wl_output::Transform {
        match self {
            Rotation::Normal => wl_output::Transform::Normal,
            Rotation::Rotate90 => wl_output::Transform::_90,
            Rotation::Rotate180 => wl_output::Transform::_180,
            Rotation::Rotate270 => wl_output::Transform::_270,
        }
    }

    pub fn from_transform(transform: wl_output::Transform) -> Option<Self> {
        match transform {
            wl_output::Transform::Normal => Some(Rotation::Normal),
            wl_output::Transform::_90 => Some(Rotation::Rotate90),
            wl_output::Transform::_180 => Some(Rotation::Rotate180),
            wl_output::Transform::_270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// 90 and 270 swap width and height
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error("no output with id {0:?}")]
    UnknownOutput(OutputId),
    #[error("no output named {0}")]
    UnknownName(String),
    #[error("output {0} has no mode {1}x{2}@{3}")]
    InvalidMode(String, i32, i32, i32),
    #[error("output {0} has no mode at index {1}")]
    UnknownMode(String, usize),
    #[error("scale {0} is outside (0, 4]")]
    InvalidScale(f64),
    #[error("configuration would disable every output")]
    NoEnabledOutput,
}

/// What the windowing layer reports about a connected screen
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenInfo {
    pub name: String,
    pub make: String,
    pub model: String,
    pub serial: String,
    /// Millimetres
    pub physical_size: Size,
    pub modes: Vec<Mode>,
    pub preferred_mode: usize,
    pub default_scale: f64,
}

impl ScreenInfo {
    /// A screen with a single preferred mode
    pub fn new(name: impl Into<String>, width: i32, height: i32, refresh: i32) -> Self {
        Self {
            name: name.into(),
            make: String::new(),
            model: String::new(),
            serial: String::new(),
            physical_size: Size::default(),
            modes: vec![Mode::new(width, height, refresh)],
            preferred_mode: 0,
            default_scale: 1.0,
        }
    }
}

/// Receives `done` once the output presenting it finishes a frame
pub trait FrameCallback {
    fn done(self: Box<Self>, time: u32);
}

impl FrameCallback for wl_callback::WlCallback {
    fn done(self: Box<Self>, time: u32) {
        wl_callback::WlCallback::done(&self, time);
    }
}

#[derive(Default)]
struct FramePacing {
    started: bool,
    queued: Vec<Box<dyn FrameCallback>>,
    in_flight: Vec<Box<dyn FrameCallback>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerReservation {
    surface: SurfaceId,
    layer: Layer,
    anchor: Anchor,
    exclusive_zone: i32,
}

pub struct Output {
    id: OutputId,
    name: String,
    make: String,
    model: String,
    serial: String,
    physical_size: Size,
    modes: Vec<Mode>,
    current_mode: usize,
    preferred_mode: usize,
    default_scale: f64,
    scale: f64,
    rotation: Rotation,
    config_position: Point,
    position: Point,
    primary: bool,
    enabled: bool,
    reservations: Vec<LayerReservation>,
    usable_geometry: Rectangle,
    frame: FramePacing,
    window: OutputWindow,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &self.current_mode())
            .field("scale", &self.scale)
            .field("rotation", &self.rotation)
            .field("position", &self.position)
            .field("primary", &self.primary)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Output {
    pub fn new(id: OutputId, screen: ScreenInfo) -> Self {
        let mut modes = screen.modes;
        if modes.is_empty() {
            modes.push(Mode::new(1024, 768, 60_000));
        }
        let preferred_mode = screen.preferred_mode.min(modes.len() - 1);
        let scale = if screen.default_scale > 0.0 {
            screen.default_scale
        } else {
            1.0
        };
        let mut output = Self {
            id,
            name: screen.name,
            make: screen.make,
            model: screen.model,
            serial: screen.serial,
            physical_size: screen.physical_size,
            modes,
            current_mode: preferred_mode,
            preferred_mode,
            default_scale: scale,
            scale,
            rotation: Rotation::Normal,
            config_position: Point::default(),
            position: Point::default(),
            primary: false,
            enabled: true,
            reservations: Vec::new(),
            usable_geometry: Rectangle::default(),
            frame: FramePacing::default(),
            window: OutputWindow::new(id),
        };
        output.update_usable_geometry();
        output
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn make(&self) -> &str {
        &self.make
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// "make model", as advertised to clients
    pub fn description(&self) -> String {
        format!("{} {}", self.make, self.model).trim().to_string()
    }

    /// Key under which per-user preferences for this display are stored
    pub fn persistent_name(&self) -> String {
        let (make, model, serial) = (&self.make, &self.model, &self.serial);
        match (make.is_empty(), model.is_empty(), serial.is_empty()) {
            (false, false, false) => format!("{}-{}-{}", make, model, serial),
            (false, _, false) => format!("{}-{}", make, serial),
            (_, _, false) => serial.clone(),
            (false, false, true) => format!("{}-{}", make, model),
            _ => self.name.clone(),
        }
    }

    pub fn physical_size(&self) -> Size {
        self.physical_size
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn current_mode(&self) -> Mode {
        self.modes[self.current_mode]
    }

    pub fn current_mode_index(&self) -> usize {
        self.current_mode
    }

    pub fn preferred_mode_index(&self) -> usize {
        self.preferred_mode
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Position as requested by configuration, before normalization
    pub fn config_position(&self) -> Point {
        self.config_position
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> &OutputWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut OutputWindow {
        &mut self.window
    }

    /// Size in global coordinates: mode size, rotated, divided by scale
    pub fn logical_size(&self) -> Size {
        let mode = self.current_mode().size;
        let (w, h) = if self.rotation.swaps_axes() {
            (mode.height, mode.width)
        } else {
            (mode.width, mode.height)
        };
        Size::new(
            (w as f64 / self.scale).round() as i32,
            (h as f64 / self.scale).round() as i32,
        )
    }

    pub fn geometry(&self) -> Rectangle {
        Rectangle::from_loc_and_size(self.position, self.logical_size())
    }

    /// Geometry minus the exclusive zones of top-layer panels
    pub fn usable_geometry(&self) -> Rectangle {
        self.usable_geometry
    }

    pub(crate) fn set_position(&mut self, position: Point) {
        if self.position != position {
            debug!("Output {} moved to {:?}", self.name, position);
        }
        self.position = position;
        self.update_usable_geometry();
    }

    pub(crate) fn set_config_position(&mut self, position: Point) {
        self.config_position = position;
    }

    pub(crate) fn set_primary(&mut self, primary: bool) {
        self.primary = primary;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_scale(&mut self, scale: f64) -> Result<(), OutputError> {
        if !(scale > 0.0 && scale <= crate::config::MAX_SCALE_FACTOR as f64) {
            return Err(OutputError::InvalidScale(scale));
        }
        self.scale = scale;
        self.update_usable_geometry();
        Ok(())
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
        self.update_usable_geometry();
    }

    /// Index of the advertised mode matching `width`x`height`, preferring an
    /// exact refresh match
    pub fn find_mode(&self, width: i32, height: i32, refresh: i32) -> Option<usize> {
        let same_size = |m: &Mode| m.size == Size::new(width, height);
        self.modes
            .iter()
            .position(|m| same_size(m) && m.refresh == refresh)
            .or_else(|| self.modes.iter().position(same_size))
    }

    pub(crate) fn set_mode_index(&mut self, index: usize) -> Result<(), OutputError> {
        let mode = *self
            .modes
            .get(index)
            .ok_or_else(|| OutputError::UnknownMode(self.name.clone(), index))?;
        self.current_mode = index;
        debug!(
            "Output {} mode {}x{}@{}",
            self.name, mode.size.width, mode.size.height, mode.refresh
        );
        self.update_usable_geometry();
        Ok(())
    }

    /// Switch to a mode, adding it to the list when it is not advertised yet
    pub(crate) fn set_custom_mode(&mut self, mode: Mode) -> Result<(), OutputError> {
        if mode.size.is_empty() || mode.refresh < 0 {
            return Err(OutputError::InvalidMode(
                self.name.clone(),
                mode.size.width,
                mode.size.height,
                mode.refresh,
            ));
        }
        let index = match self.modes.iter().position(|m| *m == mode) {
            Some(index) => index,
            None => {
                self.modes.push(mode);
                self.modes.len() - 1
            }
        };
        self.set_mode_index(index)
    }

    /// Apply a `[Display-<name>]` table: scale, rotation, mode and the
    /// configured position (normalized later by the manager)
    pub fn apply_display_config(&mut self, section: &DisplaySection) {
        let scale = section
            .scale_factor
            .map(|s| s.clamp(1, crate::config::MAX_SCALE_FACTOR) as f64)
            .unwrap_or(self.default_scale);
        // Clamped above, cannot fail
        let _ = self.set_scale(scale);
        self.set_rotation(section.rotation());

        if let Some((width, height, refresh)) = section.mode() {
            let result = match self.find_mode(width, height, refresh) {
                Some(index) => self.set_mode_index(index),
                None => self.set_custom_mode(Mode::new(width, height, refresh)),
            };
            if let Err(e) = result {
                info!("Ignoring configured mode for {}: {}", self.name, e);
            }
        }

        self.config_position = Point::new(section.position_x, section.position_y);
    }

    /// Per-user preferences override the system scale
    pub fn apply_preferences(&mut self, prefs: &DisplayPreferences) {
        if let Some(scale) = prefs.scale_factor() {
            let _ = self.set_scale(scale as f64);
        }
    }

    /// Track a top-layer surface's exclusive zone. Returns false for
    /// surfaces that are not layer surfaces.
    pub fn reserve_layer_region(&mut self, surface: &Surface) -> bool {
        let Some(LayerState {
            layer,
            anchor,
            exclusive_zone,
        }) = surface.layer()
        else {
            return false;
        };
        self.reservations.retain(|r| r.surface != surface.id());
        self.reservations.push(LayerReservation {
            surface: surface.id(),
            layer,
            anchor,
            exclusive_zone,
        });
        self.update_usable_geometry();
        true
    }

    pub fn remove_layer_reservation(&mut self, surface: SurfaceId) -> bool {
        let before = self.reservations.len();
        self.reservations.retain(|r| r.surface != surface);
        if self.reservations.len() == before {
            return false;
        }
        self.update_usable_geometry();
        true
    }

    fn update_usable_geometry(&mut self) {
        let (mut top, mut left, mut right, mut bottom) = (0i32, 0i32, 0i32, 0i32);
        for r in &self.reservations {
            if r.layer != Layer::Top || r.exclusive_zone <= 0 {
                continue;
            }
            // Only single-edge anchors reserve space
            if r.anchor == Anchor::TOP {
                top = top.saturating_add(r.exclusive_zone);
            } else if r.anchor == Anchor::LEFT {
                left = left.saturating_add(r.exclusive_zone);
            } else if r.anchor == Anchor::RIGHT {
                right = right.saturating_add(r.exclusive_zone);
            } else if r.anchor == Anchor::BOTTOM {
                bottom = bottom.saturating_add(r.exclusive_zone);
            }
        }
        self.usable_geometry = self.geometry().margins_removed(top, left, right, bottom);
    }

    /// Callbacks queued now fire after the next complete frame
    pub fn queue_frame_callback(&mut self, callback: Box<dyn FrameCallback>) {
        self.frame.queued.push(callback);
    }

    pub fn pending_frame_callbacks(&self) -> usize {
        self.frame.queued.len() + self.frame.in_flight.len()
    }

    pub fn frame_started(&mut self) {
        self.frame.started = true;
        let queued = std::mem::take(&mut self.frame.queued);
        self.frame.in_flight.extend(queued);
    }

    /// Fire every callback that was queued before the frame started.
    /// Does nothing if no frame was started.
    pub fn send_frame_callbacks(&mut self, time: u32) -> usize {
        if !self.frame.started {
            return 0;
        }
        self.frame.started = false;
        let callbacks = std::mem::take(&mut self.frame.in_flight);
        let count = callbacks.len();
        for callback in callbacks {
            callback.done(time);
        }
        count
    }
}
