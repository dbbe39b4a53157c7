//! Surface bookkeeping and geometry primitives
//!
//! Client surfaces are created and committed by the shell layer; this module
//! keeps the part of their state the output core needs:
//! - Global geometry and server-side decoration metrics
//! - Z-order stacking and hit-testing
//! - Which output a surface considers its primary output
//!
//! Coordinates are global compositor coordinates unless noted otherwise.

use crate::output::OutputId;
use bitflags::bitflags;
use log::debug;
use std::collections::HashMap;
use std::ops::{Add, Sub};

/// Height of the server-side title bar
pub const DECORATION_SIZE: i32 = 30;
/// Width of the server-side border on the left, right and bottom
pub const BORDER_SIZE: i32 = 1;
pub const BUTTON_WIDTH: i32 = 18;
pub const BUTTON_SPACING: i32 = 5;
pub const BUTTONS_RIGHT_MARGIN: i32 = 8;
/// Drop shadow extent around non-maximized toplevels
pub const SHADOW_SIZE: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Rectangle for surface and output placement. Edge arithmetic saturates
/// at the i32 range since regions can come straight from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_loc_and_size(loc: Point, size: Size) -> Self {
        Self::new(loc.x, loc.y, size.width, size.height)
    }

    pub fn loc(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// First column past the right edge
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// First row past the bottom edge
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x && point.y >= self.y && point.x < self.right() && point.y < self.bottom()
    }

    /// True when `other` lies entirely inside this rectangle
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Translate, or `None` when the moved rectangle would leave the i32
    /// coordinate space
    pub fn checked_translated(&self, dx: i32, dy: i32) -> Option<Self> {
        let x = self.x.checked_add(dx)?;
        let y = self.y.checked_add(dy)?;
        x.checked_add(self.width)?;
        y.checked_add(self.height)?;
        Some(Self::new(x, y, self.width, self.height))
    }

    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Rectangle::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y)))
    }

    /// Shrink by per-side margins, never below an empty rectangle
    pub fn margins_removed(&self, top: i32, left: i32, right: i32, bottom: i32) -> Self {
        Self::new(
            self.x.saturating_add(left),
            self.y.saturating_add(top),
            self.width.saturating_sub(left).saturating_sub(right).max(0),
            self.height.saturating_sub(top).saturating_sub(bottom).max(0),
        )
    }
}

/// Layer-shell stacking layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Background,
    Bottom,
    Top,
    Overlay,
}

bitflags! {
    /// Layer-surface anchor edges, same bit values as zwlr_layer_surface_v1.anchor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Anchor: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerState {
    pub layer: Layer,
    pub anchor: Anchor,
    pub exclusive_zone: i32,
}

/// What kind of shell object a surface is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Toplevel,
    Popup { parent: SurfaceId },
    Layer(LayerState),
    /// Shell desktop (icons, wallpaper client)
    Desktop,
    /// Shell panel or dock
    Panel,
    /// Global menu server surfaces
    Menu,
    DragIcon,
}

pub type SurfaceId = u32;

/// Premultiplied RGBA8 pixels uploaded by the shell for a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }
}

/// Compositor-side view of a client surface
#[derive(Debug, Clone)]
pub struct Surface {
    id: SurfaceId,
    uuid: String,
    role: SurfaceRole,
    position: Point,
    size: Size,
    server_decorated: bool,
    pub title: String,
    pub app_id: String,
    pub themed_icon: String,
    pub pid: u32,
    pub minimized: bool,
    pub maximized: bool,
    pub fullscreen: bool,
    pub can_minimize: bool,
    pub can_maximize: bool,
    pub can_close: bool,
    primary_output: Option<OutputId>,
    pub texture: Option<Texture>,
}

impl Surface {
    pub fn new(role: SurfaceRole, position: Point, size: Size) -> Self {
        Self {
            id: 0,
            uuid: generate_uuid(),
            role,
            position,
            size,
            server_decorated: false,
            title: String::new(),
            app_id: String::new(),
            themed_icon: String::new(),
            pid: 0,
            minimized: false,
            maximized: false,
            fullscreen: false,
            can_minimize: true,
            can_maximize: true,
            can_close: true,
            primary_output: None,
            texture: None,
        }
    }

    pub fn with_server_decoration(mut self, decorated: bool) -> Self {
        self.server_decorated = decorated;
        self
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn role(&self) -> SurfaceRole {
        self.role
    }

    pub fn set_role(&mut self, role: SurfaceRole) {
        self.role = role;
    }

    /// Panels, menus, the shell desktop and layer surfaces never get
    /// decorations, shadows or resize handles
    pub fn is_special(&self) -> bool {
        matches!(
            self.role,
            SurfaceRole::Desktop | SurfaceRole::Panel | SurfaceRole::Menu | SurfaceRole::Layer(_)
        )
    }

    pub fn is_toplevel(&self) -> bool {
        self.role == SurfaceRole::Toplevel
    }

    pub fn layer(&self) -> Option<LayerState> {
        match self.role {
            SurfaceRole::Layer(state) => Some(state),
            _ => None,
        }
    }

    pub fn server_decorated(&self) -> bool {
        self.server_decorated && !self.is_special()
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    pub fn primary_output(&self) -> Option<OutputId> {
        self.primary_output
    }

    pub fn set_primary_output(&mut self, output: Option<OutputId>) {
        self.primary_output = output;
    }

    /// Content rectangle, excluding decorations
    pub fn geometry(&self) -> Rectangle {
        Rectangle::from_loc_and_size(self.position, self.size)
    }

    /// Content plus title bar and borders when server-side decorated
    pub fn decorated_rect(&self) -> Rectangle {
        if !self.server_decorated() {
            return self.geometry();
        }
        Rectangle::new(
            self.position.x - BORDER_SIZE,
            self.position.y - DECORATION_SIZE,
            self.size.width + BORDER_SIZE * 2,
            self.size.height + BORDER_SIZE + DECORATION_SIZE,
        )
    }

    pub fn title_bar_rect(&self) -> Option<Rectangle> {
        if !self.server_decorated() {
            return None;
        }
        let deco = self.decorated_rect();
        Some(Rectangle::new(deco.x, deco.y, deco.width, DECORATION_SIZE))
    }

    fn button_rect(&self, index: i32) -> Option<Rectangle> {
        let deco = self.title_bar_rect()?;
        let x = deco.right() - BUTTON_WIDTH * (index + 1) - BUTTON_SPACING * index - BUTTONS_RIGHT_MARGIN;
        let y = deco.y + (DECORATION_SIZE - BUTTON_WIDTH) / 2;
        Some(Rectangle::new(x, y, BUTTON_WIDTH, BUTTON_WIDTH))
    }

    pub fn close_button_rect(&self) -> Option<Rectangle> {
        self.button_rect(0)
    }

    pub fn maximize_button_rect(&self) -> Option<Rectangle> {
        self.button_rect(1)
    }

    pub fn minimize_button_rect(&self) -> Option<Rectangle> {
        self.button_rect(2)
    }

    /// Whether a drop shadow is drawn under this surface
    pub fn has_shadow(&self) -> bool {
        self.is_toplevel() && !self.maximized && !self.fullscreen
    }
}

/// Random version 4 UUID in hyphenated lowercase form
pub fn generate_uuid() -> String {
    let mut bytes: [u8; 16] = rand::random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Owns every known surface and their stacking order
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    surfaces: HashMap<SurfaceId, Surface>,
    /// Bottom to top
    z_order: Vec<SurfaceId>,
    next_id: SurfaceId,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a surface on top of the stack and return its id
    pub fn insert(&mut self, mut surface: Surface) -> SurfaceId {
        self.next_id += 1;
        let id = self.next_id;
        surface.id = id;
        debug!("Registered surface {} ({:?}) uuid {}", id, surface.role, surface.uuid);
        self.surfaces.insert(id, surface);
        self.z_order.push(id);
        id
    }

    pub fn remove(&mut self, id: SurfaceId) -> Option<Surface> {
        self.z_order.retain(|s| *s != id);
        self.surfaces.remove(&id)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Move a surface to the top of the stack
    pub fn raise(&mut self, id: SurfaceId) -> bool {
        if !self.surfaces.contains_key(&id) {
            return false;
        }
        self.z_order.retain(|s| *s != id);
        self.z_order.push(id);
        true
    }

    /// Surfaces from bottom to top
    pub fn by_z_order(&self) -> impl DoubleEndedIterator<Item = &Surface> + '_ {
        self.z_order.iter().filter_map(move |id| self.surfaces.get(id))
    }

    pub fn popups_of(&self, parent: SurfaceId) -> impl Iterator<Item = &Surface> + '_ {
        self.by_z_order()
            .filter(move |s| s.role == SurfaceRole::Popup { parent })
    }

    pub fn in_layer(&self, layer: Layer) -> impl Iterator<Item = &Surface> + '_ {
        self.by_z_order()
            .filter(move |s| s.layer().map(|l| l.layer) == Some(layer))
    }

    /// Topmost surface under `point`, searching overlay and top layers first,
    /// then windows, then bottom and background layers
    pub fn surface_at(&self, point: Point) -> Option<SurfaceId> {
        let layer_hit = |layer: Layer| {
            self.in_layer(layer)
                .filter(|s| s.geometry().contains_point(point))
                .last()
                .map(|s| s.id)
        };

        if let Some(id) = layer_hit(Layer::Overlay).or_else(|| layer_hit(Layer::Top)) {
            return Some(id);
        }

        let window = self
            .by_z_order()
            .rev()
            .filter(|s| s.layer().is_none() && s.role != SurfaceRole::DragIcon)
            .filter(|s| !s.minimized)
            .find(|s| s.decorated_rect().contains_point(point))
            .map(|s| s.id);
        if window.is_some() {
            return window;
        }

        layer_hit(Layer::Bottom).or_else(|| layer_hit(Layer::Background))
    }

    /// UUIDs of the non-special surfaces accepted by `filter`, topmost first,
    /// joined with `;`
    pub fn stacking_order_uuids<F>(&self, filter: F) -> String
    where
        F: Fn(&Surface) -> bool,
    {
        self.by_z_order()
            .rev()
            .filter(|s| !s.is_special())
            .filter(|s| filter(s))
            .map(|s| s.uuid.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn on_output(&self, output: OutputId) -> impl Iterator<Item = &Surface> + '_ {
        self.by_z_order()
            .filter(move |s| s.primary_output == Some(output))
    }

    /// Reassign every surface whose primary output is `from` to `to`,
    /// pulling it inside `target` when it no longer overlaps it.
    /// Returns the ids of the moved surfaces.
    pub fn migrate_output(
        &mut self,
        from: OutputId,
        to: OutputId,
        target: Rectangle,
    ) -> Vec<SurfaceId> {
        let mut moved = Vec::new();
        for id in &self.z_order {
            let Some(surface) = self.surfaces.get_mut(id) else {
                continue;
            };
            if surface.primary_output != Some(from) {
                continue;
            }
            surface.primary_output = Some(to);
            if surface.decorated_rect().intersection(&target).is_none() {
                let deco = surface.decorated_rect();
                let offset = surface.position - deco.loc();
                let max_x = (target.right() - deco.width).max(target.x);
                let max_y = (target.bottom() - deco.height).max(target.y);
                let x = deco.x.clamp(target.x, max_x);
                let y = deco.y.clamp(target.y, max_y);
                surface.position = Point::new(x, y) + offset;
            }
            moved.push(*id);
        }
        moved
    }
}
