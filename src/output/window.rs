//! Per-output render and input surface
//!
//! An [`OutputWindow`] holds the transient interaction state of one output:
//! which surface the pointer grabbed, the move/resize/drag grab machine and
//! whether a repaint or a screencopy is pending. It composites the output
//! through a [`Renderer`].

use super::OutputId;
use crate::render::{Renderer, Wallpaper};
use crate::shortcuts::{KeyCombination, ShortcutHandler, ShortcutManager};
use crate::window::{Layer, Point, Rectangle, Size, Surface, SurfaceId, SurfaceRegistry, SurfaceRole};
use anyhow::Result;
use bitflags::bitflags;
use log::{debug, trace};

/// Pixel margin around a decorated rect edge used for resize handles
pub const EDGE_MARGIN: i32 = 5;

bitflags! {
    /// Resize edges; corners are the union of two edges
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Edges: u32 {
        const TOP = 0x01;
        const LEFT = 0x02;
        const RIGHT = 0x04;
        const BOTTOM = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabState {
    #[default]
    NoGrab,
    MoveGrab,
    ResizeGrab,
    DragGrab,
}

/// Pointer shape to show for the current hover state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Arrow,
    SizeVertical,
    SizeHorizontal,
    SizeDiagonal,
}

/// Window-manager actions the pointer asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    Raise(SurfaceId),
    Activate(SurfaceId),
    Minimize(SurfaceId),
    ToggleMaximize(SurfaceId),
    Close(SurfaceId),
}

/// Classify `point` against a surface's decorated rect. Corners win over
/// edges; the outer side of the top and left edges gets twice the margin.
pub fn near_edge(surface: &Surface, point: Point) -> Edges {
    if surface.is_special() {
        return Edges::empty();
    }

    let rect = surface.decorated_rect();
    let pm = EDGE_MARGIN;
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());

    let outer = Rectangle::new(
        left - pm * 2,
        top - pm * 2,
        rect.width + pm * 3 + 1,
        rect.height + pm * 3 + 1,
    );
    if !outer.contains_point(point) {
        return Edges::empty();
    }

    let on_top = point.y >= top - pm * 2 && point.y <= top + pm;
    let on_left = point.x >= left - pm * 2 && point.x <= left + pm;
    let on_right = point.x >= right - pm && point.x <= right + pm;
    let on_bottom = point.y >= bottom - pm && point.y <= bottom + pm;

    match (on_top, on_left, on_right, on_bottom) {
        (true, true, _, _) => Edges::TOP | Edges::LEFT,
        (true, _, true, _) => Edges::TOP | Edges::RIGHT,
        (_, true, _, true) => Edges::BOTTOM | Edges::LEFT,
        (_, _, true, true) => Edges::BOTTOM | Edges::RIGHT,
        (true, _, _, _) => Edges::TOP,
        (_, true, _, _) => Edges::LEFT,
        (_, _, true, _) => Edges::RIGHT,
        (_, _, _, true) => Edges::BOTTOM,
        _ => Edges::empty(),
    }
}

/// The corner or edge that stays fixed while resizing from `edges`
pub fn anchor_position(position: Point, edges: Edges, size: Size) -> Point {
    let mut anchor = position;
    if edges.contains(Edges::TOP) {
        anchor.y += size.height;
    }
    if edges.contains(Edges::LEFT) {
        anchor.x += size.width;
    }
    anchor
}

/// Inverse of [`anchor_position`] for a new size
pub fn anchored_position(anchor: Point, edges: Edges, size: Size) -> Point {
    anchor - anchor_position(Point::default(), edges, size)
}

/// Size after dragging `edges` by `delta`, never below 1x1
pub fn size_for_resize(initial: Size, delta: Point, edges: Edges) -> Size {
    let mut size = initial;
    if edges.contains(Edges::LEFT) {
        size.width -= delta.x;
    } else if edges.contains(Edges::RIGHT) {
        size.width += delta.x;
    }
    if edges.contains(Edges::TOP) {
        size.height -= delta.y;
    } else if edges.contains(Edges::BOTTOM) {
        size.height += delta.y;
    }
    Size::new(size.width.max(1), size.height.max(1))
}

#[derive(Debug)]
pub struct OutputWindow {
    output: OutputId,
    visible: bool,
    repaint_requested: bool,
    grab: GrabState,
    selected: Option<SurfaceId>,
    drag_icon: Option<SurfaceId>,
    initial_mouse: Point,
    mouse_offset: Point,
    initial_size: Size,
    resize_edges: Edges,
    resize_anchored: bool,
    resize_anchor: Point,
    cursor: CursorShape,
    copy_pending: bool,
}

impl OutputWindow {
    pub fn new(output: OutputId) -> Self {
        Self {
            output,
            visible: false,
            repaint_requested: false,
            grab: GrabState::NoGrab,
            selected: None,
            drag_icon: None,
            initial_mouse: Point::default(),
            mouse_offset: Point::default(),
            initial_size: Size::default(),
            resize_edges: Edges::empty(),
            resize_anchored: false,
            resize_anchor: Point::default(),
            cursor: CursorShape::Arrow,
            copy_pending: false,
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn request_repaint(&mut self) {
        self.repaint_requested = true;
    }

    pub fn needs_repaint(&self) -> bool {
        self.repaint_requested
    }

    pub fn grab_state(&self) -> GrabState {
        self.grab
    }

    pub fn selected_surface(&self) -> Option<SurfaceId> {
        self.selected
    }

    pub fn drag_icon(&self) -> Option<SurfaceId> {
        self.drag_icon
    }

    pub fn cursor(&self) -> CursorShape {
        self.cursor
    }

    pub fn resize_edges(&self) -> Edges {
        self.resize_edges
    }

    /// A screencopy frame for this output has its buffer attached
    pub fn ready_for_screencopy(&mut self) {
        self.copy_pending = true;
        self.repaint_requested = true;
    }

    pub fn screencopy_pending(&self) -> bool {
        self.copy_pending
    }

    /// Clear the pending flag, returning whether it was set
    pub fn take_screencopy_pending(&mut self) -> bool {
        std::mem::take(&mut self.copy_pending)
    }

    /// Begin an interactive move of the selected surface
    pub fn start_move(&mut self) -> bool {
        if self.selected.is_none() {
            debug!("start_move: no surface selected");
            return false;
        }
        self.grab = GrabState::MoveGrab;
        true
    }

    /// Begin an interactive resize of the selected surface. An anchored
    /// resize keeps the edge opposite `edges` in place.
    pub fn start_resize(&mut self, edges: Edges, anchored: bool, surfaces: &SurfaceRegistry) -> bool {
        let Some(surface) = self.selected.and_then(|id| surfaces.get(id)) else {
            debug!("start_resize: no surface selected");
            return false;
        };
        self.initial_size = surface.size();
        self.grab = GrabState::ResizeGrab;
        self.resize_edges = edges;
        self.resize_anchored = anchored;
        self.resize_anchor = anchor_position(surface.position(), edges, surface.size());
        true
    }

    pub fn start_drag(&mut self, icon: Option<SurfaceId>) -> bool {
        if self.selected.is_none() {
            debug!("start_drag: no surface selected");
            return false;
        }
        self.grab = GrabState::DragGrab;
        self.drag_icon = icon;
        true
    }

    fn begin_resize_at(&mut self, surface: &Surface, point: Point, edges: Edges) {
        self.grab = GrabState::ResizeGrab;
        self.initial_mouse = point;
        self.mouse_offset = point - surface.position();
        self.resize_edges = edges;
        self.resize_anchored = true;
        self.initial_size = surface.size();
        self.resize_anchor = anchor_position(surface.position(), edges, surface.size());
    }

    /// Pointer button press at `point` (global). `move_modifier` is true when
    /// Alt or Super is held. Returns the window-manager action, if any.
    pub fn pointer_press(
        &mut self,
        point: Point,
        move_modifier: bool,
        surfaces: &SurfaceRegistry,
    ) -> Option<WindowRequest> {
        if self.grab != GrabState::NoGrab {
            return None;
        }
        if self.selected.is_some() {
            return None;
        }

        let id = surfaces.surface_at(point)?;
        let surface = surfaces.get(id)?;
        self.selected = Some(id);
        self.initial_mouse = point;
        self.mouse_offset = point - surface.position();

        let edges = near_edge(surface, point);
        let raisable = surface.is_toplevel();

        if move_modifier {
            self.grab = GrabState::MoveGrab;
            return raisable.then_some(WindowRequest::Raise(id));
        }

        let on_title = surface
            .title_bar_rect()
            .is_some_and(|r| r.contains_point(point));

        if on_title {
            let hit = |rect: Option<Rectangle>| rect.is_some_and(|r| r.contains_point(point));
            if surface.can_minimize && hit(surface.minimize_button_rect()) {
                return Some(WindowRequest::Minimize(id));
            }
            if surface.can_maximize && hit(surface.maximize_button_rect()) {
                return Some(WindowRequest::ToggleMaximize(id));
            }
            if surface.can_close && hit(surface.close_button_rect()) {
                return Some(WindowRequest::Close(id));
            }
            if !edges.is_empty() {
                self.begin_resize_at(surface, point, edges);
                return None;
            }
            if !surface.maximized && !surface.fullscreen {
                self.grab = GrabState::MoveGrab;
            }
            return Some(WindowRequest::Raise(id));
        }

        if surface.server_decorated() && !edges.is_empty() {
            self.begin_resize_at(surface, point, edges);
            return None;
        }

        match surface.role() {
            SurfaceRole::Toplevel => Some(WindowRequest::Raise(id)),
            SurfaceRole::Desktop => Some(WindowRequest::Activate(id)),
            _ => None,
        }
    }

    /// Pointer moved to `point` (global). Grabs update the grabbed surface
    /// instead of delivering the motion. Returns true when a grab consumed it.
    pub fn pointer_motion(&mut self, point: Point, surfaces: &mut SurfaceRegistry) -> bool {
        match self.grab {
            GrabState::NoGrab => {
                self.update_cursor(point, surfaces);
                false
            }
            GrabState::MoveGrab => {
                if let Some(surface) = self.selected.and_then(|id| surfaces.get_mut(id)) {
                    surface.set_position(point - self.mouse_offset);
                    self.repaint_requested = true;
                }
                true
            }
            GrabState::ResizeGrab => {
                let delta = point - self.initial_mouse;
                let size = size_for_resize(self.initial_size, delta, self.resize_edges);
                if let Some(surface) = self.selected.and_then(|id| surfaces.get_mut(id)) {
                    surface.set_size(size);
                    if self.resize_anchored {
                        surface.set_position(anchored_position(
                            self.resize_anchor,
                            self.resize_edges,
                            size,
                        ));
                    }
                    trace!("resize {:?} -> {:?}", self.resize_edges, size);
                    self.repaint_requested = true;
                }
                true
            }
            GrabState::DragGrab => {
                if let Some(icon) = self.drag_icon.and_then(|id| surfaces.get_mut(id)) {
                    icon.set_position(point);
                    self.repaint_requested = true;
                }
                true
            }
        }
    }

    fn update_cursor(&mut self, point: Point, surfaces: &SurfaceRegistry) {
        let hovered = self
            .selected
            .or_else(|| surfaces.surface_at(point))
            .and_then(|id| surfaces.get(id));
        let edges = hovered
            .filter(|s| s.is_toplevel() && !s.maximized)
            .map(|s| near_edge(s, point))
            .unwrap_or_default();

        self.cursor = if edges.is_empty() {
            CursorShape::Arrow
        } else if edges == Edges::TOP || edges == Edges::BOTTOM {
            CursorShape::SizeVertical
        } else if edges == Edges::LEFT || edges == Edges::RIGHT {
            CursorShape::SizeHorizontal
        } else {
            CursorShape::SizeDiagonal
        };
    }

    /// Button released; `buttons_held` is false once every button is up,
    /// which ends any grab.
    pub fn pointer_release(&mut self, buttons_held: bool) {
        if buttons_held {
            return;
        }
        if self.grab != GrabState::NoGrab {
            debug!("Output {:?}: grab {:?} ended", self.output, self.grab);
        }
        self.selected = None;
        self.drag_icon = None;
        self.grab = GrabState::NoGrab;
        self.resize_edges = Edges::empty();
        self.cursor = CursorShape::Arrow;
    }

    /// Forget a surface that went away mid-grab
    pub fn surface_destroyed(&mut self, id: SurfaceId) {
        if self.drag_icon == Some(id) {
            self.drag_icon = None;
        }
        if self.selected == Some(id) {
            self.pointer_release(false);
        }
    }

    /// Key press: global shortcuts first. Returns true when consumed,
    /// otherwise the key belongs to the focused client.
    pub fn key_press<H>(&self, combo: KeyCombination, shortcuts: &ShortcutManager, handler: &mut H) -> bool
    where
        H: ShortcutHandler + ?Sized,
    {
        shortcuts.check_and_handle_combo(combo, handler)
    }

    /// Composite the output: wallpaper, background and bottom layers,
    /// windows by stacking order with their popups, the drag icon, then top
    /// and overlay layers
    pub fn compose(
        &mut self,
        geometry: Rectangle,
        surfaces: &SurfaceRegistry,
        wallpaper: &Wallpaper,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        renderer.begin_frame(geometry)?;
        renderer.draw_wallpaper(wallpaper)?;

        for layer in [Layer::Background, Layer::Bottom] {
            for surface in surfaces.in_layer(layer) {
                draw_if_visible(surface, geometry, renderer)?;
            }
        }

        for surface in surfaces.by_z_order() {
            let stacked = matches!(
                surface.role(),
                SurfaceRole::Toplevel | SurfaceRole::Desktop | SurfaceRole::Panel | SurfaceRole::Menu
            );
            if !stacked || surface.minimized {
                continue;
            }
            self.draw_recursive(surface, geometry, surfaces, renderer)?;
        }

        if let Some(icon) = self.drag_icon.and_then(|id| surfaces.get(id)) {
            draw_if_visible(icon, geometry, renderer)?;
        }

        for layer in [Layer::Top, Layer::Overlay] {
            for surface in surfaces.in_layer(layer) {
                draw_if_visible(surface, geometry, renderer)?;
            }
        }

        self.repaint_requested = false;
        Ok(())
    }

    fn draw_recursive(
        &self,
        surface: &Surface,
        geometry: Rectangle,
        surfaces: &SurfaceRegistry,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        if surface.decorated_rect().intersection(&geometry).is_some() {
            if surface.has_shadow() && !surface.is_special() {
                renderer.draw_shadow(surface.decorated_rect())?;
            }
            if surface.server_decorated() {
                renderer.draw_decoration(surface)?;
            }
            renderer.draw_surface(surface)?;
        }
        for popup in surfaces.popups_of(surface.id()) {
            self.draw_recursive(popup, geometry, surfaces, renderer)?;
        }
        Ok(())
    }
}

fn draw_if_visible(surface: &Surface, geometry: Rectangle, renderer: &mut dyn Renderer) -> Result<()> {
    if surface.geometry().intersection(&geometry).is_some() {
        renderer.draw_surface(surface)?;
    }
    Ok(())
}
