//! Compositor state shared by every protocol handler
//!
//! [`CompositorState`] owns each subsystem outright and is handed to the
//! wayland dispatch machinery as `&mut`. Protocol handlers reach the output
//! manager, the surface registry and each other through it instead of a
//! process-wide global.

use crate::config::CompositorConfig;
use crate::output::{
    FrameCallback, GrabState, OutputError, OutputId, OutputManager, RemovalReport, ScreenInfo,
    WindowRequest,
};
use crate::protocol::{
    ControlRequest, ExtensionGlobals, OutputGlobals, OutputManagementState, RelativePointers,
    ScreencopyState, WindowManagement,
};
use crate::render::{Renderer, Wallpaper};
use crate::seat::{Seat, SEAT_VERSION};
use crate::shm::BufferStore;
use crate::shortcuts::{KeyCombination, ShortcutAction, ShortcutManager};
use crate::window::{Point, Rectangle, Size, Surface, SurfaceId, SurfaceRegistry};
use anyhow::Result;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use wayland_server::{
    backend::GlobalId,
    protocol::{wl_seat, wl_shm},
    DisplayHandle, Resource,
};

pub struct CompositorState {
    pub(crate) display_handle: DisplayHandle,
    pub(crate) config: CompositorConfig,
    pub(crate) outputs: OutputManager,
    pub(crate) surfaces: SurfaceRegistry,
    pub(crate) shortcuts: ShortcutManager,
    pub(crate) seat: Seat,
    pub(crate) buffers: BufferStore,
    pub(crate) output_globals: OutputGlobals,
    pub(crate) output_management: OutputManagementState,
    pub(crate) screencopy: ScreencopyState,
    pub(crate) relative_pointers: RelativePointers,
    pub(crate) window_management: WindowManagement,
    wallpaper: Wallpaper,
    renderer: Box<dyn Renderer>,
    _globals: (ExtensionGlobals, GlobalId, GlobalId),
    active: Option<SurfaceId>,
    grab_output: Option<OutputId>,
    restore_geometry: HashMap<SurfaceId, Rectangle>,
    close_requests: Vec<SurfaceId>,
    shortcut_actions: Vec<ShortcutAction>,
    started: Instant,
}

impl std::fmt::Debug for CompositorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorState")
            .field("outputs", &self.outputs.len())
            .field("surfaces", &self.surfaces.len())
            .field("screencopy_frames", &self.screencopy.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl CompositorState {
    /// Create the state and every global it serves. The renderer is the GPU
    /// collaborator used for composition and screencopy readback.
    pub fn new(dh: &DisplayHandle, config: CompositorConfig, renderer: Box<dyn Renderer>) -> Self {
        let wallpaper = match Wallpaper::from_settings(&config.user.wallpaper) {
            Ok(wallpaper) => wallpaper,
            Err(e) => {
                warn!("Failed to load wallpaper, using the default color: {:#}", e);
                Wallpaper::default()
            }
        };

        let shm = dh.create_global::<CompositorState, wl_shm::WlShm, _>(1, ());
        let seat = dh.create_global::<CompositorState, wl_seat::WlSeat, _>(SEAT_VERSION, ());
        let extensions = ExtensionGlobals::create(dh);

        Self {
            display_handle: dh.clone(),
            shortcuts: ShortcutManager::new(&config.user.shortcuts),
            config,
            outputs: OutputManager::new(),
            surfaces: SurfaceRegistry::new(),
            seat: Seat::new("seat0"),
            buffers: BufferStore::default(),
            output_globals: OutputGlobals::new(),
            output_management: OutputManagementState::new(),
            screencopy: ScreencopyState::new(),
            relative_pointers: RelativePointers::new(),
            window_management: WindowManagement::new(),
            wallpaper,
            renderer,
            _globals: (extensions, shm, seat),
            active: None,
            grab_output: None,
            restore_geometry: HashMap::new(),
            close_requests: Vec::new(),
            shortcut_actions: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn outputs(&self) -> &OutputManager {
        &self.outputs
    }

    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.surfaces
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn window_management(&self) -> &WindowManagement {
        &self.window_management
    }

    pub fn screencopy(&self) -> &ScreencopyState {
        &self.screencopy
    }

    pub fn active_surface(&self) -> Option<SurfaceId> {
        self.active
    }

    /// Surfaces the window manager asked to close, for the shell to act on
    pub fn take_close_requests(&mut self) -> Vec<SurfaceId> {
        std::mem::take(&mut self.close_requests)
    }

    /// Matched shortcuts the compositor does not handle itself
    pub fn take_shortcut_actions(&mut self) -> Vec<ShortcutAction> {
        std::mem::take(&mut self.shortcut_actions)
    }

    /// Re-read shortcut bindings from the user configuration
    pub fn reload_shortcuts(&mut self) {
        self.shortcuts.reload_config(&self.config.user.shortcuts);
    }

    fn elapsed_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    // Output topology

    /// Enumerate the screens present at startup. Only the first call does
    /// anything.
    pub fn create_for_console(&mut self, screens: Vec<ScreenInfo>) {
        if !self
            .outputs
            .create_for_console(screens, &self.config.display, &self.config.user)
        {
            return;
        }
        let ids: Vec<OutputId> = self.outputs.outputs().map(|o| o.id()).collect();
        for id in ids {
            self.output_attached(id);
        }
        self.persist_last_seen();
        self.output_management
            .broadcast(&self.display_handle, &self.outputs);
    }

    pub fn present(&mut self) {
        self.outputs.present();
    }

    /// Hotplug: a screen appeared
    pub fn screen_added(&mut self, screen: ScreenInfo) -> OutputId {
        let id = self
            .outputs
            .screen_added(screen, &self.config.display, &self.config.user);
        self.output_attached(id);
        self.persist_last_seen();
        self.output_management
            .broadcast(&self.display_handle, &self.outputs);
        self.outputs.trigger_render();
        id
    }

    /// Hotplug: a screen went away. Its surfaces move to the new primary and
    /// captures in progress on it fail.
    pub fn screen_removed(&mut self, name: &str) -> Result<RemovalReport, OutputError> {
        let report = self.outputs.screen_removed(name, &mut self.surfaces)?;
        self.output_globals
            .withdraw(&self.display_handle, report.removed);
        self.screencopy.output_removed(report.removed);
        if self.grab_output == Some(report.removed) {
            self.grab_output = None;
        }

        for output in self.outputs.outputs() {
            self.output_globals.send_state(output);
        }
        self.output_management
            .broadcast(&self.display_handle, &self.outputs);
        self.outputs.trigger_render();
        Ok(report)
    }

    /// After a configuration transaction: refresh wl_output state, advertise
    /// newly enabled outputs and withdraw disabled ones
    pub(crate) fn configuration_changed(&mut self, changed: &[OutputId]) {
        for id in changed {
            let Some(output) = self.outputs.output(*id) else {
                continue;
            };
            if output.is_enabled() {
                self.output_globals.advertise(&self.display_handle, output);
                self.output_globals.send_state(output);
            } else {
                self.output_globals.withdraw(&self.display_handle, *id);
                self.screencopy.output_removed(*id);
            }
        }
        // Positions of unchanged outputs may have shifted too
        for output in self.outputs.outputs().filter(|o| !changed.contains(&o.id())) {
            self.output_globals.send_state(output);
        }
        self.output_management
            .broadcast(&self.display_handle, &self.outputs);
        self.outputs.trigger_render();
    }

    fn output_attached(&mut self, id: OutputId) {
        if let Some(output) = self.outputs.output(id) {
            if output.is_enabled() {
                self.output_globals.advertise(&self.display_handle, output);
            }
        }
    }

    /// Write back `LastSeen` for every connected display
    fn persist_last_seen(&mut self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let names: Vec<String> = self.outputs.outputs().map(|o| o.persistent_name()).collect();
        for name in names {
            self.config.user.touch_display(&name, now);
        }
        if let Err(e) = self.config.save_user() {
            debug!("Could not save user settings: {:#}", e);
        }
    }

    // Surfaces

    /// Register a surface from the shell. Toplevels get a window control.
    pub fn add_surface(&mut self, mut surface: Surface) -> SurfaceId {
        let output = self
            .outputs
            .output_at(surface.position())
            .or_else(|| self.outputs.primary_output())
            .map(|o| o.id());
        surface.set_primary_output(output);
        let id = self.surfaces.insert(surface);

        if let (Some(output), Some(surface)) = (output, self.surfaces.get(id)) {
            if surface.layer().is_some() {
                if let Some(output) = self.outputs.output_mut(output) {
                    output.reserve_layer_region(surface);
                }
            }
        }

        if let Some(surface) = self.surfaces.get(id).filter(|s| s.is_toplevel()) {
            self.window_management.create_control(surface);
            self.refresh_window_icon(id);
            self.window_management.update_stacking_order(&self.surfaces);
        }
        self.outputs.trigger_render();
        id
    }

    /// The shell changed a surface's title, state flags or texture
    pub fn surface_changed(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get(id) else {
            return;
        };
        if let Some(control) = self.window_management.window_for_surface_mut(id) {
            control.sync_from(surface);
        }
        self.refresh_window_icon(id);
        self.outputs.trigger_render();
    }

    pub fn remove_surface(&mut self, id: SurfaceId) -> Option<Surface> {
        for output in self.outputs.outputs_mut() {
            output.window_mut().surface_destroyed(id);
            output.remove_layer_reservation(id);
        }
        self.window_management.surface_destroyed(id);
        self.restore_geometry.remove(&id);
        if self.active == Some(id) {
            self.active = None;
        }
        let surface = self.surfaces.remove(id);
        self.window_management.update_stacking_order(&self.surfaces);
        self.outputs.trigger_render();
        surface
    }

    /// Queue a frame callback on the output presenting `surface`
    pub fn queue_frame_callback(&mut self, surface: SurfaceId, callback: Box<dyn FrameCallback>) -> bool {
        let output = self.surfaces.get(surface).and_then(|s| s.primary_output());
        match output.and_then(|id| self.outputs.output_mut(id)) {
            Some(output) => {
                output.queue_frame_callback(callback);
                output.window_mut().request_repaint();
                true
            }
            None => false,
        }
    }

    fn activate(&mut self, surface: Option<SurfaceId>) {
        self.active = surface;
        self.window_management.activate(surface);
    }

    fn raise(&mut self, id: SurfaceId) {
        if self.surfaces.raise(id) {
            self.window_management.update_stacking_order(&self.surfaces);
        }
    }

    fn set_minimized(&mut self, id: SurfaceId, minimized: bool) {
        let Some(surface) = self.surfaces.get_mut(id) else {
            return;
        };
        if surface.minimized == minimized {
            return;
        }
        surface.minimized = minimized;
        if minimized && self.active == Some(id) {
            self.activate(None);
        }
        if !minimized {
            self.raise(id);
            self.activate(Some(id));
        }
        self.surface_changed(id);
    }

    /// Fill the usable area of the surface's output, or go back to the
    /// geometry from before maximizing
    fn set_maximized(&mut self, id: SurfaceId, maximized: bool) {
        let area = self
            .surfaces
            .get(id)
            .and_then(|s| s.primary_output())
            .and_then(|o| self.outputs.output(o))
            .or_else(|| self.outputs.primary_output())
            .map(|o| o.usable_geometry());
        let Some(surface) = self.surfaces.get_mut(id) else {
            return;
        };
        if surface.maximized == maximized {
            return;
        }

        if maximized {
            let Some(area) = area else {
                return;
            };
            self.restore_geometry.insert(id, surface.geometry());
            surface.maximized = true;
            let deco = surface.decorated_rect();
            let content = surface.geometry();
            let left = content.x - deco.x;
            let top = content.y - deco.y;
            let horizontal = deco.width - content.width;
            let vertical = deco.height - content.height;
            surface.set_position(area.loc() + Point::new(left, top));
            surface.set_size(Size::new(
                (area.width - horizontal).max(1),
                (area.height - vertical).max(1),
            ));
        } else {
            surface.maximized = false;
            if let Some(previous) = self.restore_geometry.remove(&id) {
                surface.set_position(previous.loc());
                surface.set_size(previous.size());
            }
        }
        self.surface_changed(id);
    }

    /// Act on a window-manager request raised by pointer input
    pub fn handle_window_request(&mut self, request: WindowRequest) {
        debug!("Window request {:?}", request);
        match request {
            WindowRequest::Raise(id) => {
                self.raise(id);
                self.activate(Some(id));
            }
            WindowRequest::Activate(id) => self.activate(Some(id)),
            WindowRequest::Minimize(id) => self.set_minimized(id, true),
            WindowRequest::ToggleMaximize(id) => {
                let maximized = self.surfaces.get(id).map(|s| s.maximized).unwrap_or(false);
                self.set_maximized(id, !maximized);
            }
            WindowRequest::Close(id) => self.close_requests.push(id),
        }
        self.outputs.trigger_render();
    }

    /// Act on a request from a window-management client
    pub fn handle_control_request(&mut self, surface: SurfaceId, request: ControlRequest) {
        debug!("Control request {:?} for surface {}", request, surface);
        match request {
            ControlRequest::Activate(true) => {
                self.set_minimized(surface, false);
                self.handle_window_request(WindowRequest::Raise(surface));
            }
            ControlRequest::Activate(false) => {
                if self.active == Some(surface) {
                    self.activate(None);
                }
            }
            ControlRequest::Minimize(minimized) => self.set_minimized(surface, minimized),
            ControlRequest::Maximize(maximized) => self.set_maximized(surface, maximized),
            ControlRequest::Close => self.close_requests.push(surface),
        }
        self.outputs.trigger_render();
    }

    // Input

    /// Absolute pointer motion in global coordinates
    pub fn pointer_motion(&mut self, point: Point) {
        let delta = self.seat.move_cursor(point);
        if delta != (0.0, 0.0) {
            let pointers: Vec<_> = self.seat.pointers().iter().map(|p| p.id()).collect();
            self.relative_pointers
                .send_relative_motion(&pointers, self.elapsed_us(), delta);
        }

        let target = self
            .grab_output
            .or_else(|| self.outputs.output_at(point).map(|o| o.id()));
        let Some(output) = target.and_then(|id| self.outputs.output_mut(id)) else {
            trace!("Pointer at {:?} is on no output", point);
            return;
        };
        if output.window_mut().pointer_motion(point, &mut self.surfaces) {
            output.window_mut().request_repaint();
        }
    }

    /// Button press at the current cursor position. `move_modifier` is true
    /// while Alt or Super is held.
    pub fn pointer_press(&mut self, move_modifier: bool) {
        let point = self.seat.cursor();
        let Some(output) = self.outputs.output_at(point).map(|o| o.id()) else {
            return;
        };
        let request = self
            .outputs
            .output_mut(output)
            .and_then(|o| o.window_mut().pointer_press(point, move_modifier, &self.surfaces));
        if self
            .outputs
            .output(output)
            .is_some_and(|o| o.window().grab_state() != GrabState::NoGrab)
        {
            self.grab_output = Some(output);
        }
        if let Some(request) = request {
            self.handle_window_request(request);
        }
    }

    pub fn pointer_release(&mut self, buttons_held: bool) {
        let target = self
            .grab_output
            .or_else(|| self.outputs.output_at(self.seat.cursor()).map(|o| o.id()));
        if let Some(output) = target.and_then(|id| self.outputs.output_mut(id)) {
            output.window_mut().pointer_release(buttons_held);
        }
        if !buttons_held {
            self.grab_output = None;
        }
    }

    /// Key press. Returns true when a global shortcut consumed it and the key
    /// must not reach the focused client.
    pub fn key_press(&mut self, combo: KeyCombination) -> bool {
        let mut matched: Vec<ShortcutAction> = Vec::new();
        let mut collect = |action: ShortcutAction| matched.push(action);
        let consumed = match self.outputs.primary_output() {
            Some(output) => output.window().key_press(combo, &self.shortcuts, &mut collect),
            None => self.shortcuts.check_and_handle_combo(combo, &mut collect),
        };
        for action in matched {
            self.handle_shortcut(action);
        }
        consumed
    }

    fn handle_shortcut(&mut self, action: ShortcutAction) {
        match action {
            ShortcutAction::SwitchWindow => {
                // Bring the lowest toplevel to the front, cycling the stack
                let next = self
                    .surfaces
                    .by_z_order()
                    .find(|s| s.is_toplevel())
                    .map(|s| s.id());
                if let Some(id) = next {
                    self.set_minimized(id, false);
                    self.handle_window_request(WindowRequest::Raise(id));
                }
            }
            other => {
                info!("Shortcut {:?}", other);
                self.shortcut_actions.push(other);
            }
        }
    }

    // Frame cycle

    /// Paint every output that needs it, service pending screencopy frames
    /// and fire frame callbacks. Returns the number of outputs painted.
    pub fn render_frame(&mut self) -> usize {
        self.outputs.start_render();

        let mut painted = 0;
        for output in self.outputs.outputs_mut() {
            if !output.is_enabled() {
                continue;
            }
            let window_pending = output.window().needs_repaint() || output.window().screencopy_pending();
            if !window_pending {
                continue;
            }
            let geometry = output.geometry();
            let id = output.id();
            if let Err(e) = output
                .window_mut()
                .compose(geometry, &self.surfaces, &self.wallpaper, self.renderer.as_mut())
            {
                warn!("Failed to paint output {}: {:#}", output.name(), e);
                continue;
            }
            painted += 1;
            if output.window_mut().take_screencopy_pending() {
                let copied = self.screencopy.service_output(id, self.renderer.as_mut());
                trace!("Serviced {} screencopy frame(s) on {}", copied, output.name());
            }
        }

        let time = self.elapsed_ms();
        let fired = self.outputs.end_render(time);
        if fired > 0 {
            trace!("Fired {} frame callback(s)", fired);
        }
        painted
    }
}
