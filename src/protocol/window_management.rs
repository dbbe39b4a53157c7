//! org_kde_plasma_window_management
//!
//! Every toplevel gets a [`WindowControl`] keyed by the surface UUID. Shell
//! clients bind the manager, receive a snapshot of every window and the
//! stacking order, then resolve windows with `get_window_by_uuid`. Client
//! requests come back as [`ControlRequest`]s; the compositor decides whether
//! to honour them and reports the outcome through the control's state.

use crate::render::encode_png;
use crate::state::CompositorState;
use crate::window::{Surface, SurfaceId, SurfaceRegistry};
use bitflags::bitflags;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Write;
use wayland_protocols_plasma::plasma_window_management::server::{
    org_kde_plasma_window::{self, OrgKdePlasmaWindow},
    org_kde_plasma_window_management::{self, OrgKdePlasmaWindowManagement},
};
use wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

pub const WINDOW_MANAGEMENT_VERSION: u32 = 15;

pub fn create_global(dh: &DisplayHandle) -> GlobalId {
    info!(
        "Supporting org_kde_plasma_window_management (protocol version {})",
        WINDOW_MANAGEMENT_VERSION
    );
    dh.create_global::<CompositorState, OrgKdePlasmaWindowManagement, _>(WINDOW_MANAGEMENT_VERSION, ())
}

bitflags! {
    /// org_kde_plasma_window_management.state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowState: u32 {
        const ACTIVE = 1 << 0;
        const MINIMIZED = 1 << 1;
        const MAXIMIZED = 1 << 2;
        const FULLSCREEN = 1 << 3;
        const KEEP_ABOVE = 1 << 4;
        const KEEP_BELOW = 1 << 5;
        const ON_ALL_DESKTOPS = 1 << 6;
        const DEMANDS_ATTENTION = 1 << 7;
        const CLOSEABLE = 1 << 8;
        const MINIMIZABLE = 1 << 9;
        const MAXIMIZABLE = 1 << 10;
        const FULLSCREENABLE = 1 << 11;
        const SKIPTASKBAR = 1 << 12;
        const SHADEABLE = 1 << 13;
        const SHADED = 1 << 14;
        const MOVABLE = 1 << 15;
        const RESIZABLE = 1 << 16;
    }
}

/// What a shell client asked a window to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Activate(bool),
    Minimize(bool),
    Maximize(bool),
    Close,
}

/// Translate a `set_state(flags, state)` request. Only the bits in `flags`
/// are meaningful; other state changes are ignored.
pub fn decode_set_state(flags: u32, state: u32) -> Vec<ControlRequest> {
    let flags = WindowState::from_bits_truncate(flags);
    let state = WindowState::from_bits_truncate(state);
    let mut requests = Vec::new();
    if flags.contains(WindowState::ACTIVE) {
        requests.push(ControlRequest::Activate(state.contains(WindowState::ACTIVE)));
    }
    if flags.contains(WindowState::MINIMIZED) {
        requests.push(ControlRequest::Minimize(state.contains(WindowState::MINIMIZED)));
    }
    if flags.contains(WindowState::MAXIMIZED) {
        requests.push(ControlRequest::Maximize(state.contains(WindowState::MAXIMIZED)));
    }
    requests
}

/// Events of a bound manager
pub trait ManagementEvents {
    fn window_with_uuid(&self, id: u32, uuid: &str);
    fn stacking_order_uuid_changed(&self, uuids: &str);
}

impl ManagementEvents for OrgKdePlasmaWindowManagement {
    fn window_with_uuid(&self, id: u32, uuid: &str) {
        if self.version() >= 13 {
            self.window_with_uuid(id, uuid.to_string());
        } else {
            self.window(id);
        }
    }

    fn stacking_order_uuid_changed(&self, uuids: &str) {
        if self.version() >= 12 {
            self.stacking_order_uuid_changed(uuids.to_string());
        }
    }
}

/// Events of a bound window
pub trait WindowEvents {
    fn initial_state(&self);
    fn title_changed(&self, title: &str);
    fn app_id_changed(&self, app_id: &str);
    fn pid_changed(&self, pid: u32);
    fn themed_icon_name_changed(&self, name: &str);
    fn state_changed(&self, flags: u32);
    fn icon_changed(&self);
    fn unmapped(&self);
}

impl WindowEvents for OrgKdePlasmaWindow {
    fn initial_state(&self) {
        self.initial_state();
    }

    fn title_changed(&self, title: &str) {
        self.title_changed(title.to_string());
    }

    fn app_id_changed(&self, app_id: &str) {
        self.app_id_changed(app_id.to_string());
    }

    fn pid_changed(&self, pid: u32) {
        self.pid_changed(pid);
    }

    fn themed_icon_name_changed(&self, name: &str) {
        self.themed_icon_name_changed(name.to_string());
    }

    fn state_changed(&self, flags: u32) {
        self.state_changed(flags);
    }

    fn icon_changed(&self) {
        self.icon_changed();
    }

    fn unmapped(&self) {
        self.unmapped();
    }
}

/// Externally visible state of one window
#[derive(Debug)]
pub struct WindowControl<W = OrgKdePlasmaWindow> {
    surface: SurfaceId,
    uuid: String,
    state: WindowState,
    mapped: bool,
    title: String,
    app_id: String,
    themed_icon: String,
    pid: u32,
    icon: Option<Vec<u8>>,
    resources: Vec<W>,
}

impl<W: WindowEvents> WindowControl<W> {
    pub fn new(surface: &Surface) -> Self {
        debug!("{}: allocating window control", surface.uuid());
        let mut state = WindowState::empty();
        state.set(WindowState::MINIMIZED, surface.minimized);
        state.set(WindowState::MAXIMIZED, surface.maximized);
        state.set(WindowState::FULLSCREEN, surface.fullscreen);
        state.set(WindowState::MINIMIZABLE, surface.can_minimize);
        state.set(WindowState::MAXIMIZABLE, surface.can_maximize);
        state.set(WindowState::CLOSEABLE, surface.can_close);
        Self {
            surface: surface.id(),
            uuid: surface.uuid().to_string(),
            state,
            mapped: true,
            title: surface.title.clone(),
            app_id: surface.app_id.clone(),
            themed_icon: surface.themed_icon.clone(),
            pid: surface.pid,
            icon: None,
            resources: Vec::new(),
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn themed_icon(&self) -> &str {
        &self.themed_icon
    }

    pub fn icon(&self) -> Option<&[u8]> {
        self.icon.as_deref()
    }

    pub fn resources(&self) -> &[W] {
        &self.resources
    }

    /// Attach a client resource and bring it up to date
    pub fn add_resource(&mut self, resource: W) {
        if self.mapped {
            resource.initial_state();
            resource.title_changed(&self.title);
            resource.pid_changed(self.pid);
            resource.app_id_changed(&self.app_id);
            resource.themed_icon_name_changed(&self.themed_icon);
            resource.state_changed(self.state.bits());
        } else {
            resource.unmapped();
        }
        self.resources.push(resource);
    }

    pub fn remove_resource_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&W) -> bool,
    {
        let before = self.resources.len();
        self.resources.retain(|r| !predicate(r));
        before - self.resources.len()
    }

    /// Update one state bit, notifying clients only when the mask changes
    fn set_state(&mut self, flag: WindowState, set: bool) -> bool {
        let mut next = self.state;
        next.set(flag, set);
        if next == self.state {
            return false;
        }
        self.state = next;
        for resource in &self.resources {
            resource.state_changed(next.bits());
        }
        true
    }

    /// Ignored once the window is unmapped
    pub fn set_active(&mut self, active: bool) -> bool {
        self.mapped && self.set_state(WindowState::ACTIVE, active)
    }

    pub fn set_minimized(&mut self, minimized: bool) -> bool {
        self.set_state(WindowState::MINIMIZED, minimized)
    }

    pub fn set_maximized(&mut self, maximized: bool) -> bool {
        self.set_state(WindowState::MAXIMIZED, maximized)
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        self.set_state(WindowState::FULLSCREEN, fullscreen)
    }

    pub fn set_minimizable(&mut self, minimizable: bool) -> bool {
        self.set_state(WindowState::MINIMIZABLE, minimizable)
    }

    pub fn set_maximizable(&mut self, maximizable: bool) -> bool {
        self.set_state(WindowState::MAXIMIZABLE, maximizable)
    }

    pub fn set_closeable(&mut self, closeable: bool) -> bool {
        self.set_state(WindowState::CLOSEABLE, closeable)
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        for resource in &self.resources {
            resource.title_changed(title);
        }
    }

    pub fn set_app_id(&mut self, app_id: &str) {
        self.app_id = app_id.to_string();
        for resource in &self.resources {
            resource.app_id_changed(app_id);
        }
    }

    pub fn set_themed_icon(&mut self, name: &str) {
        self.themed_icon = name.to_string();
        for resource in &self.resources {
            resource.themed_icon_name_changed(name);
        }
    }

    pub fn set_pid(&mut self, pid: u32) {
        if self.pid == pid {
            return;
        }
        self.pid = pid;
        for resource in &self.resources {
            resource.pid_changed(pid);
        }
    }

    /// Encoded PNG served through `get_icon`
    pub fn set_icon(&mut self, icon: Option<Vec<u8>>) {
        self.icon = icon;
        for resource in &self.resources {
            resource.icon_changed();
        }
    }

    /// Tell clients the window is gone. Only the first call has an effect.
    pub fn unmap(&mut self) {
        if !self.mapped {
            return;
        }
        self.mapped = false;
        for resource in &self.resources {
            resource.unmapped();
        }
    }

    /// Pull title, app id, icon name and state bits from the surface
    pub fn sync_from(&mut self, surface: &Surface) {
        if self.title != surface.title {
            self.set_title(&surface.title);
        }
        if self.app_id != surface.app_id {
            self.set_app_id(&surface.app_id);
        }
        if self.themed_icon != surface.themed_icon {
            self.set_themed_icon(&surface.themed_icon);
        }
        self.set_pid(surface.pid);
        self.set_minimized(surface.minimized);
        self.set_maximized(surface.maximized);
        self.set_fullscreen(surface.fullscreen);
        self.set_minimizable(surface.can_minimize);
        self.set_maximizable(surface.can_maximize);
        self.set_closeable(surface.can_close);
    }
}

/// Every bound manager and every tracked window
#[derive(Debug)]
pub struct WindowManagement<M = OrgKdePlasmaWindowManagement, W = OrgKdePlasmaWindow> {
    managers: Vec<M>,
    windows: Vec<WindowControl<W>>,
}

impl<M, W> Default for WindowManagement<M, W> {
    fn default() -> Self {
        Self {
            managers: Vec::new(),
            windows: Vec::new(),
        }
    }
}

impl<M: ManagementEvents, W: WindowEvents> WindowManagement<M, W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn managers(&self) -> &[M] {
        &self.managers
    }

    pub fn windows(&self) -> &[WindowControl<W>] {
        &self.windows
    }

    pub fn window(&self, uuid: &str) -> Option<&WindowControl<W>> {
        self.windows.iter().find(|w| w.uuid == uuid)
    }

    pub fn window_for_surface(&self, surface: SurfaceId) -> Option<&WindowControl<W>> {
        self.windows.iter().find(|w| w.surface == surface)
    }

    pub fn window_for_surface_mut(&mut self, surface: SurfaceId) -> Option<&mut WindowControl<W>> {
        self.windows.iter_mut().find(|w| w.surface == surface)
    }

    /// Control for `surface`, announcing it to every manager on creation
    pub fn create_control(&mut self, surface: &Surface) -> &mut WindowControl<W> {
        if let Some(index) = self.windows.iter().position(|w| w.surface == surface.id()) {
            return &mut self.windows[index];
        }
        for manager in &self.managers {
            manager.window_with_uuid(surface.id(), surface.uuid());
        }
        let index = self.windows.len();
        self.windows.push(WindowControl::new(surface));
        &mut self.windows[index]
    }

    /// The surface went away: unmap its control. A control that clients
    /// still hold stays around, inert, until their last resource is gone.
    pub fn surface_destroyed(&mut self, surface: SurfaceId) -> bool {
        let Some(index) = self
            .windows
            .iter()
            .position(|w| w.surface == surface && w.mapped)
        else {
            return false;
        };
        self.windows[index].unmap();
        if self.windows[index].resources.is_empty() {
            self.windows.remove(index);
        }
        true
    }

    /// Snapshot of every window followed by the stacking order
    pub fn bind_manager(&mut self, manager: M, surfaces: &SurfaceRegistry) {
        for window in self.windows.iter().filter(|w| w.mapped) {
            manager.window_with_uuid(window.surface, &window.uuid);
        }
        manager.stacking_order_uuid_changed(&self.stacking_order(surfaces));
        self.managers.push(manager);
    }

    pub fn forget_manager_where<F>(&mut self, predicate: F)
    where
        F: Fn(&M) -> bool,
    {
        self.managers.retain(|m| !predicate(m));
    }

    /// UUIDs of windows with a control, topmost first
    pub fn stacking_order(&self, surfaces: &SurfaceRegistry) -> String {
        surfaces.stacking_order_uuids(|s| self.window_for_surface(s.id()).is_some())
    }

    pub fn update_stacking_order(&self, surfaces: &SurfaceRegistry) {
        let order = self.stacking_order(surfaces);
        for manager in &self.managers {
            manager.stacking_order_uuid_changed(&order);
        }
    }

    /// Mark `active` as the only active window
    pub fn activate(&mut self, active: Option<SurfaceId>) {
        for window in &mut self.windows {
            window.set_active(Some(window.surface) == active);
        }
    }

    /// Attach `resource` to the window with `uuid`. Unknown UUIDs get an
    /// already unmapped window so a late client sees it vanish instead of
    /// failing.
    pub fn bind_window(&mut self, uuid: &str, resource: W) -> bool {
        match self.windows.iter_mut().find(|w| w.uuid == uuid) {
            Some(window) => {
                window.add_resource(resource);
                true
            }
            None => {
                debug!("Requested UUID with no window: {}", uuid);
                resource.unmapped();
                false
            }
        }
    }

    pub fn forget_window_resource_where<F>(&mut self, predicate: F)
    where
        F: Fn(&W) -> bool,
    {
        for window in &mut self.windows {
            window.remove_resource_where(&predicate);
        }
        self.windows.retain(|w| w.mapped || !w.resources.is_empty());
    }
}

/// Resource data of a bound org_kde_plasma_window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowData {
    pub uuid: String,
}

impl GlobalDispatch<OrgKdePlasmaWindowManagement, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<OrgKdePlasmaWindowManagement>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let manager = data_init.init(resource, ());
        state.window_management.bind_manager(manager, &state.surfaces);
    }
}

impl Dispatch<OrgKdePlasmaWindowManagement, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &OrgKdePlasmaWindowManagement,
        request: org_kde_plasma_window_management::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            org_kde_plasma_window_management::Request::GetWindowByUuid {
                id,
                internal_window_uuid,
            } => {
                let window = data_init.init(
                    id,
                    WindowData {
                        uuid: internal_window_uuid.clone(),
                    },
                );
                state
                    .window_management
                    .bind_window(&internal_window_uuid, window);
            }
            org_kde_plasma_window_management::Request::GetWindow { id, internal_window_id } => {
                debug!(
                    "get_window({}) is not supported, use get_window_by_uuid instead",
                    internal_window_id
                );
                let window = data_init.init(id, WindowData { uuid: String::new() });
                window.unmapped();
            }
            org_kde_plasma_window_management::Request::ShowDesktop { state: show } => {
                debug!("show_desktop({}) is not supported", show);
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &OrgKdePlasmaWindowManagement, _data: &()) {
        state
            .window_management
            .forget_manager_where(|m| m.id() == resource.id());
    }
}

impl Dispatch<OrgKdePlasmaWindow, WindowData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &OrgKdePlasmaWindow,
        request: org_kde_plasma_window::Request,
        data: &WindowData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let surface = state
            .window_management
            .window(&data.uuid)
            .filter(|w| w.is_mapped())
            .map(|w| w.surface());
        match request {
            org_kde_plasma_window::Request::SetState { flags, state: bits } => {
                if let Some(surface) = surface {
                    for request in decode_set_state(flags, bits) {
                        state.handle_control_request(surface, request);
                    }
                }
            }
            org_kde_plasma_window::Request::Close => {
                if let Some(surface) = surface {
                    state.handle_control_request(surface, ControlRequest::Close);
                }
            }
            org_kde_plasma_window::Request::GetIcon { fd } => {
                let icon = state
                    .window_management
                    .window(&data.uuid)
                    .and_then(|w| w.icon())
                    .unwrap_or_default();
                let mut file = File::from(fd);
                if let Err(e) = file.write_all(icon) {
                    warn!("Failed to send icon for {}: {}", data.uuid, e);
                }
            }
            org_kde_plasma_window::Request::SetVirtualDesktop { number } => {
                debug!("set_virtual_desktop({}) is not supported", number);
            }
            org_kde_plasma_window::Request::Destroy => {
                state
                    .window_management
                    .forget_window_resource_where(|w| w.id() == resource.id());
            }
            _ => {
                debug!("Unsupported org_kde_plasma_window request on {}", data.uuid);
            }
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &OrgKdePlasmaWindow, _data: &WindowData) {
        state
            .window_management
            .forget_window_resource_where(|w| w.id() == resource.id());
    }
}

impl CompositorState {
    /// Refresh the icon a control serves from its surface texture
    pub(crate) fn refresh_window_icon(&mut self, surface: SurfaceId) {
        let Some(texture) = self.surfaces.get(surface).and_then(|s| s.texture.as_ref()) else {
            return;
        };
        let icon = match encode_png(texture) {
            Ok(icon) => icon,
            Err(e) => {
                warn!("Failed to encode window icon: {:#}", e);
                return;
            }
        };
        if let Some(control) = self.window_management.window_for_surface_mut(surface) {
            control.set_icon(Some(icon));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{Point, Size, SurfaceRole};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        WindowWithUuid(u32, String),
        Stacking(String),
        Initial,
        Title(String),
        AppId(String),
        Pid(u32),
        ThemedIcon(String),
        State(u32),
        IconChanged,
        Unmapped,
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Recorder(Log);

    impl ManagementEvents for Recorder {
        fn window_with_uuid(&self, id: u32, uuid: &str) {
            self.0.borrow_mut().push(Event::WindowWithUuid(id, uuid.to_string()));
        }

        fn stacking_order_uuid_changed(&self, uuids: &str) {
            self.0.borrow_mut().push(Event::Stacking(uuids.to_string()));
        }
    }

    impl WindowEvents for Recorder {
        fn initial_state(&self) {
            self.0.borrow_mut().push(Event::Initial);
        }

        fn title_changed(&self, title: &str) {
            self.0.borrow_mut().push(Event::Title(title.to_string()));
        }

        fn app_id_changed(&self, app_id: &str) {
            self.0.borrow_mut().push(Event::AppId(app_id.to_string()));
        }

        fn pid_changed(&self, pid: u32) {
            self.0.borrow_mut().push(Event::Pid(pid));
        }

        fn themed_icon_name_changed(&self, name: &str) {
            self.0.borrow_mut().push(Event::ThemedIcon(name.to_string()));
        }

        fn state_changed(&self, flags: u32) {
            self.0.borrow_mut().push(Event::State(flags));
        }

        fn icon_changed(&self) {
            self.0.borrow_mut().push(Event::IconChanged);
        }

        fn unmapped(&self) {
            self.0.borrow_mut().push(Event::Unmapped);
        }
    }

    type Management = WindowManagement<Recorder, Recorder>;

    fn registry_with(n: usize) -> (SurfaceRegistry, Vec<SurfaceId>) {
        let mut registry = SurfaceRegistry::new();
        let ids = (0..n)
            .map(|i| {
                let mut surface = Surface::new(
                    SurfaceRole::Toplevel,
                    Point::new(i as i32 * 10, 0),
                    Size::new(100, 100),
                );
                surface.title = format!("window {}", i);
                registry.insert(surface)
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_snapshot_on_bind() {
        let (registry, ids) = registry_with(3);
        let mut management = Management::new();
        for id in &ids {
            management.create_control(registry.get(*id).unwrap());
        }
        // Creating twice must not duplicate the window
        management.create_control(registry.get(ids[0]).unwrap());

        let log: Log = Rc::default();
        management.bind_manager(Recorder(log.clone()), &registry);

        let events = log.borrow();
        assert_eq!(events.len(), 4);
        for (event, id) in events.iter().zip(&ids) {
            let uuid = registry.get(*id).unwrap().uuid().to_string();
            assert_eq!(*event, Event::WindowWithUuid(*id, uuid));
        }
        let expected = ids
            .iter()
            .rev()
            .map(|id| registry.get(*id).unwrap().uuid())
            .collect::<Vec<_>>()
            .join(";");
        assert_eq!(events[3], Event::Stacking(expected));
    }

    #[test]
    fn test_new_window_announced_to_bound_managers() {
        let (registry, ids) = registry_with(1);
        let mut management = Management::new();
        let log: Log = Rc::default();
        management.bind_manager(Recorder(log.clone()), &registry);
        assert_eq!(*log.borrow(), vec![Event::Stacking(String::new())]);

        management.create_control(registry.get(ids[0]).unwrap());
        assert!(matches!(log.borrow()[1], Event::WindowWithUuid(id, _) if id == ids[0]));
    }

    #[test]
    fn test_set_active_twice_sends_one_event() {
        let (registry, ids) = registry_with(1);
        let mut management = Management::new();
        let control = management.create_control(registry.get(ids[0]).unwrap());
        let log: Log = Rc::default();
        control.add_resource(Recorder(log.clone()));
        log.borrow_mut().clear();

        assert!(control.set_active(true));
        assert!(!control.set_active(true));
        let states: Vec<_> = log
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::State(_)))
            .cloned()
            .collect();
        assert_eq!(states.len(), 1);
        assert!(control.state().contains(WindowState::ACTIVE));
    }

    #[test]
    fn test_bind_sends_initial_events() {
        let (mut registry, ids) = registry_with(1);
        {
            let surface = registry.get_mut(ids[0]).unwrap();
            surface.app_id = "org.example.App".into();
            surface.themed_icon = "utilities-terminal".into();
            surface.pid = 42;
        }
        let uuid = registry.get(ids[0]).unwrap().uuid().to_string();
        let mut management = Management::new();
        management.create_control(registry.get(ids[0]).unwrap());

        let log: Log = Rc::default();
        assert!(management.bind_window(&uuid, Recorder(log.clone())));
        let events = log.borrow();
        assert_eq!(events[0], Event::Initial);
        assert_eq!(events[1], Event::Title("window 0".into()));
        assert_eq!(events[2], Event::Pid(42));
        assert_eq!(events[3], Event::AppId("org.example.App".into()));
        assert_eq!(events[4], Event::ThemedIcon("utilities-terminal".into()));
        let default_bits = (WindowState::CLOSEABLE | WindowState::MINIMIZABLE | WindowState::MAXIMIZABLE).bits();
        assert_eq!(events[5], Event::State(default_bits));
    }

    #[test]
    fn test_unknown_uuid_gets_unmapped_placeholder() {
        let mut management = Management::new();
        let log: Log = Rc::default();
        assert!(!management.bind_window("no-such-window", Recorder(log.clone())));
        assert_eq!(*log.borrow(), vec![Event::Unmapped]);
    }

    #[test]
    fn test_unmap_sent_once_and_stops_active() {
        let (registry, ids) = registry_with(2);
        let mut management = Management::new();
        let control = management.create_control(registry.get(ids[0]).unwrap());
        let log: Log = Rc::default();
        control.add_resource(Recorder(log.clone()));
        log.borrow_mut().clear();

        control.unmap();
        control.unmap();
        assert!(!control.set_active(true));
        assert_eq!(*log.borrow(), vec![Event::Unmapped]);

        management.create_control(registry.get(ids[1]).unwrap());
        assert!(management.surface_destroyed(ids[1]));
        assert!(!management.surface_destroyed(ids[1]));
        assert!(management.window_for_surface(ids[1]).is_none());
    }

    #[test]
    fn test_destroyed_surface_keeps_inert_control_while_bound() {
        let (registry, ids) = registry_with(1);
        let mut management = Management::new();
        let uuid = registry.get(ids[0]).unwrap().uuid().to_string();
        management.create_control(registry.get(ids[0]).unwrap());

        let log: Log = Rc::default();
        assert!(management.bind_window(&uuid, Recorder(log.clone())));
        log.borrow_mut().clear();

        assert!(management.surface_destroyed(ids[0]));
        assert_eq!(*log.borrow(), vec![Event::Unmapped]);
        let control = management.window(&uuid).unwrap();
        assert!(!control.is_mapped());

        // Hidden from new managers
        let manager_log: Log = Rc::default();
        management.bind_manager(Recorder(manager_log.clone()), &SurfaceRegistry::new());
        assert_eq!(*manager_log.borrow(), vec![Event::Stacking(String::new())]);

        management.activate(Some(ids[0]));
        assert_eq!(*log.borrow(), vec![Event::Unmapped]);

        management.forget_window_resource_where(|r| Rc::ptr_eq(&r.0, &log));
        assert!(management.window(&uuid).is_none());
    }

    #[test]
    fn test_title_and_icon_broadcast() {
        let (mut registry, ids) = registry_with(1);
        let mut management = Management::new();
        let control = management.create_control(registry.get(ids[0]).unwrap());
        let log: Log = Rc::default();
        control.add_resource(Recorder(log.clone()));
        log.borrow_mut().clear();

        control.set_icon(Some(vec![1, 2, 3]));
        assert_eq!(control.icon(), Some(&[1u8, 2, 3][..]));

        let surface = registry.get_mut(ids[0]).unwrap();
        surface.title = "renamed".into();
        surface.maximized = true;
        control.sync_from(surface);

        let events = log.borrow();
        assert_eq!(events[0], Event::IconChanged);
        assert_eq!(events[1], Event::Title("renamed".into()));
        assert!(matches!(events[2], Event::State(bits) if bits & WindowState::MAXIMIZED.bits() != 0));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_activate_is_exclusive() {
        let (registry, ids) = registry_with(2);
        let mut management = Management::new();
        for id in &ids {
            management.create_control(registry.get(*id).unwrap());
        }
        management.activate(Some(ids[1]));
        assert!(!management.window_for_surface(ids[0]).unwrap().state().contains(WindowState::ACTIVE));
        assert!(management.window_for_surface(ids[1]).unwrap().state().contains(WindowState::ACTIVE));
        management.activate(Some(ids[0]));
        assert!(!management.window_for_surface(ids[1]).unwrap().state().contains(WindowState::ACTIVE));
    }

    #[test]
    fn test_decode_set_state_honours_flags() {
        let requests = decode_set_state(
            (WindowState::ACTIVE | WindowState::MINIMIZED).bits(),
            (WindowState::MINIMIZED | WindowState::MAXIMIZED).bits(),
        );
        assert_eq!(
            requests,
            vec![ControlRequest::Activate(false), ControlRequest::Minimize(true)]
        );
        assert!(decode_set_state(WindowState::CLOSEABLE.bits(), 0).is_empty());
    }
}
