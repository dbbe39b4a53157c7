//! Integration tests for the compositor state
//!
//! These drive `CompositorState` through its public API the way the shell
//! and the input backend do: hotplug, pointer grabs, window control,
//! shortcuts and the frame cycle. No client connects, so the protocol
//! sides only see their bookkeeping.

use hollywood::{
    config::{DisplayConfig, DisplaySection},
    output::FrameCallback,
    protocol::{ControlRequest, WindowState},
    window::{Point, Size, SurfaceRole},
    CompositorConfig, CompositorState, KeyCombination, PixmapRenderer, ScreenInfo, ShortcutAction,
    Surface,
};
use std::cell::RefCell;
use std::rc::Rc;
use wayland_server::Display;

fn side_by_side() -> CompositorConfig {
    let mut display = DisplayConfig::default();
    display.set_section(
        "DP-2",
        DisplaySection {
            position_x: 1920,
            ..DisplaySection::default()
        },
    );
    CompositorConfig {
        display,
        ..CompositorConfig::default()
    }
}

fn state_with(config: CompositorConfig, screens: Vec<ScreenInfo>) -> (Display<CompositorState>, CompositorState) {
    let display: Display<CompositorState> = Display::new().unwrap();
    let mut state = CompositorState::new(&display.handle(), config, Box::new(PixmapRenderer::new()));
    state.create_for_console(screens);
    state.present();
    (display, state)
}

fn two_screens() -> (Display<CompositorState>, CompositorState) {
    state_with(
        side_by_side(),
        vec![
            ScreenInfo::new("DP-1", 1920, 1080, 60_000),
            ScreenInfo::new("DP-2", 1920, 1080, 60_000),
        ],
    )
}

fn toplevel(x: i32, y: i32) -> Surface {
    Surface::new(SurfaceRole::Toplevel, Point::new(x, y), Size::new(200, 150))
}

struct Recorder(Rc<RefCell<Vec<u32>>>);

impl FrameCallback for Recorder {
    fn done(self: Box<Self>, time: u32) {
        self.0.borrow_mut().push(time);
    }
}

#[test]
fn test_startup_layout_and_primary() {
    let (_display, state) = two_screens();

    let outputs = state.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs.primary_output().unwrap().name(), "DP-1");
    assert_eq!(outputs.output_by_name("DP-2").unwrap().position(), Point::new(1920, 0));
    assert_eq!(
        outputs.output_at(Point::new(2000, 10)).unwrap().name(),
        "DP-2"
    );
}

#[test]
fn test_surfaces_land_on_the_output_under_them() {
    let (_display, mut state) = two_screens();

    let left = state.add_surface(toplevel(100, 100));
    let right = state.add_surface(toplevel(2100, 100));

    let dp1 = state.outputs().output_by_name("DP-1").unwrap().id();
    let dp2 = state.outputs().output_by_name("DP-2").unwrap().id();
    assert_eq!(state.surfaces().get(left).unwrap().primary_output(), Some(dp1));
    assert_eq!(state.surfaces().get(right).unwrap().primary_output(), Some(dp2));
}

#[test]
fn test_unplugging_primary_migrates_surfaces() {
    let (_display, mut state) = two_screens();
    let surface = state.add_surface(toplevel(100, 100));

    let report = state.screen_removed("DP-1").unwrap();
    let dp2 = state.outputs().output_by_name("DP-2").unwrap().id();

    assert_eq!(report.new_primary, Some(dp2));
    assert!(report.migrated.contains(&surface));
    assert!(state.outputs().output(dp2).unwrap().is_primary());
    // The only remaining output is pinned at the origin
    assert_eq!(state.outputs().output(dp2).unwrap().position(), Point::default());
    assert_eq!(state.surfaces().get(surface).unwrap().primary_output(), Some(dp2));

    assert!(state.screen_removed("DP-1").is_err());
}

#[test]
fn test_hotplugged_screen_is_laid_out() {
    let (_display, mut state) = state_with(
        side_by_side(),
        vec![ScreenInfo::new("DP-1", 1920, 1080, 60_000)],
    );
    let before = state.outputs().generation();

    let id = state.screen_added(ScreenInfo::new("DP-2", 2560, 1440, 144_000));

    assert!(state.outputs().generation() > before);
    let output = state.outputs().output(id).unwrap();
    assert!(!output.is_primary());
    assert_eq!(output.position(), Point::new(1920, 0));
}

#[test]
fn test_move_grab_follows_pointer() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));

    state.pointer_motion(Point::new(150, 150));
    state.pointer_press(true);
    assert_eq!(state.active_surface(), Some(id));

    state.pointer_motion(Point::new(250, 200));
    assert_eq!(state.surfaces().get(id).unwrap().position(), Point::new(200, 150));

    state.pointer_release(false);
    state.pointer_motion(Point::new(400, 400));
    assert_eq!(state.surfaces().get(id).unwrap().position(), Point::new(200, 150));
}

#[test]
fn test_grab_keeps_motion_across_outputs() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(1800, 100));

    state.pointer_motion(Point::new(1850, 150));
    state.pointer_press(true);
    state.pointer_motion(Point::new(2050, 150));
    state.pointer_release(false);

    assert_eq!(state.surfaces().get(id).unwrap().position(), Point::new(2000, 100));
}

#[test]
fn test_window_control_minimize_and_activate() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));

    let control = state.window_management().window_for_surface(id).unwrap();
    assert!(control.is_mapped());
    assert!(!control.state().contains(WindowState::MINIMIZED));

    state.handle_control_request(id, ControlRequest::Minimize(true));
    assert!(state.surfaces().get(id).unwrap().minimized);
    let control = state.window_management().window_for_surface(id).unwrap();
    assert!(control.state().contains(WindowState::MINIMIZED));

    state.handle_control_request(id, ControlRequest::Activate(true));
    assert!(!state.surfaces().get(id).unwrap().minimized);
    assert_eq!(state.active_surface(), Some(id));
    let control = state.window_management().window_for_surface(id).unwrap();
    assert!(control.state().contains(WindowState::ACTIVE));
    assert!(!control.state().contains(WindowState::MINIMIZED));
}

#[test]
fn test_maximize_fills_output_and_restores() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));

    state.handle_control_request(id, ControlRequest::Maximize(true));
    let surface = state.surfaces().get(id).unwrap();
    assert!(surface.maximized);
    assert_eq!(surface.position(), Point::new(0, 0));
    assert_eq!(surface.size(), Size::new(1920, 1080));

    state.handle_control_request(id, ControlRequest::Maximize(false));
    let surface = state.surfaces().get(id).unwrap();
    assert!(!surface.maximized);
    assert_eq!(surface.position(), Point::new(100, 100));
    assert_eq!(surface.size(), Size::new(200, 150));
}

#[test]
fn test_close_is_queued_for_the_shell() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));

    state.handle_control_request(id, ControlRequest::Close);
    assert_eq!(state.take_close_requests(), vec![id]);
    assert!(state.take_close_requests().is_empty());
    assert!(state.surfaces().get(id).is_some());
}

#[test]
fn test_removed_surface_loses_its_control() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));
    let uuid = state.surfaces().get(id).unwrap().uuid().to_string();

    state.remove_surface(id);

    assert!(state.window_management().window(&uuid).is_none());
    assert_eq!(state.active_surface(), None);
}

#[test]
fn test_stacking_order_tracks_raise() {
    let (_display, mut state) = two_screens();
    let a = state.add_surface(toplevel(100, 100));
    let b = state.add_surface(toplevel(150, 150));
    let uuid_a = state.surfaces().get(a).unwrap().uuid().to_string();
    let uuid_b = state.surfaces().get(b).unwrap().uuid().to_string();

    let order = state.window_management().stacking_order(state.surfaces());
    assert_eq!(order, format!("{};{}", uuid_b, uuid_a));

    state.handle_control_request(a, ControlRequest::Activate(true));
    let order = state.window_management().stacking_order(state.surfaces());
    assert_eq!(order, format!("{};{}", uuid_a, uuid_b));
}

#[test]
fn test_shortcuts_are_consumed() {
    let (_display, mut state) = two_screens();
    let a = state.add_surface(toplevel(100, 100));
    let _b = state.add_surface(toplevel(150, 150));

    // Alt+Tab brings the bottom window forward
    assert!(state.key_press(KeyCombination::switch_window_default()));
    assert_eq!(state.active_surface(), Some(a));

    assert!(state.key_press(KeyCombination::take_screenshot_default()));
    assert_eq!(state.take_shortcut_actions(), vec![ShortcutAction::TakeScreenshot]);

    assert!(!state.key_press(KeyCombination::key(xkbcommon::xkb::keysyms::KEY_a)));
    assert!(state.take_shortcut_actions().is_empty());
}

#[test]
fn test_frame_cycle_paints_and_fires_callbacks() {
    let (_display, mut state) = two_screens();
    let id = state.add_surface(toplevel(100, 100));

    let fired = Rc::new(RefCell::new(Vec::new()));
    assert!(state.queue_frame_callback(id, Box::new(Recorder(fired.clone()))));

    assert_eq!(state.render_frame(), 2);
    assert_eq!(fired.borrow().len(), 1);

    // Nothing changed, so nothing is painted
    assert_eq!(state.render_frame(), 0);
    assert_eq!(fired.borrow().len(), 1);
}
