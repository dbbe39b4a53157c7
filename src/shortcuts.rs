//! Global keyboard shortcuts
//!
//! A flat table from key combination to [`ShortcutAction`]. Multimedia keys
//! are always bound; the screenshot and window-switch combinations come from
//! the user's `[GlobalShortcuts]` settings and are rebuilt on every reload.

use crate::config::ShortcutSettings;
use bitflags::bitflags;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use xkbcommon::xkb::keysyms;

bitflags! {
    /// Modifier state, same bits as the xkb real modifier mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 2;
        const ALT = 1 << 3;
        const SUPER = 1 << 6;
    }
}

/// A keysym plus the modifiers held with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombination {
    pub modifiers: Modifiers,
    pub keysym: u32,
}

impl KeyCombination {
    pub const fn new(modifiers: Modifiers, keysym: u32) -> Self {
        Self { modifiers, keysym }
    }

    pub const fn key(keysym: u32) -> Self {
        Self::new(Modifiers::empty(), keysym)
    }

    pub fn take_screenshot_default() -> Self {
        Self::key(keysyms::KEY_Print)
    }

    pub fn switch_window_default() -> Self {
        Self::new(Modifiers::ALT, keysyms::KEY_Tab)
    }

    /// Pack as `modifiers << 32 | keysym`
    pub fn to_combined(&self) -> u64 {
        ((self.modifiers.bits() as u64) << 32) | self.keysym as u64
    }

    /// Inverse of [`to_combined`](Self::to_combined). Unknown modifier bits
    /// or a zero keysym make the value invalid.
    pub fn from_combined(value: u64) -> Option<Self> {
        let modifiers = Modifiers::from_bits((value >> 32) as u32)?;
        let keysym = value as u32;
        if keysym == 0 {
            return None;
        }
        Some(Self::new(modifiers, keysym))
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, flag) in [
            ("Ctrl", Modifiers::CTRL),
            ("Alt", Modifiers::ALT),
            ("Shift", Modifiers::SHIFT),
            ("Super", Modifiers::SUPER),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{:#06x}", self.keysym)
    }
}

/// What a bound shortcut does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortcutAction {
    BrightnessUp,
    BrightnessDown,
    KeyboardBrightnessUp,
    KeyboardBrightnessDown,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    LaunchBrowser,
    LaunchSearch,
    TakeScreenshot,
    SwitchWindow,
}

/// Receives the action of a matched shortcut
pub trait ShortcutHandler {
    fn handle_shortcut(&mut self, action: ShortcutAction);
}

impl<F: FnMut(ShortcutAction)> ShortcutHandler for F {
    fn handle_shortcut(&mut self, action: ShortcutAction) {
        self(action)
    }
}

const MEDIA_KEYS: [(u32, ShortcutAction); 9] = [
    (keysyms::KEY_XF86MonBrightnessUp, ShortcutAction::BrightnessUp),
    (keysyms::KEY_XF86MonBrightnessDown, ShortcutAction::BrightnessDown),
    (keysyms::KEY_XF86KbdBrightnessUp, ShortcutAction::KeyboardBrightnessUp),
    (keysyms::KEY_XF86KbdBrightnessDown, ShortcutAction::KeyboardBrightnessDown),
    (keysyms::KEY_XF86AudioRaiseVolume, ShortcutAction::VolumeUp),
    (keysyms::KEY_XF86AudioLowerVolume, ShortcutAction::VolumeDown),
    (keysyms::KEY_XF86AudioMute, ShortcutAction::VolumeMute),
    (keysyms::KEY_XF86WWW, ShortcutAction::LaunchBrowser),
    (keysyms::KEY_XF86Search, ShortcutAction::LaunchSearch),
];

#[derive(Debug, Default)]
pub struct ShortcutManager {
    table: HashMap<KeyCombination, ShortcutAction>,
}

impl ShortcutManager {
    pub fn new(settings: &ShortcutSettings) -> Self {
        let mut manager = Self::default();
        manager.reload_config(settings);
        manager
    }

    /// Rebuild the table from scratch
    pub fn reload_config(&mut self, settings: &ShortcutSettings) {
        self.table.clear();

        for (keysym, action) in MEDIA_KEYS {
            self.table.insert(KeyCombination::key(keysym), action);
        }

        let screenshot = KeyCombination::from_combined(settings.take_screenshot).unwrap_or_else(|| {
            warn!("Invalid TakeScreenshot shortcut {}, using default", settings.take_screenshot);
            KeyCombination::take_screenshot_default()
        });
        let switch = KeyCombination::from_combined(settings.switch_window).unwrap_or_else(|| {
            warn!("Invalid SwitchWindow shortcut {}, using default", settings.switch_window);
            KeyCombination::switch_window_default()
        });
        self.table.insert(screenshot, ShortcutAction::TakeScreenshot);
        self.table.insert(switch, ShortcutAction::SwitchWindow);

        info!("Loaded {} global shortcuts", self.table.len());
    }

    pub fn bind(&mut self, combo: KeyCombination, action: ShortcutAction) {
        self.table.insert(combo, action);
    }

    pub fn action_for(&self, combo: KeyCombination) -> Option<ShortcutAction> {
        self.table.get(&combo).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Run the action bound to `combo`. Returns true when the key press was
    /// consumed and must not reach a client.
    pub fn check_and_handle_combo<H>(&self, combo: KeyCombination, handler: &mut H) -> bool
    where
        H: ShortcutHandler + ?Sized,
    {
        match self.action_for(combo) {
            Some(action) => {
                debug!("Shortcut {} -> {:?}", combo, action);
                handler.handle_shortcut(action);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_roundtrip_and_rejects_garbage() {
        let combo = KeyCombination::new(Modifiers::CTRL | Modifiers::SHIFT, keysyms::KEY_s);
        assert_eq!(KeyCombination::from_combined(combo.to_combined()), Some(combo));

        assert_eq!(KeyCombination::from_combined(0), None);
        assert_eq!(KeyCombination::from_combined(1u64 << 40 | 0x61), None);
    }

    #[test]
    fn test_default_table() {
        let manager = ShortcutManager::new(&ShortcutSettings::default());
        assert_eq!(manager.len(), MEDIA_KEYS.len() + 2);
        assert_eq!(
            manager.action_for(KeyCombination::key(keysyms::KEY_Print)),
            Some(ShortcutAction::TakeScreenshot)
        );
        assert_eq!(
            manager.action_for(KeyCombination::new(Modifiers::ALT, keysyms::KEY_Tab)),
            Some(ShortcutAction::SwitchWindow)
        );
        assert_eq!(
            manager.action_for(KeyCombination::key(keysyms::KEY_XF86AudioMute)),
            Some(ShortcutAction::VolumeMute)
        );
    }

    #[test]
    fn test_check_and_handle_invokes_once() {
        let manager = ShortcutManager::new(&ShortcutSettings::default());
        let mut seen = Vec::new();

        let consumed = manager.check_and_handle_combo(
            KeyCombination::key(keysyms::KEY_XF86MonBrightnessUp),
            &mut |action: ShortcutAction| seen.push(action),
        );
        assert!(consumed);
        assert_eq!(seen, vec![ShortcutAction::BrightnessUp]);

        let consumed = manager.check_and_handle_combo(
            KeyCombination::key(keysyms::KEY_a),
            &mut |action: ShortcutAction| seen.push(action),
        );
        assert!(!consumed);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_modifiers_must_match_exactly() {
        let manager = ShortcutManager::new(&ShortcutSettings::default());
        let mut count = 0;
        let consumed = manager.check_and_handle_combo(
            KeyCombination::key(keysyms::KEY_Tab),
            &mut |_: ShortcutAction| count += 1,
        );
        assert!(!consumed);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reload_replaces_user_bindings() {
        let mut manager = ShortcutManager::new(&ShortcutSettings::default());
        let custom = KeyCombination::new(Modifiers::SUPER, keysyms::KEY_s);
        manager.reload_config(&ShortcutSettings {
            take_screenshot: custom.to_combined(),
            ..Default::default()
        });

        let mut hits = Vec::new();
        assert!(!manager.check_and_handle_combo(
            KeyCombination::key(keysyms::KEY_Print),
            &mut |a: ShortcutAction| hits.push(a)
        ));
        assert!(manager.check_and_handle_combo(custom, &mut |a: ShortcutAction| hits.push(a)));
        assert_eq!(hits, vec![ShortcutAction::TakeScreenshot]);
    }

    #[test]
    fn test_display_names_modifiers() {
        let combo = KeyCombination::switch_window_default();
        assert_eq!(combo.to_string(), format!("Alt+{:#06x}", keysyms::KEY_Tab));
    }
}
