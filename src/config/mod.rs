//! Configuration management for Hollywood
//!
//! Two files feed the compositor:
//! - the system display configuration (`/etc/hollywood/compositor.conf`), one
//!   `[Display-<name>]` table per connector with scale, rotation, mode and position
//! - the per-user settings file with global shortcuts, remembered display
//!   preferences and the wallpaper
//!
//! Both are TOML. Invalid values are clamped to safe defaults rather than
//! refusing to start.

use crate::output::Rotation;
use crate::shortcuts::KeyCombination;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DISPLAY_CONFIG: &str = "/etc/hollywood/compositor.conf";
pub const DEFAULT_USER_CONFIG: &str = "~/.config/hollywood/compositor.toml";

/// Largest scale factor accepted from any configuration source
pub const MAX_SCALE_FACTOR: u32 = 4;

fn default_refresh() -> u32 {
    60
}

/// One `[Display-<name>]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplaySection {
    /// Falls back to the device default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<u32>,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default)]
    pub position_x: i32,
    #[serde(default)]
    pub position_y: i32,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            scale_factor: None,
            rotation: 0,
            width: 0,
            height: 0,
            refresh: default_refresh(),
            position_x: 0,
            position_y: 0,
        }
    }
}

impl DisplaySection {
    /// Configured rotation; anything outside 0/90/180/270 becomes 0
    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.rotation).unwrap_or_else(|| {
            warn!(
                "Ignoring invalid display rotation {}, using 0",
                self.rotation
            );
            Rotation::Normal
        })
    }

    /// Requested mode as (width, height, refresh in mHz), only when both
    /// dimensions are set
    pub fn mode(&self) -> Option<(i32, i32, i32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some((
            self.width as i32,
            self.height as i32,
            (self.refresh as i32).saturating_mul(1000),
        ))
    }
}

/// System display configuration keyed by `Display-<output name>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayConfig {
    sections: BTreeMap<String, DisplaySection>,
}

impl DisplayConfig {
    pub fn group_name(output_name: &str) -> String {
        format!("Display-{}", output_name)
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_home(path.as_ref())?;
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read display config: {}", path.display()))?;
        let config: DisplayConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse display config: {}", path.display()))?;
        Ok(config)
    }

    /// Load, treating a missing or broken file as an empty configuration
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No display configuration at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default display configuration", e);
                Self::default()
            }
        }
    }

    pub fn section(&self, output_name: &str) -> Option<&DisplaySection> {
        self.sections.get(&Self::group_name(output_name))
    }

    pub fn set_section(&mut self, output_name: &str, section: DisplaySection) {
        self.sections.insert(Self::group_name(output_name), section);
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).context("Failed to serialize display configuration")?;
        fs::write(path, contents).context("Failed to write display configuration")?;
        Ok(())
    }
}

/// `[GlobalShortcuts]`, combinations stored in packed form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShortcutSettings {
    #[serde(default = "ShortcutSettings::default_take_screenshot")]
    pub take_screenshot: u64,
    #[serde(default = "ShortcutSettings::default_switch_window")]
    pub switch_window: u64,
}

impl ShortcutSettings {
    fn default_take_screenshot() -> u64 {
        KeyCombination::take_screenshot_default().to_combined()
    }

    fn default_switch_window() -> u64 {
        KeyCombination::switch_window_default().to_combined()
    }
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            take_screenshot: Self::default_take_screenshot(),
            switch_window: Self::default_switch_window(),
        }
    }
}

/// `[Displays.<persistent name>]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplayPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<u32>,
    /// Unix seconds of the last time this display was connected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,
}

impl DisplayPreferences {
    /// Remembered scale clamped to 1..=4
    pub fn scale_factor(&self) -> Option<u32> {
        self.scale_factor.map(|s| s.clamp(1, MAX_SCALE_FACTOR))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WallpaperSettings {
    #[serde(default = "WallpaperSettings::default_color")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl WallpaperSettings {
    fn default_color() -> String {
        "#2e3440".to_string()
    }

    /// Parse the `#rrggbb` colour
    pub fn rgb(&self) -> Result<(u8, u8, u8)> {
        let hex = self.color.trim_start_matches('#');
        if hex.len() != 6 {
            anyhow::bail!("Invalid wallpaper color: {}", self.color);
        }
        let value = u32::from_str_radix(hex, 16)
            .with_context(|| format!("Invalid wallpaper color: {}", self.color))?;
        Ok(((value >> 16) as u8, (value >> 8) as u8, value as u8))
    }
}

impl Default for WallpaperSettings {
    fn default() -> Self {
        Self {
            color: Self::default_color(),
            path: None,
        }
    }
}

/// Per-user settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default, rename = "GlobalShortcuts")]
    pub shortcuts: ShortcutSettings,

    #[serde(default, rename = "Displays")]
    pub displays: BTreeMap<String, DisplayPreferences>,

    #[serde(default, rename = "Wallpaper")]
    pub wallpaper: WallpaperSettings,
}

impl UserConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_home(path.as_ref())?;
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read user config: {}", path.display()))?;
        let config: UserConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse user config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.wallpaper.rgb()?;
        if KeyCombination::from_combined(self.shortcuts.take_screenshot).is_none() {
            anyhow::bail!("Invalid TakeScreenshot shortcut: {}", self.shortcuts.take_screenshot);
        }
        if KeyCombination::from_combined(self.shortcuts.switch_window).is_none() {
            anyhow::bail!("Invalid SwitchWindow shortcut: {}", self.shortcuts.switch_window);
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = expand_home(path.as_ref())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize user config")?;
        fs::write(&path, contents).context("Failed to write user config")?;
        Ok(())
    }

    pub fn display(&self, persistent_name: &str) -> Option<&DisplayPreferences> {
        self.displays.get(persistent_name)
    }

    /// Record that a display was connected at `now` (unix seconds)
    pub fn touch_display(&mut self, persistent_name: &str, now: u64) {
        self.displays
            .entry(persistent_name.to_string())
            .or_default()
            .last_seen = Some(now);
    }
}

/// Both configuration sources plus where the user file lives
#[derive(Debug, Clone, Default)]
pub struct CompositorConfig {
    pub display: DisplayConfig,
    pub user: UserConfig,
    pub user_path: Option<PathBuf>,
}

impl CompositorConfig {
    /// Load both files; missing files give defaults, broken ones are logged.
    /// A user file that fails to load is never written back.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(display_path: P, user_path: Q) -> Self {
        let display = DisplayConfig::load_or_default(display_path);
        let (user, user_path) = match expand_home(user_path.as_ref()) {
            Ok(path) if path.exists() => match UserConfig::load(&path) {
                Ok(user) => {
                    info!("User configuration loaded from: {}", path.display());
                    (user, Some(path))
                }
                Err(e) => {
                    warn!("{:#}; using default user configuration, not saving", e);
                    (UserConfig::default(), None)
                }
            },
            Ok(path) => (UserConfig::default(), Some(path)),
            Err(e) => {
                warn!("{:#}; user configuration will not be saved", e);
                (UserConfig::default(), None)
            }
        };
        Self {
            display,
            user,
            user_path,
        }
    }

    /// Write the user settings back, if a location is known
    pub fn save_user(&self) -> Result<()> {
        match &self.user_path {
            Some(path) => self.user.save(path),
            None => Ok(()),
        }
    }
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
