//! Live output topology and frame cadence
//!
//! The manager owns every [`Output`] in discovery order, keeps exactly one
//! of them primary and normalizes the layout so no output sits at a negative
//! coordinate. Output configuration from clients goes through
//! [`OutputManager::apply_configuration`], which validates every head change
//! before committing any of them.

use super::{Mode, Output, OutputError, OutputId, Rotation, ScreenInfo};
use crate::config::{DisplayConfig, UserConfig};
use crate::window::{Point, SurfaceId, SurfaceRegistry};
use log::{debug, info, warn};

/// Requested mode for one head
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeChange {
    /// Index into the output's advertised modes
    Existing(usize),
    Custom(Mode),
}

/// Pending edits for a single output in a configuration transaction
#[derive(Debug, Clone, PartialEq)]
pub struct HeadChange {
    pub output: OutputId,
    pub enabled: bool,
    pub mode: Option<ModeChange>,
    pub position: Option<Point>,
    pub scale: Option<f64>,
    pub rotation: Option<Rotation>,
}

impl HeadChange {
    pub fn enable(output: OutputId) -> Self {
        Self {
            output,
            enabled: true,
            mode: None,
            position: None,
            scale: None,
            rotation: None,
        }
    }

    pub fn disable(output: OutputId) -> Self {
        Self {
            enabled: false,
            ..Self::enable(output)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub generation: u64,
    pub changed: Vec<OutputId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: OutputId,
    pub new_primary: Option<OutputId>,
    pub migrated: Vec<SurfaceId>,
}

#[derive(Debug, Default)]
pub struct OutputManager {
    outputs: Vec<Output>,
    next_id: u32,
    created: bool,
    generation: u64,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Bumped whenever the advertised configuration changes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> + '_ {
        self.outputs.iter()
    }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut Output> + '_ {
        self.outputs.iter_mut()
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id() == id)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.id() == id)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name() == name)
    }

    /// Show every output window
    pub fn present(&mut self) {
        for output in &mut self.outputs {
            output.window_mut().show();
        }
    }

    /// Enumerate the screens attached at startup. Only the first call does
    /// anything; returns whether outputs were created.
    pub fn create_for_console(
        &mut self,
        screens: Vec<ScreenInfo>,
        display: &DisplayConfig,
        user: &UserConfig,
    ) -> bool {
        if self.created {
            debug!("Outputs already created, ignoring");
            return false;
        }
        self.created = true;

        for screen in screens {
            self.add_output(screen, display, user);
        }
        self.ensure_primary();
        self.recalculate_positioning();
        self.generation += 1;
        info!("Created {} output(s)", self.outputs.len());
        true
    }

    fn add_output(&mut self, screen: ScreenInfo, display: &DisplayConfig, user: &UserConfig) -> OutputId {
        self.next_id += 1;
        let id = OutputId::new(self.next_id);
        let mut output = Output::new(id, screen);

        if let Some(section) = display.section(output.name()) {
            output.apply_display_config(section);
        }
        if let Some(prefs) = user.display(&output.persistent_name()) {
            output.apply_preferences(prefs);
        }

        let mode = output.current_mode();
        info!(
            "Output {} ({}) {}x{}@{} scale {}",
            output.name(),
            output.description(),
            mode.size.width,
            mode.size.height,
            mode.refresh,
            output.scale()
        );
        self.outputs.push(output);
        id
    }

    /// Hotplug add. The new output becomes primary when none is.
    pub fn screen_added(&mut self, screen: ScreenInfo, display: &DisplayConfig, user: &UserConfig) -> OutputId {
        let id = self.add_output(screen, display, user);
        self.ensure_primary();
        self.recalculate_positioning();
        self.generation += 1;
        id
    }

    /// Hotplug remove. A removed primary is replaced by the remaining output
    /// with the lowest id, and surfaces on the removed output move there.
    pub fn screen_removed(
        &mut self,
        name: &str,
        surfaces: &mut SurfaceRegistry,
    ) -> Result<RemovalReport, OutputError> {
        let index = self
            .outputs
            .iter()
            .position(|o| o.name() == name)
            .ok_or_else(|| OutputError::UnknownName(name.to_string()))?;
        let removed = self.outputs.remove(index);
        let removed_id = removed.id();
        info!("Output {} removed", name);

        if removed.is_primary() {
            if let Some(next) = self.outputs.iter().map(|o| o.id()).min() {
                self.set_primary(next)?;
                info!("Output {:?} elected primary", next);
            }
        }

        let new_primary = self.outputs.iter().find(|o| o.is_primary()).map(|o| o.id());
        self.recalculate_positioning();

        let migrated = match new_primary.and_then(|id| self.output(id)) {
            Some(target) => {
                let moved = surfaces.migrate_output(removed_id, target.id(), target.usable_geometry());
                if !moved.is_empty() {
                    debug!("Migrated {} surface(s) to {}", moved.len(), target.name());
                }
                moved
            }
            None => Vec::new(),
        };

        self.generation += 1;
        Ok(RemovalReport {
            removed: removed_id,
            new_primary,
            migrated,
        })
    }

    fn ensure_primary(&mut self) {
        if self.outputs.iter().any(|o| o.is_primary()) {
            return;
        }
        if let Some(first) = self.outputs.first_mut() {
            first.set_primary(true);
        }
    }

    pub fn set_primary(&mut self, id: OutputId) -> Result<(), OutputError> {
        if self.output(id).is_none() {
            return Err(OutputError::UnknownOutput(id));
        }
        for output in &mut self.outputs {
            output.set_primary(output.id() == id);
        }
        Ok(())
    }

    /// The primary output, or the first one if somehow none is flagged
    pub fn primary_output(&self) -> Option<&Output> {
        if let Some(primary) = self.outputs.iter().find(|o| o.is_primary()) {
            return Some(primary);
        }
        let first = self.outputs.first()?;
        warn!("No primary output, falling back to {}", first.name());
        Some(first)
    }

    /// First enabled output whose geometry contains `point`
    pub fn output_at(&self, point: Point) -> Option<&Output> {
        self.outputs
            .iter()
            .filter(|o| o.is_enabled())
            .find(|o| o.geometry().contains_point(point))
    }

    /// Shift configured positions so no output sits at a negative
    /// coordinate. A single output is pinned at the origin.
    pub fn recalculate_positioning(&mut self) {
        if let [only] = self.outputs.as_mut_slice() {
            only.set_position(Point::default());
            return;
        }

        let min_x = self.outputs.iter().map(|o| o.config_position().x).min().unwrap_or(0).min(0);
        let min_y = self.outputs.iter().map(|o| o.config_position().y).min().unwrap_or(0).min(0);

        for output in &mut self.outputs {
            let position = output.config_position() - Point::new(min_x, min_y);
            output.set_position(position);
        }
    }

    /// Ask every output window to repaint
    pub fn trigger_render(&mut self) {
        for output in &mut self.outputs {
            output.window_mut().request_repaint();
        }
    }

    pub fn start_render(&mut self) {
        for output in &mut self.outputs {
            output.frame_started();
        }
    }

    /// Returns how many frame callbacks fired
    pub fn end_render(&mut self, time: u32) -> usize {
        self.outputs
            .iter_mut()
            .map(|o| o.send_frame_callbacks(time))
            .sum()
    }

    /// Check a configuration without touching any output
    pub fn test_configuration(&self, changes: &[HeadChange]) -> Result<(), OutputError> {
        for change in changes {
            let output = self
                .output(change.output)
                .ok_or(OutputError::UnknownOutput(change.output))?;
            if !change.enabled {
                continue;
            }
            match change.mode {
                Some(ModeChange::Existing(index)) if index >= output.modes().len() => {
                    return Err(OutputError::UnknownMode(output.name().to_string(), index));
                }
                Some(ModeChange::Custom(mode)) if mode.size.is_empty() || mode.refresh < 0 => {
                    return Err(OutputError::InvalidMode(
                        output.name().to_string(),
                        mode.size.width,
                        mode.size.height,
                        mode.refresh,
                    ));
                }
                _ => {}
            }
            if let Some(scale) = change.scale {
                if !(scale > 0.0 && scale <= crate::config::MAX_SCALE_FACTOR as f64) {
                    return Err(OutputError::InvalidScale(scale));
                }
            }
        }

        let any_enabled = self.outputs.iter().any(|o| {
            changes
                .iter()
                .find(|c| c.output == o.id())
                .map_or(o.is_enabled(), |c| c.enabled)
        });
        if !any_enabled {
            return Err(OutputError::NoEnabledOutput);
        }
        Ok(())
    }

    /// Validate then commit every change. Either all heads change or none do.
    pub fn apply_configuration(&mut self, changes: &[HeadChange]) -> Result<ConfigurationReport, OutputError> {
        self.test_configuration(changes)?;

        let mut changed = Vec::with_capacity(changes.len());
        for change in changes {
            let output = self
                .output_mut(change.output)
                .ok_or(OutputError::UnknownOutput(change.output))?;
            output.set_enabled(change.enabled);
            if change.enabled {
                match change.mode {
                    Some(ModeChange::Existing(index)) => output.set_mode_index(index)?,
                    Some(ModeChange::Custom(mode)) => output.set_custom_mode(mode)?,
                    None => {}
                }
                if let Some(scale) = change.scale {
                    output.set_scale(scale)?;
                }
                if let Some(rotation) = change.rotation {
                    output.set_rotation(rotation);
                }
                if let Some(position) = change.position {
                    output.set_config_position(position);
                }
            }
            changed.push(change.output);
        }

        if self.primary_output().is_some_and(|o| !o.is_enabled()) {
            if let Some(next) = self.outputs.iter().filter(|o| o.is_enabled()).map(|o| o.id()).min() {
                self.set_primary(next)?;
            }
        }

        self.recalculate_positioning();
        self.generation += 1;
        info!(
            "Applied output configuration for {} head(s), generation {}",
            changed.len(),
            self.generation
        );
        Ok(ConfigurationReport {
            generation: self.generation,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplaySection;
    use crate::window::{Rectangle, Size, Surface, SurfaceRole};
    use proptest::prelude::*;

    fn configured(sections: &[(&str, i32, i32)]) -> DisplayConfig {
        let mut config = DisplayConfig::default();
        for (name, x, y) in sections {
            config.set_section(
                name,
                DisplaySection {
                    position_x: *x,
                    position_y: *y,
                    ..Default::default()
                },
            );
        }
        config
    }

    fn manager_with(screens: &[(&str, i32, i32)], display: &DisplayConfig) -> OutputManager {
        let mut manager = OutputManager::new();
        let infos = screens
            .iter()
            .map(|(name, w, h)| ScreenInfo::new(*name, *w, *h, 60_000))
            .collect();
        manager.create_for_console(infos, display, &UserConfig::default());
        manager
    }

    #[test]
    fn test_create_for_console_is_idempotent() {
        let display = DisplayConfig::default();
        let mut manager = manager_with(&[("DP-1", 1920, 1080)], &display);
        assert_eq!(manager.len(), 1);
        assert!(!manager.create_for_console(
            vec![ScreenInfo::new("DP-2", 800, 600, 60_000)],
            &display,
            &UserConfig::default()
        ));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_single_output_pinned_at_origin() {
        let display = configured(&[("DP-1", 300, -200)]);
        let manager = manager_with(&[("DP-1", 1920, 1080)], &display);
        let output = manager.output_by_name("DP-1").unwrap();
        assert_eq!(output.position(), Point::new(0, 0));
        assert!(output.is_primary());
    }

    #[test]
    fn test_negative_positions_are_shifted() {
        let display = configured(&[("DP-1", 0, 0), ("HDMI-A-1", -1280, -100)]);
        let manager = manager_with(&[("DP-1", 1920, 1080), ("HDMI-A-1", 1280, 1024)], &display);
        assert_eq!(manager.output_by_name("DP-1").unwrap().position(), Point::new(1280, 100));
        assert_eq!(manager.output_by_name("HDMI-A-1").unwrap().position(), Point::new(0, 0));
    }

    #[test]
    fn test_extreme_positions_saturate() {
        let display = configured(&[("DP-1", i32::MIN, 0), ("DP-2", i32::MAX - 10, i32::MIN)]);
        let manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);

        let first = manager.output_by_name("DP-1").unwrap();
        let second = manager.output_by_name("DP-2").unwrap();
        assert_eq!(first.position(), Point::new(0, i32::MAX));
        assert_eq!(second.position(), Point::new(i32::MAX, 0));
        assert_eq!(second.geometry().right(), i32::MAX);
        assert!(manager.output_at(Point::new(i32::MAX - 1, 10)).is_none());
    }

    #[test]
    fn test_output_at_and_primary() {
        let display = configured(&[("DP-1", 0, 0), ("DP-2", 1920, 0)]);
        let mut manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);

        let second = manager.output_by_name("DP-2").unwrap().id();
        assert_eq!(manager.output_at(Point::new(2000, 10)).map(|o| o.id()), Some(second));
        assert!(manager.output_at(Point::new(5000, 10)).is_none());

        assert_eq!(manager.primary_output().unwrap().name(), "DP-1");
        manager.set_primary(second).unwrap();
        assert_eq!(manager.primary_output().unwrap().id(), second);
        assert_eq!(manager.outputs().filter(|o| o.is_primary()).count(), 1);
        assert!(manager.set_primary(OutputId::new(99)).is_err());
    }

    #[test]
    fn test_removing_primary_elects_lowest_and_migrates() {
        let display = configured(&[("DP-1", 0, 0), ("DP-2", 1920, 0), ("DP-3", 3840, 0)]);
        let mut manager = manager_with(
            &[("DP-1", 1920, 1080), ("DP-2", 1920, 1080), ("DP-3", 1920, 1080)],
            &display,
        );
        let ids: Vec<_> = manager.outputs().map(|o| o.id()).collect();
        manager.set_primary(ids[2]).unwrap();

        let mut surfaces = SurfaceRegistry::new();
        let mut surface = Surface::new(SurfaceRole::Toplevel, Point::new(4000, 100), Size::new(400, 300));
        surface.set_primary_output(Some(ids[2]));
        let sid = surfaces.insert(surface);

        let report = manager.screen_removed("DP-3", &mut surfaces).unwrap();
        assert_eq!(report.removed, ids[2]);
        assert_eq!(report.new_primary, Some(ids[0]));
        assert_eq!(report.migrated, vec![sid]);

        let moved = surfaces.get(sid).unwrap();
        assert_eq!(moved.primary_output(), Some(ids[0]));
        assert!(Rectangle::new(0, 0, 1920, 1080).contains_rect(&moved.geometry()));
        assert_eq!(manager.outputs().filter(|o| o.is_primary()).count(), 1);

        assert!(manager.screen_removed("DP-9", &mut surfaces).is_err());
    }

    #[test]
    fn test_hotplug_bumps_generation() {
        let display = DisplayConfig::default();
        let mut manager = OutputManager::new();
        let id = manager.screen_added(ScreenInfo::new("DP-1", 800, 600, 60_000), &display, &UserConfig::default());
        assert!(manager.output(id).unwrap().is_primary());
        let generation = manager.generation();
        manager.screen_added(ScreenInfo::new("DP-2", 800, 600, 60_000), &display, &UserConfig::default());
        assert_eq!(manager.generation(), generation + 1);
        assert!(!manager.outputs().last().unwrap().is_primary());
    }

    #[test]
    fn test_apply_configuration_is_atomic() {
        let display = configured(&[("DP-1", 0, 0), ("DP-2", 1920, 0)]);
        let mut manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);
        let ids: Vec<_> = manager.outputs().map(|o| o.id()).collect();
        let before = manager.generation();

        let good = HeadChange {
            scale: Some(2.0),
            ..HeadChange::enable(ids[0])
        };
        let bad = HeadChange {
            mode: Some(ModeChange::Existing(7)),
            ..HeadChange::enable(ids[1])
        };
        assert!(manager.apply_configuration(&[good.clone(), bad]).is_err());
        assert_eq!(manager.output(ids[0]).unwrap().scale(), 1.0);
        assert_eq!(manager.generation(), before);

        let report = manager.apply_configuration(&[good]).unwrap();
        assert_eq!(report.changed, vec![ids[0]]);
        assert_eq!(report.generation, before + 1);
        assert_eq!(manager.output(ids[0]).unwrap().scale(), 2.0);
    }

    #[test]
    fn test_configuration_cannot_disable_everything() {
        let display = DisplayConfig::default();
        let manager = manager_with(&[("DP-1", 1920, 1080)], &display);
        let id = manager.outputs().next().unwrap().id();
        assert_eq!(
            manager.test_configuration(&[HeadChange::disable(id)]),
            Err(OutputError::NoEnabledOutput)
        );
        assert!(manager.test_configuration(&[HeadChange::enable(id)]).is_ok());
    }

    #[test]
    fn test_disabling_primary_moves_primary() {
        let display = configured(&[("DP-1", 0, 0), ("DP-2", 1920, 0)]);
        let mut manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);
        let ids: Vec<_> = manager.outputs().map(|o| o.id()).collect();

        manager
            .apply_configuration(&[HeadChange::disable(ids[0]), HeadChange::enable(ids[1])])
            .unwrap();
        assert_eq!(manager.primary_output().unwrap().id(), ids[1]);
        assert!(manager.output_at(Point::new(10, 10)).is_none());
    }

    #[test]
    fn test_custom_mode_and_position() {
        let display = DisplayConfig::default();
        let mut manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);
        let ids: Vec<_> = manager.outputs().map(|o| o.id()).collect();

        manager
            .apply_configuration(&[HeadChange {
                mode: Some(ModeChange::Custom(Mode::new(1280, 720, 75_000))),
                position: Some(Point::new(-1280, 0)),
                rotation: Some(Rotation::Rotate90),
                ..HeadChange::enable(ids[1])
            }])
            .unwrap();

        let output = manager.output(ids[1]).unwrap();
        assert_eq!(output.current_mode(), Mode::new(1280, 720, 75_000));
        assert_eq!(output.position(), Point::new(0, 0));
        assert_eq!(output.logical_size(), Size::new(720, 1280));
        assert_eq!(manager.output(ids[0]).unwrap().position(), Point::new(1280, 0));
    }

    #[test]
    fn test_trigger_and_render_cycle() {
        let display = DisplayConfig::default();
        let mut manager = manager_with(&[("DP-1", 1920, 1080), ("DP-2", 1920, 1080)], &display);
        manager.trigger_render();
        assert!(manager.outputs().all(|o| o.window().needs_repaint()));

        manager.present();
        assert!(manager.outputs().all(|o| o.window().is_visible()));

        assert_eq!(manager.end_render(1), 0);
        manager.start_render();
        assert_eq!(manager.end_render(2), 0);
    }

    proptest! {
        #[test]
        fn test_positions_never_negative(
            positions in proptest::collection::vec((-4000i32..4000, -4000i32..4000), 1..6)
        ) {
            let names: Vec<String> = (0..positions.len()).map(|i| format!("OUT-{}", i)).collect();
            let sections: Vec<(&str, i32, i32)> = names
                .iter()
                .zip(&positions)
                .map(|(n, (x, y))| (n.as_str(), *x, *y))
                .collect();
            let display = configured(&sections);
            let screens: Vec<(&str, i32, i32)> = names.iter().map(|n| (n.as_str(), 800, 600)).collect();
            let manager = manager_with(&screens, &display);

            for output in manager.outputs() {
                prop_assert!(output.position().x >= 0);
                prop_assert!(output.position().y >= 0);
            }
            if positions.len() == 1 {
                prop_assert_eq!(manager.outputs().next().unwrap().position(), Point::new(0, 0));
            }
        }

        #[test]
        fn test_normalized_positions_are_stable(
            positions in proptest::collection::vec((0i32..4000, 0i32..4000), 2..6)
        ) {
            let names: Vec<String> = (0..positions.len()).map(|i| format!("OUT-{}", i)).collect();
            let sections: Vec<(&str, i32, i32)> = names
                .iter()
                .zip(&positions)
                .map(|(n, (x, y))| (n.as_str(), *x, *y))
                .collect();
            let display = configured(&sections);
            let screens: Vec<(&str, i32, i32)> = names.iter().map(|n| (n.as_str(), 800, 600)).collect();
            let mut manager = manager_with(&screens, &display);

            for (output, (x, y)) in manager.outputs().zip(&positions) {
                prop_assert_eq!(output.position(), Point::new(*x, *y));
            }
            manager.recalculate_positioning();
            for (output, (x, y)) in manager.outputs().zip(&positions) {
                prop_assert_eq!(output.position(), Point::new(*x, *y));
            }
        }
    }
}
