//! wlr-output-management-unstable-v1
//!
//! Every bound manager mirrors the output set as heads and modes. A client
//! configuration is accumulated in a [`PendingConfiguration`] and handed to
//! [`OutputManager::apply_configuration`](crate::output::OutputManager::apply_configuration)
//! as one transaction: either every head changes or none does. Successful
//! applies bump the configuration serial and every manager gets the new
//! state followed by `done`.

use crate::output::manager::ModeChange;
use crate::output::{HeadChange, Mode, Output, OutputId, OutputManager, Rotation};
use crate::state::CompositorState;
use crate::window::Point;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use wayland_protocols_wlr::output_management::v1::server::{
    zwlr_output_configuration_head_v1::{self, ZwlrOutputConfigurationHeadV1},
    zwlr_output_configuration_v1::{self, ZwlrOutputConfigurationV1},
    zwlr_output_head_v1::{self, ZwlrOutputHeadV1},
    zwlr_output_manager_v1::{self, ZwlrOutputManagerV1},
    zwlr_output_mode_v1::{self, ZwlrOutputModeV1},
};
use wayland_server::{
    backend::{ClientId, GlobalId},
    protocol::wl_output,
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum,
};

/// Version 2 adds make, model and serial_number on heads
pub const OUTPUT_MANAGER_VERSION: u32 = 2;

pub fn create_global(dh: &DisplayHandle) -> GlobalId {
    info!(
        "Supporting zwlr_output_manager_v1 (protocol version {})",
        OUTPUT_MANAGER_VERSION
    );
    dh.create_global::<CompositorState, ZwlrOutputManagerV1, _>(OUTPUT_MANAGER_VERSION, ())
}

/// Serial sent in `done` for a configuration generation
pub fn serial_for(generation: u64) -> u32 {
    generation as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("head has already been configured")]
    AlreadyConfiguredHead,
    #[error("head has not been configured")]
    UnconfiguredHead,
    #[error("configuration has already been applied or tested")]
    AlreadyUsed,
    #[error("property has already been set")]
    AlreadySet,
    #[error("mode does not belong to this head")]
    InvalidMode,
    #[error("invalid custom mode")]
    InvalidCustomMode,
    #[error("invalid transform")]
    InvalidTransform,
    #[error("invalid scale")]
    InvalidScale,
}

/// Which object a [`ConfigurationError`] is posted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Configuration(zwlr_output_configuration_v1::Error),
    Head(zwlr_output_configuration_head_v1::Error),
}

impl ConfigurationError {
    pub fn code(&self) -> ErrorCode {
        use zwlr_output_configuration_head_v1::Error as HeadError;
        use zwlr_output_configuration_v1::Error as ConfigError;
        match self {
            ConfigurationError::AlreadyConfiguredHead => ErrorCode::Configuration(ConfigError::AlreadyConfiguredHead),
            ConfigurationError::UnconfiguredHead => ErrorCode::Configuration(ConfigError::UnconfiguredHead),
            ConfigurationError::AlreadyUsed => ErrorCode::Configuration(ConfigError::AlreadyUsed),
            ConfigurationError::AlreadySet => ErrorCode::Head(HeadError::AlreadySet),
            ConfigurationError::InvalidMode => ErrorCode::Head(HeadError::InvalidMode),
            ConfigurationError::InvalidCustomMode => ErrorCode::Head(HeadError::InvalidCustomMode),
            ConfigurationError::InvalidTransform => ErrorCode::Head(HeadError::InvalidTransform),
            ConfigurationError::InvalidScale => ErrorCode::Head(HeadError::InvalidScale),
        }
    }
}

/// Client edits accumulated before `apply` or `test`
#[derive(Debug, Default)]
pub struct PendingConfiguration {
    heads: Vec<HeadChange>,
    used: bool,
}

impl PendingConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    fn configure(&mut self, output: OutputId, enabled: bool) -> Result<(), ConfigurationError> {
        if self.used {
            return Err(ConfigurationError::AlreadyUsed);
        }
        if self.heads.iter().any(|h| h.output == output) {
            return Err(ConfigurationError::AlreadyConfiguredHead);
        }
        self.heads.push(if enabled {
            HeadChange::enable(output)
        } else {
            HeadChange::disable(output)
        });
        Ok(())
    }

    pub fn enable_head(&mut self, output: OutputId) -> Result<(), ConfigurationError> {
        self.configure(output, true)
    }

    pub fn disable_head(&mut self, output: OutputId) -> Result<(), ConfigurationError> {
        self.configure(output, false)
    }

    fn head_mut(&mut self, output: OutputId) -> Result<&mut HeadChange, ConfigurationError> {
        if self.used {
            return Err(ConfigurationError::AlreadyUsed);
        }
        self.heads
            .iter_mut()
            .find(|h| h.output == output)
            .ok_or(ConfigurationError::UnconfiguredHead)
    }

    /// `mode_output` is the output the mode object was advertised for
    pub fn set_mode(&mut self, output: OutputId, mode_output: OutputId, index: usize) -> Result<(), ConfigurationError> {
        let head = self.head_mut(output)?;
        if head.mode.is_some() {
            return Err(ConfigurationError::AlreadySet);
        }
        if mode_output != output {
            return Err(ConfigurationError::InvalidMode);
        }
        head.mode = Some(ModeChange::Existing(index));
        Ok(())
    }

    pub fn set_custom_mode(
        &mut self,
        output: OutputId,
        width: i32,
        height: i32,
        refresh: i32,
    ) -> Result<(), ConfigurationError> {
        let head = self.head_mut(output)?;
        if head.mode.is_some() {
            return Err(ConfigurationError::AlreadySet);
        }
        if width <= 0 || height <= 0 || refresh < 0 {
            return Err(ConfigurationError::InvalidCustomMode);
        }
        head.mode = Some(ModeChange::Custom(Mode::new(width, height, refresh)));
        Ok(())
    }

    pub fn set_position(&mut self, output: OutputId, x: i32, y: i32) -> Result<(), ConfigurationError> {
        let head = self.head_mut(output)?;
        if head.position.is_some() {
            return Err(ConfigurationError::AlreadySet);
        }
        head.position = Some(Point::new(x, y));
        Ok(())
    }

    pub fn set_transform(
        &mut self,
        output: OutputId,
        transform: WEnum<wl_output::Transform>,
    ) -> Result<(), ConfigurationError> {
        let head = self.head_mut(output)?;
        if head.rotation.is_some() {
            return Err(ConfigurationError::AlreadySet);
        }
        let rotation = match transform {
            WEnum::Value(t) => Rotation::from_transform(t),
            WEnum::Unknown(_) => None,
        }
        .ok_or(ConfigurationError::InvalidTransform)?;
        head.rotation = Some(rotation);
        Ok(())
    }

    pub fn set_scale(&mut self, output: OutputId, scale: f64) -> Result<(), ConfigurationError> {
        let head = self.head_mut(output)?;
        if head.scale.is_some() {
            return Err(ConfigurationError::AlreadySet);
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigurationError::InvalidScale);
        }
        head.scale = Some(scale);
        Ok(())
    }

    /// Close the transaction. Every live output must have been enabled or
    /// disabled.
    pub fn finish<I>(&mut self, outputs: I) -> Result<Vec<HeadChange>, ConfigurationError>
    where
        I: IntoIterator<Item = OutputId>,
    {
        if self.used {
            return Err(ConfigurationError::AlreadyUsed);
        }
        self.used = true;
        for output in outputs {
            if !self.heads.iter().any(|h| h.output == output) {
                return Err(ConfigurationError::UnconfiguredHead);
            }
        }
        Ok(std::mem::take(&mut self.heads))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadData {
    pub output: OutputId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeData {
    pub output: OutputId,
    pub index: usize,
}

#[derive(Debug)]
pub struct ConfigurationData {
    serial: u32,
    pending: Arc<Mutex<PendingConfiguration>>,
}

#[derive(Debug)]
pub struct ConfigurationHeadData {
    output: OutputId,
    pending: Arc<Mutex<PendingConfiguration>>,
}

#[derive(Debug)]
struct AdvertisedHead {
    output: OutputId,
    head: ZwlrOutputHeadV1,
    modes: Vec<ZwlrOutputModeV1>,
}

impl AdvertisedHead {
    fn finish(&self) {
        for mode in &self.modes {
            mode.finished();
        }
        self.head.finished();
    }

    /// Advertise modes the head does not know yet, then the mutable state
    fn send_state(&mut self, dh: &DisplayHandle, client: &Client, output: &Output) {
        for index in self.modes.len()..output.modes().len() {
            let mode = output.modes()[index];
            match client.create_resource::<ZwlrOutputModeV1, _, CompositorState>(
                dh,
                self.head.version(),
                ModeData {
                    output: output.id(),
                    index,
                },
            ) {
                Ok(resource) => {
                    self.head.mode(&resource);
                    resource.size(mode.size.width, mode.size.height);
                    if mode.refresh > 0 {
                        resource.refresh(mode.refresh);
                    }
                    if index == output.preferred_mode_index() {
                        resource.preferred();
                    }
                    self.modes.push(resource);
                }
                Err(e) => {
                    warn!("Failed to create output mode object: {}", e);
                    return;
                }
            }
        }

        self.head.enabled(output.is_enabled() as i32);
        if output.is_enabled() {
            if let Some(current) = self.modes.get(output.current_mode_index()) {
                self.head.current_mode(current);
            }
            let position = output.position();
            self.head.position(position.x, position.y);
            self.head.transform(output.rotation().to_transform());
            self.head.scale(output.scale());
        }
    }
}

#[derive(Debug)]
struct BoundManager {
    manager: ZwlrOutputManagerV1,
    heads: Vec<AdvertisedHead>,
    stopped: bool,
}

impl BoundManager {
    fn advertise_head(&mut self, dh: &DisplayHandle, client: &Client, output: &Output) {
        let head = match client.create_resource::<ZwlrOutputHeadV1, _, CompositorState>(
            dh,
            self.manager.version(),
            HeadData { output: output.id() },
        ) {
            Ok(head) => head,
            Err(e) => {
                warn!("Failed to create output head object: {}", e);
                return;
            }
        };
        self.manager.head(&head);
        head.name(output.name().to_string());
        head.description(output.description());
        let physical = output.physical_size();
        if physical.width > 0 && physical.height > 0 {
            head.physical_size(physical.width, physical.height);
        }
        if head.version() >= 2 {
            if !output.make().is_empty() {
                head.make(output.make().to_string());
            }
            if !output.model().is_empty() {
                head.model(output.model().to_string());
            }
            if !output.serial().is_empty() {
                head.serial_number(output.serial().to_string());
            }
        }

        let mut advertised = AdvertisedHead {
            output: output.id(),
            head,
            modes: Vec::new(),
        };
        advertised.send_state(dh, client, output);
        self.heads.push(advertised);
    }

    /// Bring this manager's heads in line with `outputs` and send `done`
    fn sync(&mut self, dh: &DisplayHandle, outputs: &OutputManager) {
        if self.stopped {
            return;
        }
        let Some(client) = self.manager.client() else {
            return;
        };

        self.heads.retain(|h| {
            let alive = outputs.output(h.output).is_some();
            if !alive {
                h.finish();
            }
            alive
        });

        for output in outputs.outputs() {
            match self.heads.iter_mut().find(|h| h.output == output.id()) {
                Some(head) => head.send_state(dh, &client, output),
                None => self.advertise_head(dh, &client, output),
            }
        }
        self.manager.done(serial_for(outputs.generation()));
    }
}

/// Every bound output manager
#[derive(Debug, Default)]
pub struct OutputManagementState {
    managers: Vec<BoundManager>,
}

impl OutputManagementState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Push the current configuration to every manager
    pub fn broadcast(&mut self, dh: &DisplayHandle, outputs: &OutputManager) {
        for manager in &mut self.managers {
            manager.sync(dh, outputs);
        }
    }

    fn forget(&mut self, manager: &ZwlrOutputManagerV1) {
        self.managers.retain(|m| m.manager.id() != manager.id());
    }
}

impl GlobalDispatch<ZwlrOutputManagerV1, ()> for CompositorState {
    fn bind(
        state: &mut Self,
        handle: &DisplayHandle,
        _client: &Client,
        resource: New<ZwlrOutputManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let manager = data_init.init(resource, ());
        let mut bound = BoundManager {
            manager,
            heads: Vec::new(),
            stopped: false,
        };
        bound.sync(handle, &state.outputs);
        state.output_management.managers.push(bound);
    }
}

impl Dispatch<ZwlrOutputManagerV1, ()> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwlrOutputManagerV1,
        request: zwlr_output_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_manager_v1::Request::CreateConfiguration { id, serial } => {
                data_init.init(
                    id,
                    ConfigurationData {
                        serial,
                        pending: Arc::new(Mutex::new(PendingConfiguration::new())),
                    },
                );
            }
            zwlr_output_manager_v1::Request::Stop => {
                if let Some(bound) = state
                    .output_management
                    .managers
                    .iter_mut()
                    .find(|m| m.manager.id() == resource.id())
                {
                    bound.stopped = true;
                }
                resource.finished();
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &ZwlrOutputManagerV1, _data: &()) {
        state.output_management.forget(resource);
    }
}

impl Dispatch<ZwlrOutputHeadV1, HeadData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &ZwlrOutputHeadV1,
        _request: zwlr_output_head_v1::Request,
        _data: &HeadData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

impl Dispatch<ZwlrOutputModeV1, ModeData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &ZwlrOutputModeV1,
        _request: zwlr_output_mode_v1::Request,
        _data: &ModeData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

fn post_configuration_error(
    configuration: &ZwlrOutputConfigurationV1,
    head: Option<&ZwlrOutputConfigurationHeadV1>,
    error: ConfigurationError,
) {
    match (error.code(), head) {
        (ErrorCode::Head(code), Some(head)) => head.post_error(code, error.to_string()),
        (ErrorCode::Configuration(code), _) => configuration.post_error(code, error.to_string()),
        (ErrorCode::Head(_), None) => {
            warn!("Head error {} without a head object", error);
        }
    }
}

impl CompositorState {
    fn finish_configuration(
        &mut self,
        resource: &ZwlrOutputConfigurationV1,
        data: &ConfigurationData,
        apply: bool,
    ) {
        let outputs: Vec<OutputId> = self.outputs.outputs().map(|o| o.id()).collect();
        let changes = match data.pending.lock().finish(outputs) {
            Ok(changes) => changes,
            Err(e) => {
                post_configuration_error(resource, None, e);
                return;
            }
        };

        if data.serial != serial_for(self.outputs.generation()) {
            debug!(
                "Output configuration serial {} is stale (current {})",
                data.serial,
                serial_for(self.outputs.generation())
            );
            resource.cancelled();
            return;
        }

        if !apply {
            match self.outputs.test_configuration(&changes) {
                Ok(()) => resource.succeeded(),
                Err(e) => {
                    debug!("Output configuration test failed: {}", e);
                    resource.failed();
                }
            }
            return;
        }

        match self.outputs.apply_configuration(&changes) {
            Ok(report) => {
                resource.succeeded();
                self.configuration_changed(&report.changed);
            }
            Err(e) => {
                info!("Rejected output configuration: {}", e);
                resource.failed();
            }
        }
    }
}

impl Dispatch<ZwlrOutputConfigurationV1, ConfigurationData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &ZwlrOutputConfigurationV1,
        request: zwlr_output_configuration_v1::Request,
        data: &ConfigurationData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_configuration_v1::Request::EnableHead { id, head } => {
                let Some(output) = head.data::<HeadData>().map(|d| d.output) else {
                    data_init.post_error(
                        id,
                        zwlr_output_configuration_v1::Error::AlreadyConfiguredHead,
                        "unknown head",
                    );
                    return;
                };
                let result = data.pending.lock().enable_head(output);
                let config_head = data_init.init(
                    id,
                    ConfigurationHeadData {
                        output,
                        pending: data.pending.clone(),
                    },
                );
                if let Err(e) = result {
                    post_configuration_error(resource, Some(&config_head), e);
                }
            }
            zwlr_output_configuration_v1::Request::DisableHead { head } => {
                if let Some(output) = head.data::<HeadData>().map(|d| d.output) {
                    if let Err(e) = data.pending.lock().disable_head(output) {
                        post_configuration_error(resource, None, e);
                    }
                }
            }
            zwlr_output_configuration_v1::Request::Apply => {
                state.finish_configuration(resource, data, true);
            }
            zwlr_output_configuration_v1::Request::Test => {
                state.finish_configuration(resource, data, false);
            }
            zwlr_output_configuration_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<ZwlrOutputConfigurationHeadV1, ConfigurationHeadData> for CompositorState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &ZwlrOutputConfigurationHeadV1,
        request: zwlr_output_configuration_head_v1::Request,
        data: &ConfigurationHeadData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let mut pending = data.pending.lock();
        let result = match request {
            zwlr_output_configuration_head_v1::Request::SetMode { mode } => match mode.data::<ModeData>() {
                Some(mode) => pending.set_mode(data.output, mode.output, mode.index),
                None => Err(ConfigurationError::InvalidMode),
            },
            zwlr_output_configuration_head_v1::Request::SetCustomMode { width, height, refresh } => {
                pending.set_custom_mode(data.output, width, height, refresh)
            }
            zwlr_output_configuration_head_v1::Request::SetPosition { x, y } => {
                pending.set_position(data.output, x, y)
            }
            zwlr_output_configuration_head_v1::Request::SetTransform { transform } => {
                pending.set_transform(data.output, transform)
            }
            zwlr_output_configuration_head_v1::Request::SetScale { scale } => {
                pending.set_scale(data.output, scale)
            }
            _ => Ok(()),
        };
        drop(pending);

        match result {
            Ok(()) => {}
            Err(ConfigurationError::AlreadyUsed) => {
                debug!("Ignoring head property on a finished configuration");
            }
            Err(ConfigurationError::UnconfiguredHead) => {
                debug!("Head property for {:?} after a rejected enable", data.output);
            }
            Err(e) => resource.post_error(
                match e.code() {
                    ErrorCode::Head(code) => code as u32,
                    ErrorCode::Configuration(code) => code as u32,
                },
                e.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: OutputId = OutputId::new(1);
    const B: OutputId = OutputId::new(2);

    #[test]
    fn test_each_head_configured_once() {
        let mut pending = PendingConfiguration::new();
        pending.enable_head(A).unwrap();
        assert_eq!(pending.enable_head(A), Err(ConfigurationError::AlreadyConfiguredHead));
        assert_eq!(pending.disable_head(A), Err(ConfigurationError::AlreadyConfiguredHead));
        pending.disable_head(B).unwrap();
    }

    #[test]
    fn test_properties_set_once() {
        let mut pending = PendingConfiguration::new();
        pending.enable_head(A).unwrap();
        pending.set_position(A, 10, 20).unwrap();
        assert_eq!(pending.set_position(A, 0, 0), Err(ConfigurationError::AlreadySet));
        pending.set_scale(A, 1.5).unwrap();
        assert_eq!(pending.set_scale(A, 2.0), Err(ConfigurationError::AlreadySet));
        pending.set_mode(A, A, 0).unwrap();
        assert_eq!(
            pending.set_custom_mode(A, 800, 600, 0),
            Err(ConfigurationError::AlreadySet)
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut pending = PendingConfiguration::new();
        pending.enable_head(A).unwrap();
        assert_eq!(pending.set_mode(A, B, 0), Err(ConfigurationError::InvalidMode));
        assert_eq!(
            pending.set_custom_mode(A, 0, 600, 60_000),
            Err(ConfigurationError::InvalidCustomMode)
        );
        assert_eq!(pending.set_scale(A, 0.0), Err(ConfigurationError::InvalidScale));
        assert_eq!(pending.set_scale(A, f64::NAN), Err(ConfigurationError::InvalidScale));
        assert_eq!(
            pending.set_transform(A, WEnum::Value(wl_output::Transform::Flipped90)),
            Err(ConfigurationError::InvalidTransform)
        );
        assert_eq!(
            pending.set_transform(A, WEnum::Unknown(42)),
            Err(ConfigurationError::InvalidTransform)
        );
        pending
            .set_transform(A, WEnum::Value(wl_output::Transform::_270))
            .unwrap();
    }

    #[test]
    fn test_finish_requires_every_head() {
        let mut pending = PendingConfiguration::new();
        pending.enable_head(A).unwrap();
        assert_eq!(pending.finish([A, B]), Err(ConfigurationError::UnconfiguredHead));
        assert!(pending.is_used());
        assert_eq!(pending.finish([A]), Err(ConfigurationError::AlreadyUsed));
        assert_eq!(pending.set_position(A, 0, 0), Err(ConfigurationError::AlreadyUsed));
    }

    #[test]
    fn test_finish_yields_head_changes() {
        let mut pending = PendingConfiguration::new();
        pending.enable_head(A).unwrap();
        pending.set_custom_mode(A, 1280, 720, 60_000).unwrap();
        pending.set_position(A, -1280, 0).unwrap();
        pending.disable_head(B).unwrap();

        let changes = pending.finish([A, B]).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].mode, Some(ModeChange::Custom(Mode::new(1280, 720, 60_000))));
        assert_eq!(changes[0].position, Some(Point::new(-1280, 0)));
        assert!(!changes[1].enabled);
    }

    #[test]
    fn test_error_codes_target_right_object() {
        assert_eq!(
            ConfigurationError::AlreadyUsed.code(),
            ErrorCode::Configuration(zwlr_output_configuration_v1::Error::AlreadyUsed)
        );
        assert_eq!(
            ConfigurationError::InvalidScale.code(),
            ErrorCode::Head(zwlr_output_configuration_head_v1::Error::InvalidScale)
        );
    }

    #[test]
    fn test_pending_feeds_output_manager() {
        use crate::config::{DisplayConfig, UserConfig};
        use crate::output::ScreenInfo;

        let mut outputs = OutputManager::new();
        outputs.create_for_console(
            vec![
                ScreenInfo::new("DP-1", 1920, 1080, 60_000),
                ScreenInfo::new("DP-2", 1920, 1080, 60_000),
            ],
            &DisplayConfig::default(),
            &UserConfig::default(),
        );
        let ids: Vec<_> = outputs.outputs().map(|o| o.id()).collect();
        let serial = serial_for(outputs.generation());

        let mut pending = PendingConfiguration::new();
        pending.enable_head(ids[0]).unwrap();
        pending.set_scale(ids[0], 2.0).unwrap();
        pending.disable_head(ids[1]).unwrap();
        let changes = pending.finish(ids.clone()).unwrap();

        let report = outputs.apply_configuration(&changes).unwrap();
        assert_ne!(serial_for(report.generation), serial);
        assert_eq!(outputs.output(ids[0]).unwrap().scale(), 2.0);
        assert!(!outputs.output(ids[1]).unwrap().is_enabled());
    }
}
