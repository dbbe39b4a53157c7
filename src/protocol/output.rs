//! wl_output globals, one per live output

use crate::output::{Output, OutputId};
use crate::state::CompositorState;
use log::{debug, info};
use std::collections::HashMap;
use wayland_server::{
    backend::{ClientId, GlobalId},
    protocol::wl_output,
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

pub const OUTPUT_VERSION: u32 = 4;

/// Global data and resource data of every wl_output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputGlobalData {
    pub output: OutputId,
}

#[derive(Debug, Default)]
pub struct OutputGlobals {
    globals: HashMap<OutputId, GlobalId>,
    resources: Vec<(OutputId, wl_output::WlOutput)>,
}

impl OutputGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `output` unless it already is
    pub fn advertise(&mut self, dh: &DisplayHandle, output: &Output) {
        if self.globals.contains_key(&output.id()) {
            return;
        }
        let global = dh.create_global::<CompositorState, wl_output::WlOutput, _>(
            OUTPUT_VERSION,
            OutputGlobalData { output: output.id() },
        );
        info!("Advertising wl_output {} (protocol version {})", output.name(), OUTPUT_VERSION);
        self.globals.insert(output.id(), global);
    }

    /// Stop advertising and forget bound resources. Bound clients keep inert
    /// objects until they release them.
    pub fn withdraw(&mut self, dh: &DisplayHandle, output: OutputId) {
        if let Some(global) = self.globals.remove(&output) {
            dh.remove_global::<CompositorState>(global);
            debug!("Removed wl_output global for {:?}", output);
        }
        self.resources.retain(|(id, _)| *id != output);
    }

    pub fn is_advertised(&self, output: OutputId) -> bool {
        self.globals.contains_key(&output)
    }

    /// Output behind a client's wl_output, if it still exists
    pub fn resolve(resource: &wl_output::WlOutput) -> Option<OutputId> {
        resource.data::<OutputGlobalData>().map(|d| d.output)
    }

    /// Re-send the mutable state of `output` to every bound resource
    pub fn send_state(&self, output: &Output) {
        for (_, resource) in self.resources.iter().filter(|(id, _)| *id == output.id()) {
            send_output_state(resource, output);
        }
    }

    fn track(&mut self, output: OutputId, resource: wl_output::WlOutput) {
        self.resources.push((output, resource));
    }

    fn forget(&mut self, resource: &wl_output::WlOutput) {
        self.resources.retain(|(_, r)| r.id() != resource.id());
    }
}

/// Everything a freshly bound resource gets: the mutable state plus name and
/// description, then done. Name is only ever sent here.
pub fn send_bind_state(resource: &wl_output::WlOutput, output: &Output) {
    send_properties(resource, output);
    if resource.version() >= 4 {
        resource.name(output.name().to_string());
        resource.description(output.description());
    }
    if resource.version() >= 2 {
        resource.done();
    }
}

/// geometry, modes and scale, then done
pub fn send_output_state(resource: &wl_output::WlOutput, output: &Output) {
    send_properties(resource, output);
    if resource.version() >= 2 {
        resource.done();
    }
}

fn send_properties(resource: &wl_output::WlOutput, output: &Output) {
    let position = output.position();
    let physical = output.physical_size();
    resource.geometry(
        position.x,
        position.y,
        physical.width,
        physical.height,
        wl_output::Subpixel::Unknown,
        output.make().to_string(),
        output.model().to_string(),
        output.rotation().to_transform(),
    );

    let current = output.current_mode_index();
    let preferred = output.preferred_mode_index();
    for (index, mode) in output.modes().iter().enumerate() {
        let mut flags = wl_output::Mode::empty();
        if index == current {
            flags |= wl_output::Mode::Current;
        }
        if index == preferred {
            flags |= wl_output::Mode::Preferred;
        }
        resource.mode(flags, mode.size.width, mode.size.height, mode.refresh);
    }

    if resource.version() >= 2 {
        resource.scale(output.scale().ceil() as i32);
    }
}

impl GlobalDispatch<wl_output::WlOutput, OutputGlobalData> for CompositorState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_output::WlOutput>,
        global_data: &OutputGlobalData,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let resource = data_init.init(resource, *global_data);
        match state.outputs.output(global_data.output) {
            Some(output) => {
                send_bind_state(&resource, output);
                state.output_globals.track(global_data.output, resource);
            }
            None => debug!("wl_output bound after {:?} was removed", global_data.output),
        }
    }
}

impl Dispatch<wl_output::WlOutput, OutputGlobalData> for CompositorState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_output::WlOutput,
        request: wl_output::Request,
        _data: &OutputGlobalData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_output::Request::Release = request {
            state.output_globals.forget(resource);
        }
    }

    fn destroyed(state: &mut Self, _client: ClientId, resource: &wl_output::WlOutput, _data: &OutputGlobalData) {
        state.output_globals.forget(resource);
    }
}
