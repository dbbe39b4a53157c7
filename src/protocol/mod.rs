//! Client-facing Wayland protocol extensions
//!
//! Each submodule owns one protocol: its global, the bookkeeping for bound
//! resources, and the `Dispatch` impls that route requests onto
//! [`CompositorState`](crate::state::CompositorState).
//!
//! | module | interface | version |
//! |---|---|---|
//! | [`output`] | `wl_output` | 4 |
//! | [`output_management`] | `zwlr_output_manager_v1` | 2 |
//! | [`screencopy`] | `zwlr_screencopy_manager_v1` | 1 |
//! | [`relative_pointer`] | `zwp_relative_pointer_manager_v1` | 1 |
//! | [`window_management`] | `org_kde_plasma_window_management` | 15 |

pub mod output;
pub mod output_management;
pub mod relative_pointer;
pub mod screencopy;
pub mod window_management;

pub use output::{OutputGlobalData, OutputGlobals};
pub use output_management::{ConfigurationError, OutputManagementState, PendingConfiguration};
pub use relative_pointer::RelativePointers;
pub use screencopy::{ScreencopyError, ScreencopyFrame, ScreencopyState};
pub use window_management::{ControlRequest, WindowControl, WindowManagement, WindowState};

use wayland_server::{backend::GlobalId, DisplayHandle};

/// Globals created once at startup. wl_output globals come and go with
/// hotplug and live in [`OutputGlobals`].
#[derive(Debug)]
pub struct ExtensionGlobals {
    pub output_management: GlobalId,
    pub screencopy: GlobalId,
    pub relative_pointer: GlobalId,
    pub window_management: GlobalId,
}

impl ExtensionGlobals {
    pub fn create(dh: &DisplayHandle) -> Self {
        Self {
            output_management: output_management::create_global(dh),
            screencopy: screencopy::create_global(dh),
            relative_pointer: relative_pointer::create_global(dh),
            window_management: window_management::create_global(dh),
        }
    }
}
