//! # Hollywood Compositor Core
//!
//! Output, frame and protocol-extension core of the Hollywood Wayland
//! compositor.
//!
//! ## Architecture
//!
//! - `output`: outputs, the output manager (hotplug, layout, frame pacing,
//!   configuration transactions) and the per-output render/input window
//! - `protocol`: wl_output, wlr output management, wlr screencopy, relative
//!   pointer and plasma window management
//! - `state`: `CompositorState`, the owner every protocol handler works on
//! - `compositor`: socket and calloop event loop
//! - `window`: geometry and the surface registry
//! - `shortcuts`: global key bindings
//! - `render`: the renderer seam and a CPU renderer
//! - `config`: persisted display configuration and user settings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hollywood::{Compositor, CompositorConfig, PixmapRenderer, ScreenInfo};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CompositorConfig::load("/etc/hollywood/compositor.conf", "~/.config/hollywood/compositor.toml");
//!     let screens = vec![ScreenInfo::new("HEADLESS-1", 1920, 1080, 60_000)];
//!     let compositor = Compositor::new(config, screens, Box::new(PixmapRenderer::new()))?;
//!     compositor.run()
//! }
//! ```

pub mod compositor;
pub mod config;
pub mod output;
pub mod protocol;
pub mod render;
pub mod seat;
pub mod shm;
pub mod shortcuts;
pub mod state;
pub mod window;

// Re-export main types for easy access
pub use compositor::Compositor;
pub use config::CompositorConfig;
pub use output::{Output, OutputId, OutputManager, OutputWindow, ScreenInfo};
pub use render::{PixmapRenderer, Renderer};
pub use shortcuts::{KeyCombination, ShortcutAction, ShortcutManager};
pub use state::CompositorState;
pub use window::{Surface, SurfaceRegistry};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_DATE: &str = env!("BUILD_DATE");
