//! Wayland socket and event loop
//!
//! The [`Compositor`] binds a listening socket, builds the
//! [`CompositorState`] and drives it from a calloop event loop: one timer
//! accepts and dispatches clients, another paints a frame per tick.

use crate::config::CompositorConfig;
use crate::output::ScreenInfo;
use crate::render::Renderer;
use crate::state::CompositorState;
use anyhow::{anyhow, Context, Result};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopSignal};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wayland_server::{
    backend::{ClientData, ClientId, DisconnectReason},
    Display, ListeningSocket,
};

const DISPATCH_INTERVAL: Duration = Duration::from_millis(4);

/// Default frame pacing, about 60 Hz
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

struct ClientState;

impl ClientData for ClientState {
    fn initialized(&self, client_id: ClientId) {
        debug!("Client {:?} connected", client_id);
    }

    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        debug!("Client {:?} disconnected: {:?}", client_id, reason);
    }
}

pub struct Compositor {
    display: Display<CompositorState>,
    socket: ListeningSocket,
    socket_name: String,
    state: CompositorState,
    event_loop: EventLoop<'static, CompositorState>,
    frame_interval: Duration,
}

impl Compositor {
    /// Bind a `wayland-N` socket and enumerate `screens` as the startup
    /// outputs
    pub fn new(
        config: CompositorConfig,
        screens: Vec<ScreenInfo>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self> {
        info!("🏗️ Initializing Hollywood compositor core...");
        let display: Display<CompositorState> = Display::new().context("Failed to create wayland display")?;
        let mut state = CompositorState::new(&display.handle(), config, renderer);
        state.create_for_console(screens);
        state.present();

        let socket = ListeningSocket::bind_auto("wayland", 1..32).context("Failed to bind wayland socket")?;
        let socket_name = socket
            .socket_name()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("Listening socket has no name"))?;

        let event_loop = EventLoop::try_new().context("Failed to create event loop")?;

        info!("✅ Listening on {} with {} output(s)", socket_name, state.outputs().len());
        Ok(Self {
            display,
            socket,
            socket_name,
            state,
            event_loop,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        })
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    pub fn state(&self) -> &CompositorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CompositorState {
        &mut self.state
    }

    /// Handle for stopping [`run`](Self::run) from elsewhere
    pub fn loop_signal(&self) -> LoopSignal {
        self.event_loop.get_signal()
    }

    /// Serve clients until the loop is stopped
    pub fn run(self) -> Result<()> {
        let Compositor {
            mut display,
            socket,
            socket_name,
            mut state,
            mut event_loop,
            frame_interval,
        } = self;

        std::env::set_var("WAYLAND_DISPLAY", &socket_name);
        info!("🎬 Starting event loop, WAYLAND_DISPLAY={}", socket_name);

        let handle = event_loop.handle();
        let mut display_handle = display.handle();

        handle
            .insert_source(
                Timer::from_duration(DISPATCH_INTERVAL),
                move |_deadline: Instant, _meta: &mut (), state: &mut CompositorState| {
                    loop {
                        match socket.accept() {
                            Ok(Some(stream)) => {
                                if let Err(e) = display_handle.insert_client(stream, Arc::new(ClientState)) {
                                    warn!("Failed to add client: {}", e);
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!("Failed to accept client: {}", e);
                                break;
                            }
                        }
                    }

                    if let Err(e) = display.dispatch_clients(state) {
                        error!("Failed to dispatch clients: {}", e);
                    }
                    if let Err(e) = display.flush_clients() {
                        debug!("Failed to flush clients: {}", e);
                    }
                    TimeoutAction::ToDuration(DISPATCH_INTERVAL)
                },
            )
            .map_err(|_| anyhow!("Failed to register dispatch timer"))?;

        handle
            .insert_source(
                Timer::from_duration(frame_interval),
                move |_deadline: Instant, _meta: &mut (), state: &mut CompositorState| {
                    state.render_frame();
                    TimeoutAction::ToDuration(frame_interval)
                },
            )
            .map_err(|_| anyhow!("Failed to register frame timer"))?;

        event_loop
            .run(None, &mut state, |_| {})
            .context("Event loop failed")?;

        info!("🛑 Event loop finished");
        Ok(())
    }
}
