//! # Hollywood compositor
//!
//! Runs the compositor core headless on a set of virtual screens, painting
//! with the CPU renderer. Screens are given as `NAME:WIDTHxHEIGHT[@HZ]`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use hollywood::{Compositor, CompositorConfig, PixmapRenderer, ScreenInfo};
use log::{error, info};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hollywood-compositor")]
#[command(about = "Output, frame and protocol-extension core of the Hollywood Wayland compositor")]
#[command(version)]
struct Cli {
    /// Path to the display configuration
    #[arg(short, long, default_value = "/etc/hollywood/compositor.conf")]
    config: String,

    /// Path to the user settings
    #[arg(short, long, default_value = "~/.config/hollywood/compositor.toml")]
    user_config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Virtual screen as NAME:WIDTHxHEIGHT[@HZ], may be repeated
    #[arg(short, long = "output", value_parser = parse_screen)]
    outputs: Vec<ScreenInfo>,

    /// Frame interval in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_interval_ms: u64,
}

fn parse_screen(value: &str) -> Result<ScreenInfo> {
    let (name, mode) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("expected NAME:WIDTHxHEIGHT[@HZ], got {}", value))?;
    let (size, refresh) = match mode.split_once('@') {
        Some((size, hz)) => (size, hz.parse::<f64>().context("invalid refresh rate")?),
        None => (mode, 60.0),
    };
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {}", size))?;
    let width: i32 = width.parse().context("invalid width")?;
    let height: i32 = height.parse().context("invalid height")?;
    if name.is_empty() || width <= 0 || height <= 0 || refresh <= 0.0 {
        return Err(anyhow!("invalid screen {}", value));
    }
    Ok(ScreenInfo::new(name, width, height, (refresh * 1000.0).round() as i32))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting Hollywood compositor");
    info!(
        "📄 Version: {} (built {}{})",
        hollywood::VERSION,
        hollywood::BUILD_DATE,
        option_env!("GIT_COMMIT")
            .map(|c| format!(", {}", c))
            .unwrap_or_default()
    );

    let config = CompositorConfig::load(&cli.config, &cli.user_config);

    let screens = if cli.outputs.is_empty() {
        vec![ScreenInfo::new("HEADLESS-1", 1920, 1080, 60_000)]
    } else {
        cli.outputs
    };

    let compositor = Compositor::new(config, screens, Box::new(PixmapRenderer::new()))?
        .with_frame_interval(Duration::from_millis(cli.frame_interval_ms.max(1)));

    if let Err(e) = compositor.run() {
        error!("❌ Compositor error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
