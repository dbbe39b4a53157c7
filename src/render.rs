//! Composition backend
//!
//! [`Renderer`] is the seam to whatever paints outputs. The compositor core
//! only needs to draw wallpaper, shadows, decorations and surface textures,
//! and to read pixels back for screencopy. [`PixmapRenderer`] implements it
//! on the CPU with tiny-skia, which is what the headless daemon uses.

use crate::config::WallpaperSettings;
use crate::window::{
    Rectangle, Surface, Texture, BORDER_SIZE, DECORATION_SIZE, SHADOW_SIZE,
};
use anyhow::{anyhow, Context, Result};
use log::debug;
use std::fs::File;
use std::path::Path;
use tiny_skia::{Color, Paint, Pixmap, PixmapPaint, PixmapRef, Rect, Transform};

#[cfg(test)]
use mockall::automock;

/// Background painted under every output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallpaper {
    pub color: (u8, u8, u8),
    pub image: Option<Texture>,
}

impl Default for Wallpaper {
    fn default() -> Self {
        Self {
            color: (0x2e, 0x34, 0x40),
            image: None,
        }
    }
}

impl Wallpaper {
    pub fn from_settings(settings: &WallpaperSettings) -> Result<Self> {
        let color = settings.rgb()?;
        let image = match &settings.path {
            Some(path) => Some(load_png(path)?),
            None => None,
        };
        Ok(Self { color, image })
    }
}

/// Decode a PNG into premultiplied RGBA
pub fn load_png<P: AsRef<Path>>(path: P) -> Result<Texture> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Failed to read PNG header: {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .with_context(|| format!("Failed to decode PNG: {}", path.display()))?;
    buf.truncate(info.buffer_size());

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 0xff])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 0xff]).collect(),
        other => return Err(anyhow!("Unsupported PNG color type {:?}", other)),
    };

    debug!("Loaded {}x{} image from {}", info.width, info.height, path.display());
    Texture::new(info.width, info.height, premultiply(rgba))
        .ok_or_else(|| anyhow!("PNG size mismatch: {}", path.display()))
}

/// Straight alpha to premultiplied, in place
pub fn premultiply(mut rgba: Vec<u8>) -> Vec<u8> {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    rgba
}

/// Encode a premultiplied texture as a straight-alpha RGBA PNG
pub fn encode_png(texture: &Texture) -> Result<Vec<u8>> {
    let mut straight = texture.data.clone();
    for px in straight.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
        }
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, texture.width, texture.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().context("Failed to write PNG header")?;
        writer
            .write_image_data(&straight)
            .context("Failed to encode PNG")?;
    }
    Ok(out)
}

/// Paints one output at a time
#[cfg_attr(test, automock)]
pub trait Renderer {
    /// Start painting `output` (global coordinates)
    fn begin_frame(&mut self, output: Rectangle) -> Result<()>;

    fn draw_wallpaper(&mut self, wallpaper: &Wallpaper) -> Result<()>;

    fn draw_shadow(&mut self, rect: Rectangle) -> Result<()>;

    fn draw_decoration(&mut self, surface: &Surface) -> Result<()>;

    fn draw_surface(&mut self, surface: &Surface) -> Result<()>;

    /// Premultiplied RGBA for `region` (global coordinates) of the frame
    /// being painted
    fn read_pixels(&mut self, region: Rectangle) -> Result<Vec<u8>>;

    /// True when [`read_pixels`](Self::read_pixels) returns rows bottom-up
    fn y_inverted(&self) -> bool {
        false
    }
}

/// CPU renderer backed by a tiny-skia pixmap
pub struct PixmapRenderer {
    pixmap: Option<Pixmap>,
    origin: (i32, i32),
}

impl Default for PixmapRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PixmapRenderer {
    pub fn new() -> Self {
        Self {
            pixmap: None,
            origin: (0, 0),
        }
    }

    fn pixmap(&mut self) -> Result<&mut Pixmap> {
        self.pixmap
            .as_mut()
            .ok_or_else(|| anyhow!("begin_frame was not called"))
    }

    fn local_rect(&self, rect: Rectangle) -> Option<Rect> {
        Rect::from_xywh(
            (rect.x - self.origin.0) as f32,
            (rect.y - self.origin.1) as f32,
            rect.width as f32,
            rect.height as f32,
        )
    }

    fn fill(&mut self, rect: Rectangle, rgba: (u8, u8, u8, u8)) -> Result<()> {
        let Some(local) = self.local_rect(rect) else {
            return Ok(());
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(rgba.0, rgba.1, rgba.2, rgba.3);
        paint.anti_alias = false;
        self.pixmap()?
            .fill_rect(local, &paint, Transform::identity(), None);
        Ok(())
    }

    fn blit(&mut self, texture: &Texture, x: i32, y: i32, scale: Option<(f32, f32)>) -> Result<()> {
        let (ox, oy) = self.origin;
        let src = PixmapRef::from_bytes(&texture.data, texture.width, texture.height)
            .ok_or_else(|| anyhow!("invalid texture {}x{}", texture.width, texture.height))?;
        let transform = match scale {
            Some((sx, sy)) => Transform::from_scale(sx, sy),
            None => Transform::identity(),
        };
        self.pixmap
            .as_mut()
            .ok_or_else(|| anyhow!("begin_frame was not called"))?
            .draw_pixmap(x - ox, y - oy, src, &PixmapPaint::default(), transform, None);
        Ok(())
    }
}

impl Renderer for PixmapRenderer {
    fn begin_frame(&mut self, output: Rectangle) -> Result<()> {
        let (w, h) = (output.width.max(1) as u32, output.height.max(1) as u32);
        let reuse = matches!(&self.pixmap, Some(p) if p.width() == w && p.height() == h);
        if !reuse {
            self.pixmap =
                Some(Pixmap::new(w, h).ok_or_else(|| anyhow!("cannot allocate {}x{} frame", w, h))?);
        }
        self.origin = (output.x, output.y);
        self.pixmap()?.fill(Color::TRANSPARENT);
        Ok(())
    }

    fn draw_wallpaper(&mut self, wallpaper: &Wallpaper) -> Result<()> {
        let (r, g, b) = wallpaper.color;
        self.pixmap()?.fill(Color::from_rgba8(r, g, b, 0xff));
        if let Some(image) = &wallpaper.image {
            let (fw, fh) = {
                let pixmap = self.pixmap()?;
                (pixmap.width() as f32, pixmap.height() as f32)
            };
            let scale = (fw / image.width as f32, fh / image.height as f32);
            let (ox, oy) = self.origin;
            self.blit(image, ox, oy, Some(scale))?;
        }
        Ok(())
    }

    fn draw_shadow(&mut self, rect: Rectangle) -> Result<()> {
        let grown = Rectangle::new(
            rect.x - SHADOW_SIZE / 2,
            rect.y - SHADOW_SIZE / 4,
            rect.width + SHADOW_SIZE,
            rect.height + SHADOW_SIZE,
        );
        self.fill(grown, (0, 0, 0, 0x40))
    }

    fn draw_decoration(&mut self, surface: &Surface) -> Result<()> {
        let deco = surface.decorated_rect();
        self.fill(deco, (0x80, 0x80, 0x80, 0xff))?;
        if let Some(title) = surface.title_bar_rect() {
            let bar = Rectangle::new(
                title.x + BORDER_SIZE,
                title.y + BORDER_SIZE,
                title.width - BORDER_SIZE * 2,
                DECORATION_SIZE - BORDER_SIZE,
            );
            self.fill(bar, (0xe5, 0xe5, 0xe5, 0xff))?;
        }
        let buttons = [
            (surface.can_close, surface.close_button_rect(), (0xe0, 0x4f, 0x4f, 0xff)),
            (surface.can_maximize, surface.maximize_button_rect(), (0x4f, 0xb0, 0x4f, 0xff)),
            (surface.can_minimize, surface.minimize_button_rect(), (0xe0, 0xb0, 0x3f, 0xff)),
        ];
        for (enabled, rect, color) in buttons {
            if let (true, Some(rect)) = (enabled, rect) {
                self.fill(rect, color)?;
            }
        }
        Ok(())
    }

    fn draw_surface(&mut self, surface: &Surface) -> Result<()> {
        let pos = surface.position();
        match &surface.texture {
            Some(texture) => self.blit(texture, pos.x, pos.y, None),
            None => self.fill(surface.geometry(), (0xff, 0xff, 0xff, 0xff)),
        }
    }

    fn read_pixels(&mut self, region: Rectangle) -> Result<Vec<u8>> {
        let (ox, oy) = self.origin;
        let pixmap = self
            .pixmap
            .as_ref()
            .ok_or_else(|| anyhow!("begin_frame was not called"))?;
        let (pw, ph) = (pixmap.width() as i32, pixmap.height() as i32);
        let data = pixmap.data();

        let mut out = vec![0u8; region.width.max(0) as usize * region.height.max(0) as usize * 4];
        for row in 0..region.height.max(0) {
            let sy = region.y - oy + row;
            if sy < 0 || sy >= ph {
                continue;
            }
            for col in 0..region.width.max(0) {
                let sx = region.x - ox + col;
                if sx < 0 || sx >= pw {
                    continue;
                }
                let src = ((sy * pw + sx) * 4) as usize;
                let dst = ((row * region.width + col) * 4) as usize;
                out[dst..dst + 4].copy_from_slice(&data[src..src + 4]);
            }
        }
        Ok(out)
    }
}
