//! egui texture as a render sink.

use camlink_core::{Frame, Rgba};
use camlink_renderer::{RenderSink, RendererError};
use egui::{Color32, ColorImage, TextureHandle, TextureOptions};

/// Copy `frame` into an egui image pixel by pixel.
pub fn to_color_image(frame: &Frame) -> Result<ColorImage, RendererError> {
    let (width, height) = (frame.width(), frame.height());
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let Rgba { r, g, b, a } = frame.pixel(x, y).ok_or_else(|| {
                RendererError::Unsupported(format!("pixel ({x}, {y}) out of range"))
            })?;
            pixels.push(Color32::from_rgba_unmultiplied(r, g, b, a));
        }
    }
    Ok(ColorImage { size: [width as usize, height as usize], pixels })
}

/// Owns the feed texture. Lives on the UI thread.
pub struct TextureSink {
    ctx:     egui::Context,
    texture: Option<TextureHandle>,
}

impl TextureSink {
    pub fn new(ctx: egui::Context) -> Self {
        Self { ctx, texture: None }
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }
}

impl RenderSink for TextureSink {
    fn set_current_frame(&mut self, frame: Option<&Frame>) -> Result<(), RendererError> {
        let Some(frame) = frame else {
            self.texture = None;
            return Ok(());
        };
        let image = to_color_image(frame)?;
        match self.texture.as_mut() {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(self.ctx.load_texture("camlink-feed", image, TextureOptions::LINEAR));
            }
        }
        Ok(())
    }
}
