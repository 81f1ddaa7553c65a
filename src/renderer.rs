use anyhow::{bail, Result};
use eframe::egui::{Color32, ColorImage};

use crate::decoder::DecodedImage;

pub const DEFAULT_WINDOW_WIDTH: f32 = 256.0;
pub const DEFAULT_WINDOW_CENTER: f32 = 128.0;
pub const RENDER_ERROR_MESSAGE: &str = "Error loading image";
pub const ERROR_BACKGROUND: Color32 = Color32::from_gray(0x33);

const FALLBACK_SURFACE_SIZE: [usize; 2] = [512, 512];

#[derive(Debug, Clone)]
pub enum FrameSurface {
    Image(ColorImage),
    Failed { size: [usize; 2], message: String },
}

pub fn render_frame(image: &DecodedImage) -> FrameSurface {
    let (center, width) = effective_window(image.window_center, image.window_width);
    let result = match image.pixel_data() {
        Some(pixels) => render_window_level(image.width, image.height, pixels, center, width),
        None => Err(anyhow::anyhow!("Image carries no pixel data")),
    };

    match result {
        Ok(color_image) => FrameSurface::Image(color_image),
        Err(err) => {
            log::error!("Error rendering image: {err:#}");
            let size = if image.width > 0 && image.height > 0 {
                [image.width, image.height]
            } else {
                FALLBACK_SURFACE_SIZE
            };
            FrameSurface::Failed {
                size,
                message: RENDER_ERROR_MESSAGE.to_string(),
            }
        }
    }
}

pub fn effective_window(center: Option<f32>, width: Option<f32>) -> (f32, f32) {
    let width = width
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(DEFAULT_WINDOW_WIDTH);
    let center = center
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_WINDOW_CENTER);
    (center, width)
}

pub fn render_window_level(
    width_px: usize,
    height_px: usize,
    frame_pixels: &[i32],
    center: f32,
    width: f32,
) -> Result<ColorImage> {
    if width_px == 0 || height_px == 0 {
        bail!("Image has no area: {}x{}", width_px, height_px);
    }
    let expected = width_px
        .checked_mul(height_px)
        .ok_or_else(|| anyhow::anyhow!("Overflow while calculating frame size"))?;
    if frame_pixels.len() != expected {
        bail!(
            "Pixel count mismatch: got {}, expected {}",
            frame_pixels.len(),
            expected
        );
    }

    let low = center - width / 2.0;
    let pixels = frame_pixels
        .iter()
        .map(|&sample| Color32::from_gray(window_level_gray(sample, low, width)))
        .collect();

    Ok(ColorImage {
        size: [width_px, height_px],
        pixels,
    })
}

pub fn window_level_gray(sample: i32, low: f32, width: f32) -> u8 {
    ((sample as f32 - low) / width * 255.0).clamp(0.0, 255.0).round() as u8
}
