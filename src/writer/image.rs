//! Image preparation shared by the output backends.

use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::resources::LoadedImage;

/// Downsample `image` when its pixel density at the placed size exceeds
/// `target_dpi`. Sizes are in points. Returns the image unchanged when no
/// resampling is needed or when re-encoding fails.
pub fn prepare(image: &LoadedImage, placed_width: f32, placed_height: f32, target_dpi: u32) -> LoadedImage {
    let max_w = (placed_width / 72.0 * target_dpi as f32).ceil().max(1.0) as u32;
    let max_h = (placed_height / 72.0 * target_dpi as f32).ceil().max(1.0) as u32;
    if image.width_px <= max_w && image.height_px <= max_h {
        return image.clone();
    }

    match downsample(image, max_w, max_h) {
        Ok(smaller) => {
            log::debug!(
                "Downsampled image from {}x{} to {}x{} px for {target_dpi} dpi.",
                image.width_px,
                image.height_px,
                smaller.width_px,
                smaller.height_px
            );
            smaller
        }
        Err(e) => {
            log::warn!("Could not downsample image, embedding as is: {e}");
            image.clone()
        }
    }
}

fn downsample(image: &LoadedImage, max_w: u32, max_h: u32) -> Result<LoadedImage, image::ImageError> {
    let decoded = image::load_from_memory_with_format(&image.bytes, image.format)?;
    let resized = decoded.resize(max_w, max_h, FilterType::Triangle);
    let mut bytes = Vec::new();
    let format = match image.format {
        ImageFormat::Jpeg => {
            resized.to_rgb8().write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
            ImageFormat::Jpeg
        }
        _ => {
            resized.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
            ImageFormat::Png
        }
    };
    Ok(LoadedImage {
        width_px: resized.width(),
        height_px: resized.height(),
        format,
        bytes,
    })
}
