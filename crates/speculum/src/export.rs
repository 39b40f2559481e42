//! Exporting reflection targets as images.

use std::path::Path;

use image::{ImageBuffer, Rgba, RgbaImage};
use speculum_render::{HeadlessBackend, TextureHandle};

use crate::{Error, Result};

/// Copies a headless target into an RGBA image.
pub fn target_image(backend: &HeadlessBackend, handle: TextureHandle) -> Result<RgbaImage> {
    let descriptor = backend
        .descriptor(handle)
        .ok_or(Error::UnknownTarget(handle))?;
    let pixels = backend.pixels(handle).ok_or(Error::UnknownTarget(handle))?;
    let data: Vec<u8> = pixels.iter().flatten().copied().collect();
    ImageBuffer::<Rgba<u8>, _>::from_raw(descriptor.width, descriptor.height, data)
        .ok_or(Error::InvalidImageData)
}

/// Writes a headless target to a PNG file.
pub fn save_target_png(backend: &HeadlessBackend, handle: TextureHandle, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    target_image(backend, handle)?.save_with_format(path, image::ImageFormat::Png)?;
    log::debug!("saved {:?} to {}", handle, path.display());
    Ok(())
}

/// Writes tightly packed RGBA8 rows, such as `WgpuBackend::read_target`
/// output, to a PNG file.
pub fn save_rgba_png(path: impl AsRef<Path>, width: u32, height: u32, data: Vec<u8>) -> Result<()> {
    let img: RgbaImage = ImageBuffer::from_raw(width, height, data).ok_or(Error::InvalidImageData)?;
    img.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
    Ok(())
}
