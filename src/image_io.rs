use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{ImageFormat, RgbImage, imageops::FilterType};

use crate::error::{GeogenieError, Result};

/// File extensions accepted by the CLI and the batch runner.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Decodes uploaded bytes into RGB, whatever the source format.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Reads a PNG or JPEG file into RGB.
pub fn read_rgb(path: &Path) -> Result<RgbImage> {
    if !has_supported_extension(path) {
        return Err(GeogenieError::UnsupportedFormat(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_rgb8())
}

/// Squashes `image` to exactly `width` x `height`.
pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(image, width, height, FilterType::CatmullRom)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Writes a copy of an upload to disk so it can be inspected later.
pub fn save_debug_image(image: &RgbImage, path: &Path) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    log::info!("Saved uploaded map image to {}", path.display());
    Ok(())
}

/// Lists the PNG and JPEG files directly inside `dir`, sorted by path.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_supported_extension(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
