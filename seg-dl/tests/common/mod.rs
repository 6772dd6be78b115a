#![allow(dead_code)]

use anyhow::Result;
use seg_dl::{conversation::ConversationTemplate, dataset::SampleContext, processor::ImageProcessor};
use std::{fs, path::Path};

/// A small preprocessing setup so that tests stay fast.
pub fn context() -> Result<SampleContext> {
    Ok(SampleContext::new(
        ImageProcessor::new(32, 16)?,
        ConversationTemplate::llava_v1(),
    ))
}

/// Write a blank `w`x`h` RGB image. The format follows the extension.
pub fn write_image(path: impl AsRef<Path>, w: u32, h: u32) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    image::RgbImage::from_pixel(w, h, image::Rgb([90, 120, 150])).save(path)?;
    Ok(())
}

/// Write a single-channel PNG from row-major values.
pub fn write_label(path: impl AsRef<Path>, w: u32, h: u32, values: Vec<u8>) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let image = image::GrayImage::from_raw(w, h, values)
        .ok_or_else(|| anyhow::format_err!("buffer does not match {}x{}", w, h))?;
    image.save(path)?;
    Ok(())
}

pub fn write_text(path: impl AsRef<Path>, text: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, text)?;
    Ok(())
}
