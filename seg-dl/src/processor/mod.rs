//! Image preprocessing for the segmentation and vision encoders.

mod clip;
mod image_processor;
mod sam;

pub use clip::*;
pub use image_processor::*;
pub use sam::*;
