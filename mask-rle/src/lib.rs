//! Decoding of stored segmentation annotations into dense binary masks.
//!
//! Annotations come either as COCO-style run-length encodings, as polygon
//! lists, or as labelme-style shapes. Every decoder produces a
//! `[height, width]` array of `u8`.

mod common;

pub mod polygon;
pub use polygon::*;

pub mod rle;
pub use rle::*;

pub mod segmentation;
pub use segmentation::*;

pub mod shape;
pub use shape::*;
