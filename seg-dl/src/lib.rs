//! Training and validation data for a vision-language segmentation model.
//!
//! The crate turns image, mask and prompt triples from several dataset
//! layouts into [Sample](dataset::Sample)s, mixes them through a weighted
//! [HybridDataset](dataset::HybridDataset), and packs them into
//! token-aligned [Batch](collate::Batch)es.

mod common;
pub mod collate;
pub mod conversation;
pub mod dataset;
pub mod processor;
pub mod tokenizer;
