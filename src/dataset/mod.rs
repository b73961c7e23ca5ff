//! Dataset module for CIFAR data handling
//!
//! This module provides:
//! - CIFAR-10/CIFAR-100 binary-format loading and archive download
//! - Weak and strong augmentation for the two training procedures
//! - Batching of image views into Burn tensors
//! - A restartable, shuffled batch index loader
//!
//! ## Semi-supervised pairing
//!
//! A run on one CIFAR variant uses the other variant's training split as its
//! unlabeled pool. Both streams are consumed through independent restartable
//! loaders; the unlabeled loader cycles whenever the labeled pass outlasts it.

pub mod augmentation;
pub mod batcher;
pub mod cifar;
pub mod loader;

pub use augmentation::Augmenter;
pub use batcher::{CifarBatch, CifarBatcher, CifarItem, CIFAR_MEAN, CIFAR_STD};
pub use cifar::{
    download_dataset, CifarDataset, CifarImage, DatasetKind, DatasetStats, Split, IMAGE_DIM,
    IMAGE_LEN,
};
pub use loader::DataLoader;
