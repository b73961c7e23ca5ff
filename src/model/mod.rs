//! Model module: the CNN classifier and the capacity growth sequence.

pub mod capacity;
pub mod cnn;

pub use capacity::{Capacity, GrowthSequence};
pub use cnn::{Classifier, ClassifierConfig, ConvBlock};
