//! # cifar_ssl
//!
//! Semi-supervised CIFAR image classification in Rust, built on the Burn
//! framework. Implements two training procedures:
//!
//! - **Noisy Student**: iterative teacher/student training where a frozen
//!   teacher pseudo-labels an unlabeled pool, the student learns from
//!   labeled data plus a confidence-masked consistency loss, and each
//!   promotion grows the student architecture.
//! - **FixMatch**: single-model consistency training where weak-view
//!   predictions above a confidence threshold become hard pseudo-labels for
//!   the strongly augmented view.
//!
//! ## Modules
//!
//! - `dataset`: CIFAR-10/100 binary loading, augmentation, batching, and
//!   restartable loaders
//! - `model`: the CNN classifier and the capacity growth sequence
//! - `training`: accumulators, pseudo-labeling, losses, schedules, and the
//!   two training loops
//! - `exp_log`: the per-epoch experiment log persisted as JSON
//! - `utils`: errors and logging
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cifar_ssl::backend::TrainingBackend;
//! use cifar_ssl::training::noisy_student::{self, NoisyStudentConfig};
//!
//! let outcome = noisy_student::run::<TrainingBackend>(config)?;
//! println!("final test accuracy: {:.2}%", outcome.final_test.accuracy * 100.0);
//! ```

pub mod backend;
pub mod dataset;
pub mod exp_log;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{Augmenter, CifarDataset, DataLoader, DatasetKind};
pub use exp_log::{EpochRecord, ExperimentLog, SplitMetrics};
pub use model::{Capacity, Classifier, ClassifierConfig, GrowthSequence};
pub use training::{
    Accumulator, FixMatchConfig, LrSchedule, NoisyStudentConfig, PseudoLabeler, TrainingContext,
};
pub use utils::error::{Result, SslError};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
