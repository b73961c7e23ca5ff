//! Training module for semi-supervised learning
//!
//! This module provides:
//! - The metric accumulator shared by every training/eval loop
//! - Confidence-masked pseudo-labeling
//! - Masked consistency and cross-entropy loss terms
//! - Epoch-level learning-rate schedules
//! - The Noisy Student teacher/student promotion loop
//! - The FixMatch consistency-training loop
//!
//! ## Iterative training approach
//!
//! Noisy Student alternates roles: a frozen teacher pseudo-labels the
//! unlabeled stream, a (larger) student trains on labeled data plus the
//! confidence-masked consistency term, and at each promotion the student
//! takes the teacher slot while the next capacity becomes the student.

pub mod accumulator;
pub mod context;
pub mod eval;
pub mod fixmatch;
pub mod loss;
pub mod noisy_student;
pub mod pseudo_label;
pub mod scheduler;

pub use accumulator::Accumulator;
pub use context::{StageDescriptor, StudentState, TrainingContext};
pub use eval::evaluate;
pub use fixmatch::{FixMatchConfig, FixMatchOutcome};
pub use noisy_student::{NoisyStudentConfig, NoisyStudentOutcome};
pub use pseudo_label::{PseudoLabelBatch, PseudoLabeler};
pub use scheduler::LrSchedule;

/// Default confidence threshold for Noisy Student pseudo-labeling
pub const DEFAULT_NS_THRESHOLD: f32 = 0.4;

/// Default confidence threshold for FixMatch pseudo-labeling
pub const DEFAULT_FM_THRESHOLD: f32 = 0.95;

/// Default weight of the unlabeled loss term
pub const DEFAULT_COEFFICIENT: f64 = 1.0;
