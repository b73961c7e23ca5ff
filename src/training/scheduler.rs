//! Learning Rate Schedules
//!
//! Epoch-level schedules: the training loops query the rate once per epoch
//! and pass it to every optimizer step of that epoch. Schedules are plain
//! functions of the epoch index, so a fresh scheduler at each promotion is
//! just a new value.

use serde::{Deserialize, Serialize};

/// Learning rate schedule evaluated per epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Multiply by `gamma` every `period` epochs
    StepDecay {
        initial_lr: f64,
        gamma: f64,
        period: usize,
    },

    /// lr = initial_lr * decay_rate^epoch
    Exponential { initial_lr: f64, decay_rate: f64 },

    /// Linear warmup followed by cosine annealing to `min_lr`
    WarmupCosine {
        initial_lr: f64,
        min_lr: f64,
        warmup_epochs: usize,
        total_epochs: usize,
    },
}

impl LrSchedule {
    /// Create a constant schedule
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// Create a periodic step decay schedule
    pub fn step_decay(initial_lr: f64, gamma: f64, period: usize) -> Self {
        Self::StepDecay {
            initial_lr,
            gamma,
            period: period.max(1),
        }
    }

    /// Get the learning rate for a given epoch
    pub fn lr_at(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,

            Self::StepDecay {
                initial_lr,
                gamma,
                period,
            } => initial_lr * gamma.powi((epoch / period) as i32),

            Self::Exponential {
                initial_lr,
                decay_rate,
            } => initial_lr * decay_rate.powi(epoch as i32),

            Self::WarmupCosine {
                initial_lr,
                min_lr,
                warmup_epochs,
                total_epochs,
            } => {
                if epoch < *warmup_epochs {
                    let progress = (epoch as f64 + 1.0) / (*warmup_epochs as f64);
                    initial_lr * progress
                } else {
                    let remaining = total_epochs.saturating_sub(*warmup_epochs).max(1);
                    let progress = (epoch - warmup_epochs) as f64 / remaining as f64;
                    let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                    min_lr + (initial_lr - min_lr) * cosine
                }
            }
        }
    }

    /// Describe the schedule for run logs
    pub fn description(&self) -> String {
        match self {
            Self::Constant { lr } => format!("constant lr={:.6}", lr),
            Self::StepDecay {
                initial_lr,
                gamma,
                period,
            } => format!(
                "step decay: initial={:.6}, gamma={}, every {} epochs",
                initial_lr, gamma, period
            ),
            Self::Exponential {
                initial_lr,
                decay_rate,
            } => format!(
                "exponential: initial={:.6}, decay={:.4}",
                initial_lr, decay_rate
            ),
            Self::WarmupCosine {
                initial_lr,
                warmup_epochs,
                total_epochs,
                ..
            } => format!(
                "warmup cosine: initial={:.6}, warmup={}, total={}",
                initial_lr, warmup_epochs, total_epochs
            ),
        }
    }
}
