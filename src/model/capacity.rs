//! Model capacity points and the student growth sequence
//!
//! Iterative teacher/student training grows the student architecture at
//! every promotion. Capacities are named size points mapping to a filter
//! width and a batch-size divisor (larger models halve the batch to keep
//! memory flat, mirroring how bigger backbones are usually run).

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslError};

use super::cnn::ClassifierConfig;

/// Named classifier size point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capacity {
    Small,
    Medium,
    Large,
    XLarge,
}

impl Capacity {
    /// Parse a capacity name from the CLI. Unknown names fail fast.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "xlarge" => Ok(Self::XLarge),
            other => Err(SslError::Config(format!(
                "unknown capacity '{}', expected small, medium, large or xlarge",
                other
            ))),
        }
    }

    /// Base filter width for this capacity
    pub fn base_filters(&self) -> usize {
        match self {
            Self::Small => 16,
            Self::Medium => 32,
            Self::Large => 48,
            Self::XLarge => 64,
        }
    }

    /// Batch-size divisor: larger models run smaller batches
    pub fn batch_divisor(&self) -> usize {
        match self {
            Self::Small | Self::Medium => 1,
            Self::Large | Self::XLarge => 2,
        }
    }

    /// Classifier configuration at this capacity
    pub fn classifier_config(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(num_classes).with_base_filters(self.base_filters())
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        };
        write!(f, "{}", name)
    }
}

/// Ordered sequence of capacities consumed by the promotion loop: entry 0
/// is the warmup teacher, entry `i + 1` is the student of iteration `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthSequence {
    capacities: Vec<Capacity>,
}

impl GrowthSequence {
    /// Parse a comma-separated capacity list, e.g. `small,medium,large`.
    pub fn parse(spec: &str) -> Result<Self> {
        let capacities: Result<Vec<Capacity>> = spec
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Capacity::parse)
            .collect();
        let capacities = capacities?;

        if capacities.is_empty() {
            return Err(SslError::Config(
                "growth sequence must name at least one capacity".to_string(),
            ));
        }
        Ok(Self { capacities })
    }

    /// Check there are enough entries for `iterations` student stages
    /// (one teacher plus one student per iteration).
    pub fn validate_for_iterations(&self, iterations: usize) -> Result<()> {
        let needed = iterations + 1;
        if self.capacities.len() < needed {
            return Err(SslError::Config(format!(
                "growth sequence has {} capacities but {} iterations need {}",
                self.capacities.len(),
                iterations,
                needed
            )));
        }
        Ok(())
    }

    /// Capacity at a given slot
    pub fn get(&self, index: usize) -> Option<Capacity> {
        self.capacities.get(index).copied()
    }

    /// Number of capacity slots
    pub fn len(&self) -> usize {
        self.capacities.len()
    }

    /// Whether the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.capacities.is_empty()
    }

    /// Batch size at a slot, applying the capacity's divisor to the
    /// configured base batch size (never below 1).
    pub fn batch_size_at(&self, index: usize, base_batch_size: usize) -> Option<usize> {
        self.get(index)
            .map(|c| (base_batch_size / c.batch_divisor()).max(1))
    }
}

impl std::fmt::Display for GrowthSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.capacities.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}
