//! Running-Sum Metric Accumulator
//!
//! Every training and evaluation loop reports its per-epoch statistics
//! through the same container: scalar increments are summed per metric name,
//! then normalized by the sample count at the end of the epoch. Keys keep
//! insertion order so progress lines always print in a stable order.

use std::collections::HashMap;
use std::fmt;

use crate::utils::error::{Result, SslError};

/// Accumulates named scalar metrics as running sums.
///
/// A fresh instance is created per epoch (or [`Accumulator::reset`] is called
/// between epochs), so no state leaks between add/divide cycles.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    /// Metric names in insertion order
    keys: Vec<String>,
    /// Running totals per metric name
    values: HashMap<String, f64>,
}

impl Accumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single increment to the running total for `key`,
    /// creating the key at 0 if absent.
    pub fn add(&mut self, key: &str, value: f64) {
        if !self.values.contains_key(key) {
            self.keys.push(key.to_string());
        }
        *self.values.entry(key.to_string()).or_insert(0.0) += value;
    }

    /// Add every increment of a metric record at once.
    pub fn add_dict(&mut self, increments: &[(&str, f64)]) {
        for (key, value) in increments {
            self.add(key, *value);
        }
    }

    /// Get the current running total for `key` (0 if never added).
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    /// Number of distinct metric keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no metric has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Return a new accumulator with every value divided by `divisor`.
    ///
    /// The key set and insertion order are preserved. A zero divisor is an
    /// explicit error, never a silent Inf/NaN.
    pub fn divided_by(&self, divisor: f64) -> Result<Accumulator> {
        if divisor == 0.0 {
            return Err(SslError::InvalidDivisor);
        }

        let values = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v / divisor))
            .collect();

        Ok(Accumulator {
            keys: self.keys.clone(),
            values,
        })
    }

    /// Normalize the accumulator in place, dividing every value by `divisor`.
    pub fn divide_by(&mut self, divisor: f64) -> Result<()> {
        if divisor == 0.0 {
            return Err(SslError::InvalidDivisor);
        }

        for value in self.values.values_mut() {
            *value /= divisor;
        }
        Ok(())
    }

    /// Clear all keys and totals so the instance can start a new cycle.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys
            .iter()
            .map(move |k| (k.as_str(), self.values[k]))
    }
}

impl fmt::Display for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={:.4}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
