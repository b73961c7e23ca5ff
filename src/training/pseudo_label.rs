//! Confidence-Masked Pseudo-Labeling
//!
//! Turns teacher probability distributions over unlabeled samples into
//! training targets: the argmax class, its probability as the confidence
//! score, and a binary mask selecting samples whose confidence clears the
//! threshold. The mask gates the per-sample loss by multiplication instead
//! of filtering, so batch shapes stay static through the training step.

use crate::utils::error::{Result, SslError};

/// Pseudo-labels and confidence mask for one unlabeled batch.
///
/// Created per training step and dropped after the loss computation.
#[derive(Debug, Clone)]
pub struct PseudoLabelBatch {
    /// Selected class per sample (stable argmax)
    pub classes: Vec<usize>,
    /// Max probability per sample
    pub confidences: Vec<f32>,
    /// 1.0 where confidence cleared the threshold, else 0.0
    pub mask: Vec<f32>,
}

impl PseudoLabelBatch {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Number of samples the mask keeps
    pub fn num_selected(&self) -> usize {
        self.mask.iter().filter(|&&m| m > 0.0).count()
    }

    /// Fraction of the batch the mask keeps
    pub fn selected_fraction(&self) -> f64 {
        if self.classes.is_empty() {
            return 0.0;
        }
        self.num_selected() as f64 / self.len() as f64
    }
}

/// Pseudo-labeler with a fixed confidence threshold
#[derive(Debug, Clone)]
pub struct PseudoLabeler {
    threshold: f32,
}

impl PseudoLabeler {
    /// Create a pseudo-labeler. The threshold must lie in [0, 1].
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SslError::Config(format!(
                "confidence threshold {} outside [0, 1]",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    /// The configured threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Label one sample from its probability distribution.
    ///
    /// Returns `(selected_class, confidence, mask)`. The argmax is stable:
    /// ties resolve to the lowest class index. The threshold boundary is
    /// inclusive (`confidence >= threshold` selects the sample).
    pub fn label_sample(&self, distribution: &[f32]) -> (usize, f32, f32) {
        let mut selected = 0usize;
        let mut confidence = f32::NEG_INFINITY;
        for (class, &p) in distribution.iter().enumerate() {
            if p > confidence {
                confidence = p;
                selected = class;
            }
        }

        let mask = if confidence >= self.threshold { 1.0 } else { 0.0 };
        (selected, confidence, mask)
    }

    /// Label a batch of probability distributions.
    pub fn label_batch(&self, distributions: &[Vec<f32>]) -> PseudoLabelBatch {
        let mut classes = Vec::with_capacity(distributions.len());
        let mut confidences = Vec::with_capacity(distributions.len());
        let mut mask = Vec::with_capacity(distributions.len());

        for distribution in distributions {
            let (class, confidence, m) = self.label_sample(distribution);
            classes.push(class);
            confidences.push(confidence);
            mask.push(m);
        }

        PseudoLabelBatch {
            classes,
            confidences,
            mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_confidence_is_max_probability() {
        let labeler = PseudoLabeler::new(0.5).unwrap();
        let (class, confidence, mask) = labeler.label_sample(&[0.2, 0.5, 0.3]);

        assert_eq!(class, 1);
        assert_relative_eq!(confidence, 0.5);
        assert_relative_eq!(mask, 1.0);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // Confidence exactly at the threshold is kept...
        let at = PseudoLabeler::new(0.5).unwrap();
        let (_, _, mask) = at.label_sample(&[0.2, 0.5, 0.3]);
        assert_relative_eq!(mask, 1.0);

        // ...and a threshold just above it drops the sample.
        let above = PseudoLabeler::new(0.51).unwrap();
        let (class, confidence, mask) = above.label_sample(&[0.2, 0.5, 0.3]);
        assert_eq!(class, 1);
        assert_relative_eq!(confidence, 0.5);
        assert_relative_eq!(mask, 0.0);
    }

    #[test]
    fn test_confidence_just_below_threshold_is_dropped() {
        let labeler = PseudoLabeler::new(0.5).unwrap();
        let (_, _, mask) = labeler.label_sample(&[0.499, 0.26, 0.241]);
        assert_relative_eq!(mask, 0.0);
    }

    #[test]
    fn test_ties_resolve_to_lowest_class_index() {
        let labeler = PseudoLabeler::new(0.0).unwrap();
        let (class, confidence, _) = labeler.label_sample(&[0.1, 0.4, 0.4, 0.1]);
        assert_eq!(class, 1);
        assert_relative_eq!(confidence, 0.4);

        let (class, _, _) = labeler.label_sample(&[0.25, 0.25, 0.25, 0.25]);
        assert_eq!(class, 0);
    }

    #[test]
    fn test_batch_labeling() {
        let labeler = PseudoLabeler::new(0.6).unwrap();
        let batch = labeler.label_batch(&[
            vec![0.7, 0.2, 0.1],
            vec![0.4, 0.35, 0.25],
            vec![0.05, 0.05, 0.9],
        ]);

        assert_eq!(batch.classes, vec![0, 0, 2]);
        assert_eq!(batch.mask, vec![1.0, 0.0, 1.0]);
        assert_eq!(batch.num_selected(), 2);
        assert_relative_eq!(batch.selected_fraction(), 2.0 / 3.0);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_threshold_outside_unit_interval_is_rejected() {
        assert!(matches!(
            PseudoLabeler::new(1.5),
            Err(SslError::Config(_))
        ));
        assert!(matches!(
            PseudoLabeler::new(-0.1),
            Err(SslError::Config(_))
        ));
        assert!(PseudoLabeler::new(0.0).is_ok());
        assert!(PseudoLabeler::new(1.0).is_ok());
    }
}
