//! Loss terms for semi-supervised training
//!
//! The supervised term is Burn's cross-entropy; this module adds the two
//! unlabeled-batch terms. Both take the confidence mask as a per-sample
//! multiplier and average over the full batch, masked-out samples included,
//! so the batch shape never changes with the mask.

use burn::tensor::activation::log_softmax;
use burn::tensor::{backend::Backend, Int, Tensor};

/// Epsilon keeping `log` away from zero probabilities
const EPS: f32 = 1e-10;

/// Masked consistency loss between the student's log-distribution and the
/// teacher's distribution: per-sample `KL(teacher || student)` summed over
/// classes, multiplied by the mask, averaged over the batch.
///
/// `teacher_probs` must already be normalized (softmax output) and carries
/// no gradient; gradients flow only through `student_logits`.
pub fn masked_consistency_loss<B: Backend>(
    student_logits: Tensor<B, 2>,
    teacher_probs: Tensor<B, 2>,
    mask: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let log_q = log_softmax(student_logits, 1);
    let log_p = teacher_probs.clone().clamp_min(EPS).log();

    let kl = (teacher_probs * (log_p - log_q)).sum_dim(1).squeeze::<1>(1);
    (kl * mask).mean()
}

/// Masked hard-label cross-entropy: per-sample negative log-likelihood of
/// the pseudo-label, multiplied by the mask, averaged over the batch.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    mask: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch_size, _num_classes] = logits.dims();

    let log_probs = log_softmax(logits, 1);
    let targets_2d = targets.reshape([batch_size, 1]);
    let nll = log_probs.gather(1, targets_2d).squeeze::<1>(1).neg();

    (nll * mask).mean()
}

/// Total student loss: supervised term plus the coefficient-weighted
/// unlabeled term.
pub fn combine_losses<B: Backend>(
    supervised: Tensor<B, 1>,
    unlabeled: Tensor<B, 1>,
    coefficient: f64,
) -> Tensor<B, 1> {
    supervised + unlabeled * coefficient
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TestBackend = burn::backend::NdArray;

    fn tensor2(device: &<TestBackend as Backend>::Device, rows: &[&[f32]]) -> Tensor<TestBackend, 2> {
        let cols = rows[0].len();
        let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::from_floats(TensorData::new(data, [rows.len(), cols]), device)
    }

    fn tensor1(device: &<TestBackend as Backend>::Device, values: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(TensorData::new(values.to_vec(), [values.len()]), device)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        use burn::tensor::ElementConversion;
        t.into_scalar().elem()
    }

    #[test]
    fn test_kl_is_zero_when_student_matches_teacher() {
        let device = Default::default();
        let probs = [0.5f32, 0.25, 0.25];

        // Logits equal to log-probabilities softmax back to the same
        // distribution, so the divergence vanishes.
        let logits: Vec<f32> = probs.iter().map(|p| p.ln()).collect();
        let student = tensor2(&device, &[&logits]);
        let teacher = tensor2(&device, &[&probs]);
        let mask = tensor1(&device, &[1.0]);

        let loss = scalar(masked_consistency_loss(student, teacher, mask));
        assert!(loss.abs() < 1e-5, "loss was {}", loss);
    }

    #[test]
    fn test_kl_is_positive_on_disagreement() {
        let device = Default::default();
        let student = tensor2(&device, &[&[2.0, 0.0, -2.0]]);
        let teacher = tensor2(&device, &[&[0.1, 0.1, 0.8]]);
        let mask = tensor1(&device, &[1.0]);

        let loss = scalar(masked_consistency_loss(student, teacher, mask));
        assert!(loss > 0.1);
    }

    #[test]
    fn test_mask_silences_low_confidence_samples() {
        let device = Default::default();
        let student = tensor2(&device, &[&[2.0, 0.0, -2.0], &[2.0, 0.0, -2.0]]);
        let teacher = tensor2(&device, &[&[0.1, 0.1, 0.8], &[0.1, 0.1, 0.8]]);

        let all_masked = scalar(masked_consistency_loss(
            student.clone(),
            teacher.clone(),
            tensor1(&device, &[0.0, 0.0]),
        ));
        assert!(all_masked.abs() < 1e-7);

        // Averaging runs over the whole batch, masked zeros included
        let full = scalar(masked_consistency_loss(
            student.clone(),
            teacher.clone(),
            tensor1(&device, &[1.0, 1.0]),
        ));
        let half = scalar(masked_consistency_loss(
            student,
            teacher,
            tensor1(&device, &[1.0, 0.0]),
        ));
        assert!((half - full / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_masked_cross_entropy_gathers_target_class() {
        let device = Default::default();
        // Strongly peaked at class 0
        let logits = tensor2(&device, &[&[10.0, 0.0, 0.0]]);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64], [1]),
            &device,
        );
        let mask = tensor1(&device, &[1.0]);

        let correct = scalar(masked_cross_entropy(logits.clone(), targets, mask.clone()));
        assert!(correct < 0.01);

        let wrong_targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![2i64], [1]),
            &device,
        );
        let wrong = scalar(masked_cross_entropy(logits, wrong_targets, mask));
        assert!(wrong > 5.0);
    }

    #[test]
    fn test_masked_cross_entropy_respects_mask() {
        let device = Default::default();
        let logits = tensor2(&device, &[&[0.0, 5.0], &[5.0, 0.0]]);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1], [2]),
            &device,
        );
        let mask = tensor1(&device, &[0.0, 0.0]);

        let loss = scalar(masked_cross_entropy(logits, targets, mask));
        assert!(loss.abs() < 1e-7);
    }

    #[test]
    fn test_combine_losses_scenario() {
        // Labeled loss 0.8 plus masked consistency mean 0.3 at coefficient 1
        let device = Default::default();
        let supervised = tensor1(&device, &[0.8]);
        let consistency = tensor1(&device, &[0.3]);

        let total = scalar(combine_losses(supervised, consistency, 1.0));
        assert!((total - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_combine_losses_scales_unlabeled_term() {
        let device = Default::default();
        let supervised = tensor1(&device, &[0.5]);
        let unlabeled = tensor1(&device, &[0.4]);

        let total = scalar(combine_losses(supervised, unlabeled, 0.5));
        assert!((total - 0.7).abs() < 1e-6);
    }
}
