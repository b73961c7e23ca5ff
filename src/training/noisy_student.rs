//! Noisy Student: iterative teacher/student training
//!
//! The run moves through `WARMUP -> STUDENT_TRAINING(i) -> PROMOTE -> ... ->
//! DONE`. Warmup trains the first teacher on labeled data only. Each student
//! stage pairs every labeled batch with an unlabeled batch (cycling the
//! unlabeled loader as needed), distills the frozen teacher through the
//! confidence-masked consistency loss, and ends with a promotion: the
//! student becomes the teacher and the next capacity in the growth sequence
//! becomes the student. After the final promotion the last teacher is
//! evaluated on the held-out test set.
//!
//! Failures in forward/backward computation are not caught anywhere in this
//! loop; a diverging run terminates with the error it produced.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{
    Augmenter, CifarBatch, CifarBatcher, CifarDataset, CifarItem, DataLoader, DatasetKind, Split,
};
use crate::exp_log::{self, EpochRecord, ExperimentLog, SplitMetrics};
use crate::model::GrowthSequence;
use crate::training::accumulator::Accumulator;
use crate::training::context::{StageDescriptor, StudentState, TrainingContext};
use crate::training::eval::evaluate;
use crate::training::loss::{combine_losses, masked_consistency_loss};
use crate::training::pseudo_label::PseudoLabeler;
use crate::training::scheduler::LrSchedule;
use crate::utils::error::{Result, SslError};

/// Configuration for a Noisy Student run
#[derive(Debug, Clone, Serialize)]
pub struct NoisyStudentConfig {
    /// Labeled dataset; the other CIFAR variant becomes the unlabeled pool
    pub dataset: DatasetKind,
    /// Directory holding the extracted binary datasets
    pub data_dir: PathBuf,
    /// Student epochs per iteration (N)
    pub epochs: usize,
    /// Supervised warmup epochs for the first teacher (W)
    pub warmup_epochs: usize,
    /// Teacher/student promotion iterations (K)
    pub iterations: usize,
    /// Base batch size; large capacities divide it
    pub batch_size: usize,
    /// Student capacity growth sequence (slot 0 is the warmup teacher)
    pub growth: GrowthSequence,
    /// Pseudo-label confidence threshold
    pub confidence_threshold: f32,
    /// Weight of the consistency term in the student loss
    pub coefficient: f64,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Evaluate on the test set every E epochs
    pub eval_every: usize,
    /// Output directory for experiment logs
    pub outdir: PathBuf,
    /// Experiment name
    pub name: String,
    /// Seed for shuffling and augmentation
    pub seed: u64,
}

impl NoisyStudentConfig {
    /// Fail fast on configurations that could only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(SslError::Config(
                "at least one teacher/student iteration is required".to_string(),
            ));
        }
        if self.epochs == 0 || self.warmup_epochs == 0 {
            return Err(SslError::Config(
                "epoch counts must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SslError::Config("batch size must be positive".to_string()));
        }
        if self.eval_every == 0 {
            return Err(SslError::Config(
                "evaluation interval must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SslError::Config(format!(
                "confidence threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        self.growth.validate_for_iterations(self.iterations)?;
        Ok(())
    }

    /// The epoch-level schedule every stage starts from
    fn schedule(&self) -> LrSchedule {
        LrSchedule::step_decay(self.learning_rate, 0.97, 5)
    }
}

/// What a finished run hands back to the caller
#[derive(Debug)]
pub struct NoisyStudentOutcome {
    /// Per-epoch experiment log (also flushed to disk after every epoch)
    pub log: ExperimentLog,
    /// Final evaluation of the last promoted teacher
    pub final_test: SplitMetrics,
    /// Role swaps performed
    pub promotions: usize,
    /// Student models instantiated
    pub students_created: usize,
}

/// Run Noisy Student training, loading datasets from disk.
pub fn run<B: AutodiffBackend>(config: NoisyStudentConfig) -> Result<NoisyStudentOutcome> {
    config.validate()?;

    let labeled = CifarDataset::load(&config.data_dir, config.dataset, Split::Train)?;
    let unlabeled = CifarDataset::load(
        &config.data_dir,
        config.dataset.unlabeled_counterpart(),
        Split::Train,
    )?;
    let test = CifarDataset::load(&config.data_dir, config.dataset, Split::Test)?;

    run_with_data::<B>(config, labeled, unlabeled, test)
}

/// Run Noisy Student training on already-loaded datasets.
pub fn run_with_data<B: AutodiffBackend>(
    config: NoisyStudentConfig,
    labeled: CifarDataset,
    unlabeled: CifarDataset,
    test: CifarDataset,
) -> Result<NoisyStudentOutcome> {
    config.validate()?;
    if labeled.is_empty() || unlabeled.is_empty() {
        return Err(SslError::Dataset(
            "labeled and unlabeled pools must be non-empty".to_string(),
        ));
    }

    exp_log::write_run_config(&config.outdir, &config.name, &config)?;
    let log_path = exp_log::log_path(&config.outdir, &config.name);

    let device = B::Device::default();
    let num_classes = config.dataset.num_classes();
    let labeler = PseudoLabeler::new(config.confidence_threshold)?;
    let mut augmenter = Augmenter::new(config.seed);
    let mut log = ExperimentLog::new();

    info!(
        "Noisy Student on {}: warmup {} epochs, {} iterations x {} epochs, growth [{}]",
        config.dataset, config.warmup_epochs, config.iterations, config.epochs, config.growth
    );

    // WARMUP: the first teacher trains on labeled data only.
    let teacher_capacity = config
        .growth
        .get(0)
        .ok_or_else(|| SslError::Config("empty growth sequence".to_string()))?;
    let mut warmup = StudentState::<B>::new(teacher_capacity, num_classes, config.schedule(), &device);
    let mut labeled_loader = DataLoader::new(labeled.len(), config.batch_size, true, config.seed);

    for epoch in 0..config.warmup_epochs {
        let lr = warmup.schedule.lr_at(epoch);
        let train =
            train_supervised_epoch(&mut warmup, &labeled, &mut labeled_loader, &mut augmenter, lr, &device)?;
        info!(
            "[warmup {}/{}] loss={:.4} acc={:.4} lr={:.6}",
            epoch + 1,
            config.warmup_epochs,
            train.loss,
            train.accuracy,
            lr
        );

        let mut record = EpochRecord::new(epoch, train);
        if epoch % config.eval_every == 0 && epoch != 0 {
            let test_metrics =
                evaluate(&warmup.model.valid(), &test, config.batch_size * 2, &device)?;
            info!(
                "[warmup {}] test loss={:.4} acc={:.4}",
                epoch, test_metrics.loss, test_metrics.accuracy
            );
            record = record.with_test(test_metrics);
        }
        log.append(record);
        log.flush(&log_path)?;
    }

    // Only the frozen model moves into the teacher slot; the warmup
    // optimizer and schedule are dropped here.
    let teacher = warmup.model.valid();
    drop(warmup);

    let stage = StageDescriptor::first_student(&config.growth, config.batch_size)?;
    let first_capacity = stage
        .capacity(&config.growth)
        .ok_or_else(|| SslError::Config("growth sequence has no student capacity".to_string()))?;
    let student = StudentState::<B>::new(first_capacity, num_classes, config.schedule(), &device);
    let mut ctx = TrainingContext::new(teacher, student, stage);

    let mut final_test = None;

    // STUDENT_TRAINING(i) -> PROMOTE, repeated K times
    for iteration in 0..config.iterations {
        let stage = ctx.stage;
        info!(
            "[iteration {}/{}] student capacity {} (batch size {})",
            iteration + 1,
            config.iterations,
            stage
                .capacity(&config.growth)
                .map(|c| c.to_string())
                .unwrap_or_default(),
            stage.batch_size
        );

        let stage_seed = config.seed.wrapping_add(iteration as u64 + 1);
        let mut labeled_loader = DataLoader::new(labeled.len(), stage.batch_size, true, stage_seed);
        let mut unlabeled_loader =
            DataLoader::new(unlabeled.len(), stage.batch_size, true, stage_seed ^ 0x9e37);

        for epoch in 0..config.epochs {
            let lr = {
                let student = ctx.student_mut()?;
                student.schedule.lr_at(epoch)
            };
            let train = train_student_epoch(
                &mut ctx,
                &labeled,
                &unlabeled,
                &mut labeled_loader,
                &mut unlabeled_loader,
                &mut augmenter,
                &labeler,
                config.coefficient,
                lr,
                &device,
            )?;
            info!(
                "[iter {} epoch {}/{}] loss={:.4} acc={:.4} lr={:.6}",
                iteration + 1,
                epoch + 1,
                config.epochs,
                train.loss,
                train.accuracy,
                lr
            );

            let mut record = EpochRecord::new(epoch, train);
            if epoch % config.eval_every == 0 && epoch != 0 {
                let student = ctx.student_mut()?;
                let test_metrics =
                    evaluate(&student.model.valid(), &test, stage.batch_size * 2, &device)?;
                record = record.with_test(test_metrics);
            }
            log.append(record);
            log.flush(&log_path)?;
        }

        // PROMOTE: the trained student becomes the teacher. A new student is
        // built only while iterations remain.
        let next = if iteration + 1 < config.iterations {
            let next_stage = ctx.stage.next(&config.growth, config.batch_size)?;
            let capacity = next_stage.capacity(&config.growth).ok_or_else(|| {
                SslError::Config("growth sequence exhausted at promotion".to_string())
            })?;
            Some((
                StudentState::<B>::new(capacity, num_classes, config.schedule(), &device),
                next_stage,
            ))
        } else {
            None
        };
        ctx.promote(next)?;

        // Evaluate the promoted teacher; on the last iteration this is the
        // run's final evaluation.
        let teacher_metrics = evaluate(&ctx.teacher, &test, stage.batch_size * 2, &device)?;
        info!(
            "[iteration {}] promoted teacher: test loss={:.4} acc={:.4}",
            iteration + 1,
            teacher_metrics.loss,
            teacher_metrics.accuracy
        );
        final_test = Some(teacher_metrics);
    }

    let final_test = final_test
        .ok_or_else(|| SslError::Training("run finished without a final evaluation".to_string()))?;

    // Persist the final teacher next to the experiment log
    let checkpoint = config.outdir.join(&config.name).join("model");
    ctx.teacher
        .clone()
        .save_file(&checkpoint, &CompactRecorder::new())
        .map_err(|e| SslError::Training(format!("failed to save model: {:?}", e)))?;
    info!("Saved final teacher to {:?}", checkpoint);

    Ok(NoisyStudentOutcome {
        log,
        final_test,
        promotions: ctx.promotions(),
        students_created: ctx.students_created(),
    })
}

/// One supervised epoch over the labeled set (warmup phase).
fn train_supervised_epoch<B: AutodiffBackend>(
    state: &mut StudentState<B>,
    dataset: &CifarDataset,
    loader: &mut DataLoader,
    augmenter: &mut Augmenter,
    lr: f64,
    device: &B::Device,
) -> Result<SplitMetrics> {
    let batcher = CifarBatcher::new();
    let mut metrics = Accumulator::new();
    let mut total = 0usize;

    loader.reset();
    while let Some(indices) = loader.next_batch() {
        let items = augmented_items(dataset, &indices, augmenter);
        if items.is_empty() {
            continue;
        }
        let samples = items.len();

        let batch: CifarBatch<B> = batcher.batch(items, device);
        let output = state.model.forward(batch.images);

        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(output.clone(), batch.targets.clone());
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let predictions = output.argmax(1).squeeze::<1>(1);
        let correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &state.model);
        state.model = state.optimizer.step(lr, state.model.clone(), grads);

        metrics.add_dict(&[
            ("loss", loss_value * samples as f64),
            ("acc", correct as f64),
        ]);
        total += samples;
    }

    let averaged = metrics.divided_by(total as f64)?;
    Ok(SplitMetrics {
        loss: averaged.get("loss"),
        accuracy: averaged.get("acc"),
    })
}

/// One student epoch: every labeled batch is paired with an unlabeled batch
/// drawn cyclically; the teacher pseudo-labels the unaugmented unlabeled
/// view and the student trains on the augmented views of both streams.
#[allow(clippy::too_many_arguments)]
fn train_student_epoch<B: AutodiffBackend>(
    ctx: &mut TrainingContext<B>,
    labeled: &CifarDataset,
    unlabeled: &CifarDataset,
    labeled_loader: &mut DataLoader,
    unlabeled_loader: &mut DataLoader,
    augmenter: &mut Augmenter,
    labeler: &PseudoLabeler,
    coefficient: f64,
    lr: f64,
    device: &B::Device,
) -> Result<SplitMetrics> {
    let batcher = CifarBatcher::new();
    let num_classes = ctx.teacher.num_classes();
    let mut metrics = Accumulator::new();
    let mut total = 0usize;

    labeled_loader.reset();
    while let Some(indices) = labeled_loader.next_batch() {
        let u_indices = unlabeled_loader.next_cyclic();

        // Teacher pseudo-labels on the unaugmented unlabeled view, without
        // gradients: the teacher lives on the inner backend.
        let u_images = unlabeled.get_subset(&u_indices);
        let u_plain: Vec<CifarItem> = u_images
            .iter()
            .zip(u_indices.iter())
            .map(|(image, &index)| CifarItem::from_image(image, index))
            .collect();
        if u_plain.is_empty() {
            continue;
        }
        let plain_batch: CifarBatch<B::InnerBackend> = batcher.batch(u_plain, device);
        let teacher_probs = ctx.teacher.forward_softmax(plain_batch.images);
        let probs_data: Vec<f32> = teacher_probs
            .into_data()
            .to_vec()
            .map_err(|e| SslError::Training(format!("teacher output read failed: {:?}", e)))?;

        let distributions: Vec<Vec<f32>> =
            probs_data.chunks(num_classes).map(|c| c.to_vec()).collect();
        let pseudo = labeler.label_batch(&distributions);
        debug!(
            "pseudo-labels: {}/{} above threshold",
            pseudo.num_selected(),
            pseudo.len()
        );

        let u_count = pseudo.len();
        let teacher_probs = Tensor::<B, 2>::from_floats(
            TensorData::new(probs_data, [u_count, num_classes]),
            device,
        );
        let mask = Tensor::<B, 1>::from_floats(TensorData::new(pseudo.mask.clone(), [u_count]), device);

        // Student consumes the augmented unlabeled view
        let u_aug: Vec<CifarItem> = u_images
            .iter()
            .zip(u_indices.iter())
            .map(|(image, &index)| {
                CifarItem::from_bytes(&augmenter.weak(image), image.label, index)
            })
            .collect();
        let aug_batch: CifarBatch<B> = batcher.batch(u_aug, device);

        let student = ctx.student_mut()?;
        let u_logits = student.model.forward(aug_batch.images);
        let consistency = masked_consistency_loss(u_logits, teacher_probs, mask);

        // Supervised term on the augmented labeled batch
        let l_items = augmented_items(labeled, &indices, augmenter);
        if l_items.is_empty() {
            continue;
        }
        let samples = l_items.len();
        let l_batch: CifarBatch<B> = batcher.batch(l_items, device);
        let logits = student.model.forward(l_batch.images);

        let supervised = CrossEntropyLossConfig::new()
            .init(device)
            .forward(logits.clone(), l_batch.targets.clone());
        let loss = combine_losses(supervised, consistency, coefficient);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        let predictions = logits.argmax(1).squeeze::<1>(1);
        let correct: i64 = predictions
            .equal(l_batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &student.model);
        student.model = student.optimizer.step(lr, student.model.clone(), grads);

        metrics.add_dict(&[
            ("loss", loss_value * samples as f64),
            ("acc", correct as f64),
        ]);
        total += samples;
    }

    let averaged = metrics.divided_by(total as f64)?;
    Ok(SplitMetrics {
        loss: averaged.get("loss"),
        accuracy: averaged.get("acc"),
    })
}

/// Weakly augmented items for a labeled batch
fn augmented_items(
    dataset: &CifarDataset,
    indices: &[usize],
    augmenter: &mut Augmenter,
) -> Vec<CifarItem> {
    dataset
        .get_subset(indices)
        .into_iter()
        .zip(indices.iter())
        .map(|(image, &index)| CifarItem::from_bytes(&augmenter.weak(image), image.label, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CifarImage, IMAGE_LEN};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn synthetic_dataset(kind: DatasetKind, n: usize) -> CifarDataset {
        let classes = kind.num_classes();
        let images = (0..n)
            .map(|i| CifarImage::new(vec![(i * 29 % 256) as u8; IMAGE_LEN], i % classes))
            .collect();
        CifarDataset { images, kind }
    }

    fn tiny_config(outdir: std::path::PathBuf) -> NoisyStudentConfig {
        NoisyStudentConfig {
            dataset: DatasetKind::Cifar10,
            data_dir: PathBuf::from("unused"),
            epochs: 1,
            warmup_epochs: 1,
            iterations: 2,
            batch_size: 4,
            growth: GrowthSequence::parse("small,small,small").unwrap(),
            confidence_threshold: 0.4,
            coefficient: 1.0,
            learning_rate: 0.001,
            eval_every: 10,
            outdir,
            name: "test_run".to_string(),
            seed: 42,
        }
    }

    #[test]
    fn test_validate_rejects_short_growth() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path().to_path_buf());
        config.iterations = 3;
        assert!(matches!(config.validate(), Err(SslError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path().to_path_buf());
        config.confidence_threshold = 1.2;
        assert!(matches!(config.validate(), Err(SslError::Config(_))));
    }

    #[test]
    fn test_full_run_promotes_k_times() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path().to_path_buf());

        let labeled = synthetic_dataset(DatasetKind::Cifar10, 8);
        let unlabeled = synthetic_dataset(DatasetKind::Cifar100, 6);
        let test = synthetic_dataset(DatasetKind::Cifar10, 4);

        let outcome =
            run_with_data::<TestBackend>(config.clone(), labeled, unlabeled, test).unwrap();

        // K iterations: K swaps, K students (initial + K-1 replacements)
        assert_eq!(outcome.promotions, 2);
        assert_eq!(outcome.students_created, 2);

        // One warmup epoch + 2 iterations x 1 epoch
        assert_eq!(outcome.log.len(), 3);
        assert!(outcome.final_test.loss.is_finite());

        // The log was flushed after every epoch
        let path = exp_log::log_path(&config.outdir, &config.name);
        let persisted = ExperimentLog::load(&path).unwrap();
        assert_eq!(persisted.len(), 3);

        // The final teacher was checkpointed
        assert!(config.outdir.join("test_run/model.mpk").exists());
    }

    #[test]
    fn test_run_rejects_empty_pools() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path().to_path_buf());

        let labeled = synthetic_dataset(DatasetKind::Cifar10, 0);
        let unlabeled = synthetic_dataset(DatasetKind::Cifar100, 6);
        let test = synthetic_dataset(DatasetKind::Cifar10, 4);

        assert!(matches!(
            run_with_data::<TestBackend>(config, labeled, unlabeled, test),
            Err(SslError::Dataset(_))
        ));
    }
}
