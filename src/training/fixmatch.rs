//! FixMatch: consistency training with confidence-masked pseudo-labels
//!
//! A single model trains on both streams: labeled batches contribute a
//! supervised cross-entropy term; for unlabeled batches the model's own
//! predictions on the weak view produce hard pseudo-labels and a confidence
//! mask, and the strong view is trained toward those labels through the
//! masked cross-entropy. Pseudo-label prediction runs on the inner backend
//! so no gradients flow through the labeling pass.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{
    Augmenter, CifarBatch, CifarBatcher, CifarDataset, CifarItem, DataLoader, DatasetKind, Split,
};
use crate::exp_log::{self, EpochRecord, ExperimentLog, SplitMetrics};
use crate::model::Capacity;
use crate::training::accumulator::Accumulator;
use crate::training::context::StudentState;
use crate::training::eval::evaluate;
use crate::training::loss::{combine_losses, masked_cross_entropy};
use crate::training::pseudo_label::PseudoLabeler;
use crate::training::scheduler::LrSchedule;
use crate::utils::error::{Result, SslError};

/// Configuration for a FixMatch run
#[derive(Debug, Clone, Serialize)]
pub struct FixMatchConfig {
    /// Labeled dataset; the other CIFAR variant becomes the unlabeled pool
    pub dataset: DatasetKind,
    /// Directory holding the extracted binary datasets
    pub data_dir: PathBuf,
    /// Training epochs
    pub epochs: usize,
    /// Batch size for both streams
    pub batch_size: usize,
    /// Model capacity
    pub capacity: Capacity,
    /// Pseudo-label confidence threshold
    pub confidence_threshold: f32,
    /// Weight of the unlabeled term in the loss
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

impl FixMatchConfig {
    /// Fail fast on configurations that could only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(SslError::Config("epoch count must be positive".to_string()));
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
        Ok(())
    }

    fn schedule(&self) -> LrSchedule {
        LrSchedule::WarmupCosine {
            initial_lr: self.learning_rate,
            min_lr: self.learning_rate * 0.01,
            warmup_epochs: 5.min(self.epochs),
            total_epochs: self.epochs,
        }
    }
}

/// What a finished run hands back to the caller
#[derive(Debug)]
pub struct FixMatchOutcome {
    /// Per-epoch experiment log (also flushed to disk after every epoch)
    pub log: ExperimentLog,
    /// Final test-set evaluation
    pub final_test: SplitMetrics,
}

/// Run FixMatch training, loading datasets from disk.
pub fn run<B: AutodiffBackend>(config: FixMatchConfig) -> Result<FixMatchOutcome> {
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

/// Run FixMatch training on already-loaded datasets.
pub fn run_with_data<B: AutodiffBackend>(
    config: FixMatchConfig,
    labeled: CifarDataset,
    unlabeled: CifarDataset,
    test: CifarDataset,
) -> Result<FixMatchOutcome> {
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
        "FixMatch on {}: {} epochs at capacity {}, threshold {}",
        config.dataset, config.epochs, config.capacity, config.confidence_threshold
    );

    let mut state =
        StudentState::<B>::new(config.capacity, num_classes, config.schedule(), &device);
    let mut labeled_loader = DataLoader::new(labeled.len(), config.batch_size, true, config.seed);
    let mut unlabeled_loader =
        DataLoader::new(unlabeled.len(), config.batch_size, true, config.seed ^ 0x9e37);

    for epoch in 0..config.epochs {
        let lr = state.schedule.lr_at(epoch);
        let train = train_fixmatch_epoch(
            &mut state,
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
            "[epoch {}/{}] loss={:.4} acc={:.4} lr={:.6}",
            epoch + 1,
            config.epochs,
            train.loss,
            train.accuracy,
            lr
        );

        let mut record = EpochRecord::new(epoch, train);
        if epoch % config.eval_every == 0 && epoch != 0 {
            let test_metrics =
                evaluate(&state.model.valid(), &test, config.batch_size * 2, &device)?;
            info!(
                "[epoch {}] test loss={:.4} acc={:.4}",
                epoch, test_metrics.loss, test_metrics.accuracy
            );
            record = record.with_test(test_metrics);
        }
        log.append(record);
        log.flush(&log_path)?;
    }

    let final_test = evaluate(&state.model.valid(), &test, config.batch_size * 2, &device)?;
    info!(
        "FixMatch done: test loss={:.4} acc={:.4}",
        final_test.loss, final_test.accuracy
    );

    // Persist the final model next to the experiment log
    let checkpoint = config.outdir.join(&config.name).join("model");
    state
        .model
        .valid()
        .save_file(&checkpoint, &CompactRecorder::new())
        .map_err(|e| SslError::Training(format!("failed to save model: {:?}", e)))?;
    info!("Saved final model to {:?}", checkpoint);

    Ok(FixMatchOutcome { log, final_test })
}

/// One FixMatch epoch pairing labeled and cyclic unlabeled batches.
#[allow(clippy::too_many_arguments)]
fn train_fixmatch_epoch<B: AutodiffBackend>(
    state: &mut StudentState<B>,
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
    let num_classes = state.model.num_classes();
    let mut metrics = Accumulator::new();
    let mut total = 0usize;

    labeled_loader.reset();
    while let Some(indices) = labeled_loader.next_batch() {
        let u_indices = unlabeled_loader.next_cyclic();
        let u_images = unlabeled.get_subset(&u_indices);
        if u_images.is_empty() {
            continue;
        }

        // Pseudo-labels from the model's own predictions on the weak view,
        // no gradients through the labeling pass.
        let u_weak: Vec<CifarItem> = u_images
            .iter()
            .zip(u_indices.iter())
            .map(|(image, &index)| {
                CifarItem::from_bytes(&augmenter.weak(image), image.label, index)
            })
            .collect();
        let weak_batch: CifarBatch<B::InnerBackend> = batcher.batch(u_weak, device);
        let frozen = state.model.valid();
        let probs = frozen.forward_softmax(weak_batch.images);
        let probs_data: Vec<f32> = probs
            .into_data()
            .to_vec()
            .map_err(|e| SslError::Training(format!("pseudo-label read failed: {:?}", e)))?;

        let distributions: Vec<Vec<f32>> =
            probs_data.chunks(num_classes).map(|c| c.to_vec()).collect();
        let pseudo = labeler.label_batch(&distributions);
        debug!(
            "pseudo-labels: {}/{} above threshold",
            pseudo.num_selected(),
            pseudo.len()
        );

        let u_count = pseudo.len();
        let targets_data: Vec<i64> = pseudo.classes.iter().map(|&c| c as i64).collect();
        let pseudo_targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [u_count]), device);
        let mask =
            Tensor::<B, 1>::from_floats(TensorData::new(pseudo.mask.clone(), [u_count]), device);

        // Strong view drives the unlabeled loss
        let u_strong: Vec<CifarItem> = u_images
            .iter()
            .zip(u_indices.iter())
            .map(|(image, &index)| {
                CifarItem::from_bytes(&augmenter.strong(image), image.label, index)
            })
            .collect();
        let strong_batch: CifarBatch<B> = batcher.batch(u_strong, device);
        let strong_logits = state.model.forward(strong_batch.images);
        let unlabeled_loss = masked_cross_entropy(strong_logits, pseudo_targets, mask);

        // Supervised term on the weakly augmented labeled batch
        let l_items: Vec<CifarItem> = labeled
            .get_subset(&indices)
            .into_iter()
            .zip(indices.iter())
            .map(|(image, &index)| {
                CifarItem::from_bytes(&augmenter.weak(image), image.label, index)
            })
            .collect();
        if l_items.is_empty() {
            continue;
        }
        let samples = l_items.len();
        let l_batch: CifarBatch<B> = batcher.batch(l_items, device);
        let logits = state.model.forward(l_batch.images);

        let supervised = CrossEntropyLossConfig::new()
            .init(device)
            .forward(logits.clone(), l_batch.targets.clone());
        let loss = combine_losses(supervised, unlabeled_loss, coefficient);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        let predictions = logits.argmax(1).squeeze::<1>(1);
        let correct: i64 = predictions
            .equal(l_batch.targets)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CifarImage, IMAGE_LEN};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn synthetic_dataset(kind: DatasetKind, n: usize) -> CifarDataset {
        let classes = kind.num_classes();
        let images = (0..n)
            .map(|i| CifarImage::new(vec![(i * 31 % 256) as u8; IMAGE_LEN], i % classes))
            .collect();
        CifarDataset { images, kind }
    }

    fn tiny_config(outdir: std::path::PathBuf) -> FixMatchConfig {
        FixMatchConfig {
            dataset: DatasetKind::Cifar10,
            data_dir: PathBuf::from("unused"),
            epochs: 2,
            batch_size: 4,
            capacity: Capacity::Small,
            confidence_threshold: 0.95,
            coefficient: 1.0,
            learning_rate: 0.001,
            eval_every: 10,
            outdir,
            name: "fixmatch_test".to_string(),
            seed: 7,
        }
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path().to_path_buf());
        config.confidence_threshold = -0.5;
        assert!(matches!(config.validate(), Err(SslError::Config(_))));
    }

    #[test]
    fn test_full_run_produces_log_and_final_eval() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path().to_path_buf());

        let labeled = synthetic_dataset(DatasetKind::Cifar10, 8);
        let unlabeled = synthetic_dataset(DatasetKind::Cifar100, 6);
        let test = synthetic_dataset(DatasetKind::Cifar10, 4);

        let outcome =
            run_with_data::<TestBackend>(config.clone(), labeled, unlabeled, test).unwrap();

        assert_eq!(outcome.log.len(), 2);
        assert!(outcome.final_test.loss.is_finite());
        assert!((0.0..=1.0).contains(&outcome.final_test.accuracy));

        let path = exp_log::log_path(&config.outdir, &config.name);
        assert!(path.exists());
        assert!(config.outdir.join("fixmatch_test/model.mpk").exists());
    }
}
