//! Held-out evaluation
//!
//! Runs a model over a test split without augmentation and reports average
//! cross-entropy loss and accuracy through the same metric accumulator the
//! training loops use. Callers pass a non-autodiff model; evaluation never
//! touches gradients.

use burn::data::dataloader::batcher::Batcher;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;

use crate::dataset::{CifarBatcher, CifarDataset, CifarItem, DataLoader};
use crate::exp_log::SplitMetrics;
use crate::model::Classifier;
use crate::training::accumulator::Accumulator;
use crate::utils::error::{Result, SslError};

/// Evaluate `model` on every sample of `dataset`.
pub fn evaluate<B: Backend>(
    model: &Classifier<B>,
    dataset: &CifarDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<SplitMetrics> {
    if dataset.is_empty() {
        return Err(SslError::Dataset(
            "cannot evaluate on an empty dataset".to_string(),
        ));
    }

    let batcher = CifarBatcher::new();
    let mut loader = DataLoader::new(dataset.len(), batch_size, false, 0);
    let mut metrics = Accumulator::new();
    let mut total = 0usize;

    while let Some(indices) = loader.next_batch() {
        let items: Vec<CifarItem> = dataset
            .get_subset(&indices)
            .into_iter()
            .zip(indices.iter())
            .map(|(image, &index)| CifarItem::from_image(image, index))
            .collect();
        if items.is_empty() {
            continue;
        }
        let samples = items.len();

        let batch = batcher.batch(items, device);
        let output = model.forward(batch.images);

        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(output.clone(), batch.targets.clone());
        let loss_value: f64 = loss.into_scalar().elem();

        let predictions = output.argmax(1).squeeze::<1>(1);
        let correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

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
