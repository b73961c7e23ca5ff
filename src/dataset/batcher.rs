//! Batching CIFAR items into Burn tensors
//!
//! Items carry a single prepared view (raw, weak, or strong) as CHW floats
//! in [0, 1] together with the label and the dataset index. The batcher
//! stacks item vectors into `[batch, 3, 32, 32]` tensors and applies the
//! CIFAR channel normalization on the target device.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use super::cifar::{CifarImage, IMAGE_DIM, IMAGE_LEN};

/// CIFAR channel means
pub const CIFAR_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];

/// CIFAR channel standard deviations
pub const CIFAR_STD: [f32; 3] = [0.2470, 0.2435, 0.2616];

/// One prepared image view, ready for batching
#[derive(Clone, Debug)]
pub struct CifarItem {
    /// CHW float pixels in [0, 1]
    pub pixels: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Index into the source dataset
    pub index: usize,
}

impl CifarItem {
    /// Build an item from interleaved RGB bytes (a raw or augmented view)
    pub fn from_bytes(data: &[u8], label: usize, index: usize) -> Self {
        debug_assert_eq!(data.len(), IMAGE_LEN);

        let plane = IMAGE_DIM * IMAGE_DIM;
        let mut pixels = vec![0.0f32; IMAGE_LEN];
        for j in 0..plane {
            pixels[j] = data[j * 3] as f32 / 255.0;
            pixels[plane + j] = data[j * 3 + 1] as f32 / 255.0;
            pixels[2 * plane + j] = data[j * 3 + 2] as f32 / 255.0;
        }

        Self {
            pixels,
            label,
            index,
        }
    }

    /// Build an item from an unaugmented dataset image
    pub fn from_image(image: &CifarImage, index: usize) -> Self {
        Self::from_bytes(&image.data, image.label, index)
    }
}

/// A batch of CIFAR images for training or evaluation
#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Images with shape `[batch, 3, 32, 32]`, channel-normalized
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking items into normalized tensors
#[derive(Clone, Debug, Default)]
pub struct CifarBatcher {}

impl CifarBatcher {
    /// Create a new batcher
    pub fn new() -> Self {
        Self {}
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.pixels.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, IMAGE_DIM, IMAGE_DIM]),
            device,
        );

        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(CIFAR_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(CIFAR_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CifarBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    type TestBackend = burn::backend::NdArray;

    fn solid_image(value: u8, label: usize) -> CifarImage {
        CifarImage::new(vec![value; IMAGE_LEN], label)
    }

    #[test]
    fn test_item_from_bytes_converts_to_chw() {
        // One red pixel at position 0, rest black
        let mut data = vec![0u8; IMAGE_LEN];
        data[0] = 255;

        let item = CifarItem::from_bytes(&data, 3, 17);
        assert_eq!(item.label, 3);
        assert_eq!(item.index, 17);
        assert_relative_eq!(item.pixels[0], 1.0); // R plane
        assert_relative_eq!(item.pixels[IMAGE_DIM * IMAGE_DIM], 0.0); // G plane
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = CifarBatcher::new();

        let items: Vec<CifarItem> = (0..4)
            .map(|i| CifarItem::from_image(&solid_image(128, i), i))
            .collect();

        let batch: CifarBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [4, 3, IMAGE_DIM, IMAGE_DIM]);
        assert_eq!(batch.targets.dims(), [4]);
    }

    #[test]
    fn test_batch_applies_channel_normalization() {
        let device = Default::default();
        let batcher = CifarBatcher::new();

        let items = vec![CifarItem::from_image(&solid_image(255, 0), 0)];
        let batch: CifarBatch<TestBackend> = batcher.batch(items, &device);

        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        // First value sits in the red plane: (1.0 - mean_r) / std_r
        let expected = (1.0 - CIFAR_MEAN[0]) / CIFAR_STD[0];
        assert_relative_eq!(values[0], expected, epsilon = 1e-5);
    }

    #[test]
    fn test_batch_targets_preserve_labels() {
        let device = Default::default();
        let batcher = CifarBatcher::new();

        let items = vec![
            CifarItem::from_image(&solid_image(0, 2), 0),
            CifarItem::from_image(&solid_image(0, 9), 1),
        ];
        let batch: CifarBatch<TestBackend> = batcher.batch(items, &device);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![2, 9]);
    }
}
