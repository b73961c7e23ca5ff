//! CIFAR-10 / CIFAR-100 dataset loading
//!
//! Parses the official binary distributions of both datasets. CIFAR-10
//! records are `1 label byte + 3072 pixel bytes`, CIFAR-100 records carry a
//! coarse and a fine label byte before the pixels (the fine label is used).
//! Pixels are stored channel-planar (all red, all green, all blue) and are
//! converted to interleaved RGB on load.
//!
//! The semi-supervised runs pair a labeled CIFAR variant with the *other*
//! variant as the unlabeled pool; the unlabeled pool's labels are carried
//! for diagnostics only and never trained on.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SslError};

/// Image side length; both CIFAR variants are 32x32 RGB
pub const IMAGE_DIM: usize = 32;

/// Bytes (and floats) per image: 32 * 32 * 3
pub const IMAGE_LEN: usize = IMAGE_DIM * IMAGE_DIM * 3;

/// CIFAR-10 class names
pub const CIFAR10_CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// CIFAR-100 fine-label class names (alphabetical, official order)
pub const CIFAR100_CLASSES: [&str; 100] = [
    "apple",
    "aquarium_fish",
    "baby",
    "bear",
    "beaver",
    "bed",
    "bee",
    "beetle",
    "bicycle",
    "bottle",
    "bowl",
    "boy",
    "bridge",
    "bus",
    "butterfly",
    "camel",
    "can",
    "castle",
    "caterpillar",
    "cattle",
    "chair",
    "chimpanzee",
    "clock",
    "cloud",
    "cockroach",
    "couch",
    "crab",
    "crocodile",
    "cup",
    "dinosaur",
    "dolphin",
    "elephant",
    "flatfish",
    "forest",
    "fox",
    "girl",
    "hamster",
    "house",
    "kangaroo",
    "keyboard",
    "lamp",
    "lawn_mower",
    "leopard",
    "lion",
    "lizard",
    "lobster",
    "man",
    "maple_tree",
    "motorcycle",
    "mountain",
    "mouse",
    "mushroom",
    "oak_tree",
    "orange",
    "orchid",
    "otter",
    "palm_tree",
    "pear",
    "pickup_truck",
    "pine_tree",
    "plain",
    "plate",
    "poppy",
    "porcupine",
    "possum",
    "rabbit",
    "raccoon",
    "ray",
    "road",
    "rocket",
    "rose",
    "sea",
    "seal",
    "shark",
    "shrew",
    "skunk",
    "skyscraper",
    "snail",
    "snake",
    "spider",
    "squirrel",
    "streetcar",
    "sunflower",
    "sweet_pepper",
    "table",
    "tank",
    "telephone",
    "television",
    "tiger",
    "tractor",
    "train",
    "trout",
    "tulip",
    "turtle",
    "wardrobe",
    "whale",
    "willow_tree",
    "wolf",
    "woman",
    "worm",
];

/// Which CIFAR variant a dataset holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Cifar10,
    Cifar100,
}

impl DatasetKind {
    /// Parse a dataset name from the CLI. Unknown names fail fast.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "cifar10" => Ok(Self::Cifar10),
            "cifar100" => Ok(Self::Cifar100),
            other => Err(SslError::Config(format!(
                "unknown dataset '{}', expected cifar10 or cifar100",
                other
            ))),
        }
    }

    /// Number of classes in this variant
    pub fn num_classes(&self) -> usize {
        match self {
            Self::Cifar10 => 10,
            Self::Cifar100 => 100,
        }
    }

    /// Class name for a label index
    pub fn class_name(&self, label: usize) -> Option<&'static str> {
        match self {
            Self::Cifar10 => CIFAR10_CLASSES.get(label).copied(),
            Self::Cifar100 => CIFAR100_CLASSES.get(label).copied(),
        }
    }

    /// The counterpart variant used as the unlabeled pool
    pub fn unlabeled_counterpart(&self) -> Self {
        match self {
            Self::Cifar10 => Self::Cifar100,
            Self::Cifar100 => Self::Cifar10,
        }
    }

    /// Directory the official archive extracts to
    fn extracted_dir(&self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar-10-batches-bin",
            Self::Cifar100 => "cifar-100-binary",
        }
    }

    /// Official binary archive URL
    fn archive_url(&self) -> &'static str {
        match self {
            Self::Cifar10 => "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz",
            Self::Cifar100 => "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cifar10 => write!(f, "cifar10"),
            Self::Cifar100 => write!(f, "cifar100"),
        }
    }
}

/// A single 32x32 RGB image with its label
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CifarImage {
    /// Interleaved RGB bytes (3072 values)
    pub data: Vec<u8>,
    /// Class label (fine label for CIFAR-100)
    pub label: usize,
}

impl CifarImage {
    /// Create a new image
    pub fn new(data: Vec<u8>, label: usize) -> Self {
        Self { data, label }
    }
}

/// Train or test split
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// An in-memory CIFAR dataset
#[derive(Clone, Debug)]
pub struct CifarDataset {
    /// All images in load order
    pub images: Vec<CifarImage>,
    /// Which variant this is
    pub kind: DatasetKind,
}

impl CifarDataset {
    /// Load a split of a CIFAR variant from its extracted binary directory
    /// under `data_dir`.
    pub fn load(data_dir: &Path, kind: DatasetKind, split: Split) -> Result<Self> {
        let dir = data_dir.join(kind.extracted_dir());
        if !dir.exists() {
            return Err(SslError::PathNotFound(dir));
        }

        let images = match (kind, split) {
            (DatasetKind::Cifar10, Split::Train) => {
                let mut images = Vec::new();
                for i in 1..=5 {
                    let batch = dir.join(format!("data_batch_{}.bin", i));
                    images.extend(read_cifar10_file(&batch)?);
                }
                images
            }
            (DatasetKind::Cifar10, Split::Test) => read_cifar10_file(&dir.join("test_batch.bin"))?,
            (DatasetKind::Cifar100, Split::Train) => read_cifar100_file(&dir.join("train.bin"))?,
            (DatasetKind::Cifar100, Split::Test) => read_cifar100_file(&dir.join("test.bin"))?,
        };

        Ok(Self { images, kind })
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the dataset holds no images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Get a single image by index
    pub fn get(&self, index: usize) -> Option<&CifarImage> {
        self.images.get(index)
    }

    /// Get images by indices (missing indices are skipped)
    pub fn get_subset(&self, indices: &[usize]) -> Vec<&CifarImage> {
        indices.iter().filter_map(|&i| self.images.get(i)).collect()
    }

    /// Per-class sample counts
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.kind.num_classes()];
        for img in &self.images {
            if img.label < counts.len() {
                counts[img.label] += 1;
            }
        }
        counts
    }

    /// Summary statistics for the `stats` subcommand
    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.len(),
            num_classes: self.kind.num_classes(),
            class_counts: self.class_distribution(),
        }
    }
}

/// Dataset summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
}

/// Read one CIFAR-10 binary file: records of `1 label + 3072 pixel bytes`.
/// Official files hold 10000 records each.
fn read_cifar10_file(path: &Path) -> Result<Vec<CifarImage>> {
    read_records(path, 1, |record| {
        let label = record[0] as usize;
        if label >= 10 {
            return Err(SslError::Dataset(format!(
                "CIFAR-10 label {} out of range in {:?}",
                label, path
            )));
        }
        Ok(label)
    })
}

/// Read one CIFAR-100 binary file: records of
/// `1 coarse label + 1 fine label + 3072 pixel bytes`. The fine label is kept.
fn read_cifar100_file(path: &Path) -> Result<Vec<CifarImage>> {
    read_records(path, 2, |record| {
        let label = record[1] as usize;
        if label >= 100 {
            return Err(SslError::Dataset(format!(
                "CIFAR-100 fine label {} out of range in {:?}",
                label, path
            )));
        }
        Ok(label)
    })
}

/// Shared record parser. `header_len` is the number of label bytes preceding
/// the channel-planar pixel data; `read_label` extracts the label to keep.
fn read_records(
    path: &Path,
    header_len: usize,
    read_label: impl Fn(&[u8]) -> Result<usize>,
) -> Result<Vec<CifarImage>> {
    let mut file =
        File::open(path).map_err(|e| SslError::Dataset(format!("cannot open {:?}: {}", path, e)))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let record_size = header_len + IMAGE_LEN;
    if buffer.is_empty() || buffer.len() % record_size != 0 {
        return Err(SslError::Dataset(format!(
            "invalid file size {} for {:?}: not a multiple of record size {}",
            buffer.len(),
            path,
            record_size
        )));
    }

    let num_images = buffer.len() / record_size;
    let mut images = Vec::with_capacity(num_images);
    let plane = IMAGE_DIM * IMAGE_DIM;

    for i in 0..num_images {
        let record = &buffer[i * record_size..(i + 1) * record_size];
        let label = read_label(record)?;
        let pixels = &record[header_len..];

        // Channel-planar (R..R G..G B..B) to interleaved RGB
        let mut data = vec![0u8; IMAGE_LEN];
        for j in 0..plane {
            data[j * 3] = pixels[j];
            data[j * 3 + 1] = pixels[plane + j];
            data[j * 3 + 2] = pixels[2 * plane + j];
        }

        images.push(CifarImage::new(data, label));
    }

    Ok(images)
}

/// Download and extract the official binary archive for a CIFAR variant,
/// skipping any step whose output already exists.
pub fn download_dataset(kind: DatasetKind, data_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(data_dir)?;

    let url = kind.archive_url();
    let archive_name = url.rsplit('/').next().unwrap_or("cifar.tar.gz");
    let archive_path = data_dir.join(archive_name);

    if archive_path.exists() {
        tracing::info!("{} archive already present, skipping download", kind);
    } else {
        tracing::info!("Downloading {} from {}", kind, url);
        let response = reqwest::blocking::get(url)
            .map_err(|e| SslError::Download(format!("request failed: {}", e)))?;
        let bytes = response
            .bytes()
            .map_err(|e| SslError::Download(format!("reading response failed: {}", e)))?;

        let mut file = File::create(&archive_path)?;
        file.write_all(&bytes)?;
        tracing::info!("Download complete ({} bytes)", bytes.len());
    }

    let extracted = data_dir.join(kind.extracted_dir());
    if extracted.exists() {
        tracing::info!("{} already extracted", kind);
    } else {
        tracing::info!("Extracting {:?}", archive_path);
        let archive = File::open(&archive_path)?;
        let decompressor = flate2::read::GzDecoder::new(archive);
        let mut tar = tar::Archive::new(decompressor);
        tar.unpack(data_dir)
            .map_err(|e| SslError::Download(format!("extraction failed: {}", e)))?;
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a synthetic CIFAR-10 file with the given labels; pixel j of
    /// image i is `i as u8` in every channel.
    fn write_cifar10_file(path: &Path, labels: &[u8]) {
        let mut buffer = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            buffer.push(label);
            buffer.extend(std::iter::repeat(i as u8).take(IMAGE_LEN));
        }
        std::fs::write(path, buffer).unwrap();
    }

    fn write_cifar100_file(path: &Path, fine_labels: &[u8]) {
        let mut buffer = Vec::new();
        for &fine in fine_labels {
            buffer.push(0); // coarse label, ignored
            buffer.push(fine);
            buffer.extend(std::iter::repeat(7u8).take(IMAGE_LEN));
        }
        std::fs::write(path, buffer).unwrap();
    }

    #[test]
    fn test_dataset_kind_parse() {
        assert_eq!(DatasetKind::parse("cifar10").unwrap(), DatasetKind::Cifar10);
        assert_eq!(
            DatasetKind::parse("CIFAR100").unwrap(),
            DatasetKind::Cifar100
        );
        assert!(matches!(
            DatasetKind::parse("imagenet"),
            Err(SslError::Config(_))
        ));
    }

    #[test]
    fn test_unlabeled_counterpart_is_the_other_variant() {
        assert_eq!(
            DatasetKind::Cifar10.unlabeled_counterpart(),
            DatasetKind::Cifar100
        );
        assert_eq!(
            DatasetKind::Cifar100.unlabeled_counterpart(),
            DatasetKind::Cifar10
        );
    }

    #[test]
    fn test_class_names() {
        assert_eq!(DatasetKind::Cifar10.class_name(0), Some("airplane"));
        assert_eq!(DatasetKind::Cifar10.class_name(9), Some("truck"));
        assert_eq!(DatasetKind::Cifar10.class_name(10), None);
        assert_eq!(DatasetKind::Cifar100.class_name(0), Some("apple"));
        assert_eq!(DatasetKind::Cifar100.class_name(99), Some("worm"));
        assert_eq!(CIFAR100_CLASSES.len(), 100);
    }

    #[test]
    fn test_read_cifar10_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_batch.bin");
        write_cifar10_file(&path, &[3, 7]);

        let images = read_cifar10_file(&path).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].label, 3);
        assert_eq!(images[1].label, 7);
        // Planar to interleaved conversion preserves per-image constant fill
        assert!(images[1].data.iter().all(|&b| b == 1));
        assert_eq!(images[0].data.len(), IMAGE_LEN);
    }

    #[test]
    fn test_read_cifar100_keeps_fine_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.bin");
        write_cifar100_file(&path, &[42, 99]);

        let images = read_cifar100_file(&path).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].label, 42);
        assert_eq!(images[1].label, 99);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        assert!(matches!(
            read_cifar10_file(&path),
            Err(SslError::Dataset(_))
        ));
    }

    #[test]
    fn test_out_of_range_label_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_label.bin");
        write_cifar10_file(&path, &[11]);

        assert!(matches!(
            read_cifar10_file(&path),
            Err(SslError::Dataset(_))
        ));
    }

    #[test]
    fn test_load_cifar10_test_split() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = dir.path().join("cifar-10-batches-bin");
        std::fs::create_dir_all(&extracted).unwrap();
        write_cifar10_file(&extracted.join("test_batch.bin"), &[0, 1, 1]);

        let dataset = CifarDataset::load(dir.path(), DatasetKind::Cifar10, Split::Test).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.class_distribution()[1], 2);

        let stats = dataset.stats();
        assert_eq!(stats.total_samples, 3);
        assert_eq!(stats.num_classes, 10);
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = CifarDataset::load(dir.path(), DatasetKind::Cifar10, Split::Train);
        assert!(matches!(result, Err(SslError::PathNotFound(_))));
    }

    #[test]
    fn test_get_subset_skips_out_of_range() {
        let images = vec![
            CifarImage::new(vec![0; IMAGE_LEN], 0),
            CifarImage::new(vec![0; IMAGE_LEN], 1),
        ];
        let dataset = CifarDataset {
            images,
            kind: DatasetKind::Cifar10,
        };

        let subset = dataset.get_subset(&[1, 5]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].label, 1);
    }
}
