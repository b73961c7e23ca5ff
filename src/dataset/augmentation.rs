//! Data augmentation for 32x32 RGB images
//!
//! Two augmentation strengths, matching the two training procedures:
//! the weak policy (random horizontal flip + random crop with reflection
//! padding) feeds standard training and the pseudo-label view; the strong
//! policy adds intensity jitter and cutout and is what the FixMatch student
//! trains on. All randomness comes from a seeded ChaCha8 stream so runs are
//! reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::cifar::{CifarImage, IMAGE_DIM, IMAGE_LEN};

/// Reflection padding used by the random crop
const CROP_PADDING: usize = 4;

/// Seeded augmenter producing weak and strong views
#[derive(Debug)]
pub struct Augmenter {
    rng: ChaCha8Rng,
}

impl Augmenter {
    /// Create an augmenter with a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Weak view: random horizontal flip + random padded crop
    pub fn weak(&mut self, image: &CifarImage) -> Vec<u8> {
        let mut data = image.data.clone();
        if self.rng.gen_bool(0.5) {
            data = horizontal_flip(&data);
        }
        let dx = self.rng.gen_range(0..=2 * CROP_PADDING);
        let dy = self.rng.gen_range(0..=2 * CROP_PADDING);
        padded_crop(&data, dx, dy)
    }

    /// Strong view: weak view + brightness/contrast jitter + cutout
    pub fn strong(&mut self, image: &CifarImage) -> Vec<u8> {
        let mut data = self.weak(image);

        let brightness = self.rng.gen_range(-0.2f32..=0.2);
        let contrast = self.rng.gen_range(0.7f32..=1.3);
        data = adjust_intensity(&data, brightness, contrast);

        let size = self.rng.gen_range(6..=14);
        let x = self.rng.gen_range(0..IMAGE_DIM);
        let y = self.rng.gen_range(0..IMAGE_DIM);
        cutout(&data, x, y, size)
    }
}

/// Mirror the image left-to-right
pub fn horizontal_flip(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; IMAGE_LEN];
    for y in 0..IMAGE_DIM {
        for x in 0..IMAGE_DIM {
            let src = (y * IMAGE_DIM + x) * 3;
            let dst = (y * IMAGE_DIM + (IMAGE_DIM - 1 - x)) * 3;
            out[dst..dst + 3].copy_from_slice(&data[src..src + 3]);
        }
    }
    out
}

/// Crop a 32x32 window at offset `(dx, dy)` out of the reflection-padded
/// image. Offsets range over `0..=2 * CROP_PADDING`; the center offset
/// reproduces the input exactly.
pub fn padded_crop(data: &[u8], dx: usize, dy: usize) -> Vec<u8> {
    let dim = IMAGE_DIM as isize;
    let pad = CROP_PADDING as isize;

    // Map a padded coordinate back into the source image by reflection
    let reflect = |p: isize| -> usize {
        let mut p = p;
        if p < 0 {
            p = -p;
        }
        if p >= dim {
            p = 2 * dim - 2 - p;
        }
        p as usize
    };

    let mut out = vec![0u8; IMAGE_LEN];
    for y in 0..IMAGE_DIM {
        for x in 0..IMAGE_DIM {
            let src_y = reflect(y as isize + dy as isize - pad);
            let src_x = reflect(x as isize + dx as isize - pad);
            let src = (src_y * IMAGE_DIM + src_x) * 3;
            let dst = (y * IMAGE_DIM + x) * 3;
            out[dst..dst + 3].copy_from_slice(&data[src..src + 3]);
        }
    }
    out
}

/// Apply brightness shift (fraction of full range) and contrast scaling
/// around the mid-point, clamping to the valid byte range.
pub fn adjust_intensity(data: &[u8], brightness: f32, contrast: f32) -> Vec<u8> {
    data.iter()
        .map(|&b| {
            let v = (b as f32 - 127.5) * contrast + 127.5 + brightness * 255.0;
            v.clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Zero out a square region centered at `(x, y)` with mid-gray. The region
/// is clipped at the image borders.
pub fn cutout(data: &[u8], x: usize, y: usize, size: usize) -> Vec<u8> {
    let half = size / 2;
    let x0 = x.saturating_sub(half);
    let y0 = y.saturating_sub(half);
    let x1 = (x + half).min(IMAGE_DIM - 1);
    let y1 = (y + half).min(IMAGE_DIM - 1);

    let mut out = data.to_vec();
    for yy in y0..=y1 {
        for xx in x0..=x1 {
            let idx = (yy * IMAGE_DIM + xx) * 3;
            out[idx..idx + 3].copy_from_slice(&[127, 127, 127]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image() -> CifarImage {
        let mut data = vec![0u8; IMAGE_LEN];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        CifarImage::new(data, 0)
    }

    #[test]
    fn test_flip_is_an_involution() {
        let img = gradient_image();
        let flipped = horizontal_flip(&img.data);
        assert_ne!(flipped, img.data);
        assert_eq!(horizontal_flip(&flipped), img.data);
    }

    #[test]
    fn test_center_crop_is_identity() {
        let img = gradient_image();
        let cropped = padded_crop(&img.data, CROP_PADDING, CROP_PADDING);
        assert_eq!(cropped, img.data);
    }

    #[test]
    fn test_crop_preserves_length() {
        let img = gradient_image();
        for (dx, dy) in [(0, 0), (8, 8), (0, 8), (3, 5)] {
            assert_eq!(padded_crop(&img.data, dx, dy).len(), IMAGE_LEN);
        }
    }

    #[test]
    fn test_intensity_clamps_to_byte_range() {
        let data = vec![250u8; IMAGE_LEN];
        let bright = adjust_intensity(&data, 0.2, 1.3);
        assert!(bright.iter().all(|&b| b == 255));

        let data = vec![5u8; IMAGE_LEN];
        let dark = adjust_intensity(&data, -0.2, 1.3);
        assert!(dark.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_identity_intensity_is_noop() {
        let img = gradient_image();
        assert_eq!(adjust_intensity(&img.data, 0.0, 1.0), img.data);
    }

    #[test]
    fn test_cutout_fills_region_with_gray() {
        let data = vec![0u8; IMAGE_LEN];
        let out = cutout(&data, 16, 16, 8);

        let center = (16 * IMAGE_DIM + 16) * 3;
        assert_eq!(&out[center..center + 3], &[127, 127, 127]);
        // Corners stay untouched
        assert_eq!(&out[0..3], &[0, 0, 0]);
    }

    #[test]
    fn test_augmenter_is_deterministic_per_seed() {
        let img = gradient_image();

        let mut a = Augmenter::new(42);
        let mut b = Augmenter::new(42);
        assert_eq!(a.weak(&img), b.weak(&img));
        assert_eq!(a.strong(&img), b.strong(&img));

        let mut c = Augmenter::new(43);
        // Different stream; at least one of the two views should differ
        let differs = a.weak(&img) != c.weak(&img) || a.strong(&img) != c.strong(&img);
        assert!(differs);
    }

    #[test]
    fn test_views_keep_image_length() {
        let img = gradient_image();
        let mut aug = Augmenter::new(7);
        assert_eq!(aug.weak(&img).len(), IMAGE_LEN);
        assert_eq!(aug.strong(&img).len(), IMAGE_LEN);
    }
}
