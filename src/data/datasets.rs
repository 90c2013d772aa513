use std::path::Path;

use mnist::{Mnist, MnistBuilder};

use crate::error::{DrawError, Result};

pub const MNIST_SIDE: usize = 28;
pub const MNIST_X_DIM: usize = MNIST_SIDE * MNIST_SIDE;

const MNIST_TRAIN_LEN: u32 = 60_000;
const MNIST_TEST_LEN: u32 = 10_000;

/// Uncompressed idx files read from the data directory.
pub const MNIST_FILES: [&str; 4] = [
    "train-images-idx3-ubyte",
    "train-labels-idx1-ubyte",
    "t10k-images-idx3-ubyte",
    "t10k-labels-idx1-ubyte",
];

/// Fail with the list of idx files missing under `root`. The reader in the
/// `mnist` crate panics on a missing file, so this runs first.
pub fn check_mnist_files(root: &Path) -> Result<()> {
    let missing: Vec<&str> = MNIST_FILES
        .iter()
        .copied()
        .filter(|name| !root.join(name).is_file())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(DrawError::Dataset(format!(
        "missing MNIST files in {}: {} (download the gzipped idx files from \
         http://yann.lecun.com/exdb/mnist/ and gunzip them there)",
        root.display(),
        missing.join(", ")
    )))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// Trait describing a dataset that can be loaded entirely into memory.
pub trait Dataset {
    /// Type representing a single sample from the dataset.
    type Item: Clone;

    /// Load all samples of `split` from the directory `root`.
    fn load(split: Split, root: &Path) -> Result<Vec<Self::Item>>;
}

/// MNIST digits with every pixel thresholded to `0.0` or `1.0`.
pub struct BinarizedMnist;

impl BinarizedMnist {
    /// Map 8-bit intensities to `{0, 1}`: on when at least half bright.
    pub fn binarize(pixels: &[u8]) -> Vec<f32> {
        pixels
            .iter()
            .map(|&p| if p as f32 / 255.0 >= 0.5 { 1.0 } else { 0.0 })
            .collect()
    }
}

impl Dataset for BinarizedMnist {
    type Item = Vec<f32>;

    fn load(split: Split, root: &Path) -> Result<Vec<Self::Item>> {
        let base = root
            .to_str()
            .ok_or_else(|| DrawError::Dataset(format!("non UTF-8 data path {}", root.display())))?;
        let base = format!("{}/", base.trim_end_matches('/'));
        check_mnist_files(root)?;
        log::info!("loading MNIST {split:?} split from {base}");
        let Mnist {
            trn_img, tst_img, ..
        } = MnistBuilder::new()
            .label_format_digit()
            .base_path(&base)
            .training_set_length(MNIST_TRAIN_LEN)
            .validation_set_length(0)
            .test_set_length(MNIST_TEST_LEN)
            .finalize();
        let (images, expected) = match split {
            Split::Train => (trn_img, MNIST_TRAIN_LEN as usize),
            Split::Test => (tst_img, MNIST_TEST_LEN as usize),
        };
        if images.len() != expected * MNIST_X_DIM {
            return Err(DrawError::Dataset(format!(
                "expected {expected} images of {MNIST_X_DIM} pixels, got {} bytes",
                images.len()
            )));
        }
        Ok(images.chunks(MNIST_X_DIM).map(Self::binarize).collect())
    }
}

/// Available datasets supported by the crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DatasetKind {
    /// Binarized MNIST handwritten digits.
    Mnist,
}

impl DatasetKind {
    pub fn x_dim(self) -> usize {
        match self {
            DatasetKind::Mnist => MNIST_X_DIM,
        }
    }

    pub fn load(self, split: Split, root: &Path) -> Result<Vec<Vec<f32>>> {
        match self {
            DatasetKind::Mnist => BinarizedMnist::load(split, root),
        }
    }
}
