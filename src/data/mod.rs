pub mod dataloader;
pub mod datasets;

pub use dataloader::DataLoader;
pub use datasets::{
    check_mnist_files, BinarizedMnist, Dataset, DatasetKind, Split, MNIST_FILES, MNIST_SIDE,
    MNIST_X_DIM,
};
