//! DRAW: a recurrent variational autoencoder that builds an image on a
//! canvas over a fixed number of steps, trained on binarized MNIST.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod logging;
pub mod math;
pub mod models;
pub mod optim;
pub mod rng;
pub mod train;
pub mod util;
pub mod weights;

pub use error::{DrawError, Result};
