use rand::Rng;

use super::layer::Layer;
use super::linear::{Init, Linear};
use crate::math::Matrix;

/// Attention-free read: the full image next to the current error image.
#[derive(Clone, Copy, Debug)]
pub struct Reader {
    x_dim: usize,
}

impl Reader {
    pub fn new(x_dim: usize) -> Self {
        Self { x_dim }
    }

    pub fn read_dim(&self) -> usize {
        2 * self.x_dim
    }

    pub fn apply(&self, x: &Matrix, x_hat: &Matrix) -> Matrix {
        assert_eq!(x.cols, self.x_dim);
        assert_eq!(x_hat.cols, self.x_dim);
        Matrix::concat_cols(x, x_hat)
    }

    /// Gradient with respect to `x_hat`. The image itself is data, so its half
    /// of `grad_r` is dropped.
    pub fn backward(&self, grad_r: &Matrix) -> Matrix {
        let (_, grad_x_hat) = grad_r.split_cols(self.x_dim);
        grad_x_hat
    }
}

/// Attention-free write: a linear map from decoder state to a canvas update.
pub struct Writer {
    pub linear: Linear,
}

impl Writer {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, init: Init, rng: &mut R) -> Self {
        Self {
            linear: Linear::new(input_dim, output_dim, init, rng),
        }
    }

    pub fn apply(&self, h_dec: &Matrix) -> Matrix {
        self.linear.forward(h_dec)
    }

    pub fn backward(&mut self, h_dec: &Matrix, grad_c: &Matrix) -> Matrix {
        self.linear.backward(h_dec, grad_c)
    }
}

impl Layer for Writer {
    fn parameters(&mut self) -> Vec<&mut Linear> {
        vec![&mut self.linear]
    }
}
