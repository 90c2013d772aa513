use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::math::Matrix;

/// Parameter initialisation: isotropic Gaussian weights, constant biases.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Init {
    pub weights_std: f32,
    pub bias: f32,
}

impl Default for Init {
    fn default() -> Self {
        Self {
            weights_std: 1e-4,
            bias: 0.0,
        }
    }
}

// Affine layer `x W + b`. Unlike a layer that remembers its last input, the
// caller passes the forward input back into `backward`, so one layer can be
// applied at every unroll step and still accumulate the right gradients.
#[derive(Clone, Debug)]
pub struct Linear {
    pub w: Matrix,
    pub b: Matrix,
    grad_w: Matrix,
    grad_b: Matrix,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, init: Init, rng: &mut R) -> Self {
        let w = match Normal::new(0.0f32, init.weights_std) {
            Ok(normal) => (0..in_dim * out_dim).map(|_| normal.sample(&mut *rng)).collect(),
            Err(_) => vec![0.0; in_dim * out_dim],
        };
        Self {
            w: Matrix::from_vec(in_dim, out_dim, w),
            b: Matrix::from_vec(1, out_dim, vec![init.bias; out_dim]),
            grad_w: Matrix::zeros(in_dim, out_dim),
            grad_b: Matrix::zeros(1, out_dim),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.w.rows
    }

    pub fn out_dim(&self) -> usize {
        self.w.cols
    }

    pub fn forward(&self, x: &Matrix) -> Matrix {
        Matrix::matmul(x, &self.w).add_row(&self.b)
    }

    /// Accumulate parameter gradients for the forward input `x` and return the
    /// gradient with respect to `x`.
    pub fn backward(&mut self, x: &Matrix, grad_out: &Matrix) -> Matrix {
        self.grad_w.add_assign(&Matrix::matmul_tn(x, grad_out));
        self.grad_b.add_assign(&grad_out.sum_rows());
        Matrix::matmul_nt(grad_out, &self.w)
    }

    pub fn zero_grad(&mut self) {
        self.grad_w = Matrix::zeros(self.grad_w.rows, self.grad_w.cols);
        self.grad_b = Matrix::zeros(1, self.grad_b.cols);
    }

    pub fn grad_w(&self) -> &Matrix {
        &self.grad_w
    }

    pub fn grad_b(&self) -> &Matrix {
        &self.grad_b
    }

    /// Weight and bias paired with their accumulated gradients, in the order
    /// optimizers keep their per-slot state.
    pub fn slots_mut(&mut self) -> [(&mut Matrix, &Matrix); 2] {
        let Self {
            w,
            b,
            grad_w,
            grad_b,
        } = self;
        [(w, &*grad_w), (b, &*grad_b)]
    }

    pub fn parameters(&mut self) -> Vec<&mut Linear> {
        vec![self]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;

    fn weighted_sum(out: &Matrix, weights: &Matrix) -> f32 {
        out.data.iter().zip(&weights.data).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn bias_starts_at_constant() {
        let mut rng = rng_from_seed(1);
        let init = Init {
            weights_std: 0.1,
            bias: 0.5,
        };
        let lin = Linear::new(3, 2, init, &mut rng);
        assert_eq!(lin.b.data, vec![0.5, 0.5]);
        assert_eq!(lin.w.shape(), (3, 2));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = rng_from_seed(3);
        let init = Init {
            weights_std: 0.5,
            bias: 0.1,
        };
        let mut lin = Linear::new(3, 2, init, &mut rng);
        let x = Matrix::from_vec(2, 3, vec![0.5, -1.0, 2.0, 1.5, 0.0, -0.5]);
        // Loss = sum(out * g) so dL/dout = g.
        let g = Matrix::from_vec(2, 2, vec![1.0, -2.0, 0.5, 0.25]);
        let grad_x = lin.backward(&x, &g);

        let h = 1e-2;
        for i in 0..lin.w.data.len() {
            let mut plus = lin.clone();
            plus.w.data[i] += h;
            let mut minus = lin.clone();
            minus.w.data[i] -= h;
            let numeric = (weighted_sum(&plus.forward(&x), &g)
                - weighted_sum(&minus.forward(&x), &g))
                / (2.0 * h);
            assert!((numeric - lin.grad_w().data[i]).abs() < 1e-3);
        }
        for i in 0..x.data.len() {
            let mut plus = x.clone();
            plus.data[i] += h;
            let mut minus = x.clone();
            minus.data[i] -= h;
            let numeric = (weighted_sum(&lin.forward(&plus), &g)
                - weighted_sum(&lin.forward(&minus), &g))
                / (2.0 * h);
            assert!((numeric - grad_x.data[i]).abs() < 1e-3);
        }
        assert_eq!(lin.grad_b().data, vec![1.5, -1.75]);
    }

    #[test]
    fn zero_grad_clears_accumulators() {
        let mut rng = rng_from_seed(5);
        let mut lin = Linear::new(2, 2, Init::default(), &mut rng);
        let x = Matrix::from_vec(1, 2, vec![1.0, 1.0]);
        let g = Matrix::from_vec(1, 2, vec![1.0, 1.0]);
        lin.backward(&x, &g);
        assert!(lin.grad_w().data.iter().any(|&v| v != 0.0));
        lin.zero_grad();
        assert!(lin.grad_w().data.iter().all(|&v| v == 0.0));
        assert!(lin.grad_b().data.iter().all(|&v| v == 0.0));
    }
}
