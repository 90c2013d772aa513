use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::layer::Layer;
use super::linear::{Init, Linear};
use crate::math::Matrix;

/// Cached values of one reparameterised draw.
#[derive(Clone, Debug)]
pub struct Sample {
    pub mean: Matrix,
    pub log_sigma: Matrix,
    pub sigma: Matrix,
    pub eps: Matrix,
    pub z: Matrix,
}

/// Diagonal Gaussian posterior `q(z | h_enc)` sampled with the
/// reparameterisation `z = mean + exp(log_sigma) * eps`.
pub struct QSampler {
    pub mean: Linear,
    pub log_sigma: Linear,
}

impl QSampler {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, init: Init, rng: &mut R) -> Self {
        Self {
            mean: Linear::new(input_dim, output_dim, init, rng),
            log_sigma: Linear::new(input_dim, output_dim, init, rng),
        }
    }

    pub fn z_dim(&self) -> usize {
        self.mean.out_dim()
    }

    pub fn apply<R: Rng + ?Sized>(&self, h_enc: &Matrix, rng: &mut R) -> Sample {
        let mean = self.mean.forward(h_enc);
        let log_sigma = self.log_sigma.forward(h_enc);
        let eps = standard_normal(mean.rows, mean.cols, rng);
        let sigma = log_sigma.map(f32::exp);
        let z = mean.add(&sigma.hadamard(&eps));
        Sample {
            mean,
            log_sigma,
            sigma,
            eps,
            z,
        }
    }

    /// Draw from the `N(0, I)` prior.
    pub fn sample_prior<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Matrix {
        standard_normal(n, self.z_dim(), rng)
    }

    /// Backward through the sampler. `grad_mean` and `grad_log_sigma` carry
    /// any direct terms (the KL gradients); the path through `z` is added
    /// here. Returns the gradient with respect to `h_enc`.
    pub fn backward(
        &mut self,
        h_enc: &Matrix,
        sample: &Sample,
        grad_z: &Matrix,
        grad_mean: &Matrix,
        grad_log_sigma: &Matrix,
    ) -> Matrix {
        let d_mean = grad_z.add(grad_mean);
        let d_log_sigma = grad_z
            .hadamard(&sample.eps)
            .hadamard(&sample.sigma)
            .add(grad_log_sigma);
        let from_mean = self.mean.backward(h_enc, &d_mean);
        let from_log_sigma = self.log_sigma.backward(h_enc, &d_log_sigma);
        from_mean.add(&from_log_sigma)
    }
}

impl Layer for QSampler {
    fn parameters(&mut self) -> Vec<&mut Linear> {
        vec![&mut self.mean, &mut self.log_sigma]
    }
}

fn standard_normal<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Matrix {
    let data = (0..rows * cols)
        .map(|_| StandardNormal.sample(&mut *rng))
        .collect();
    Matrix::from_vec(rows, cols, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;

    #[test]
    fn sample_follows_reparameterisation() {
        let mut rng = rng_from_seed(2);
        let init = Init {
            weights_std: 0.3,
            bias: 0.0,
        };
        let q = QSampler::new(4, 3, init, &mut rng);
        let h = Matrix::from_vec(2, 4, vec![0.1, 0.2, -0.3, 0.4, 0.0, 1.0, -1.0, 0.5]);
        let s = q.apply(&h, &mut rng);
        assert_eq!(s.z.shape(), (2, 3));
        for i in 0..s.z.data.len() {
            let expected = s.mean.data[i] + s.log_sigma.data[i].exp() * s.eps.data[i];
            assert!((s.z.data[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn prior_draw_has_latent_width() {
        let mut rng = rng_from_seed(4);
        let q = QSampler::new(4, 5, Init::default(), &mut rng);
        assert_eq!(q.sample_prior(3, &mut rng).shape(), (3, 5));
    }
}
