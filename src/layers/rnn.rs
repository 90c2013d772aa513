use rand::Rng;

use super::layer::Layer;
use super::linear::{Init, Linear};
use super::tanh;
use crate::math::Matrix;

/// Simple tanh recurrent state updater: `h' = tanh(x W + h U + b)`.
///
/// The cell is stateless between calls; the unrolling model owns the states
/// and hands them back to [`Recurrent::backward`].
pub struct Recurrent {
    pub input: Linear,
    /// State-to-state projection. Both projections carry a bias; only their
    /// sum affects the output.
    pub hidden: Linear,
    name: String,
}

impl Recurrent {
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        input_dim: usize,
        state_dim: usize,
        init: Init,
        rng: &mut R,
    ) -> Self {
        Self {
            input: Linear::new(input_dim, state_dim, init, rng),
            hidden: Linear::new(state_dim, state_dim, init, rng),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dim(&self) -> usize {
        self.input.in_dim()
    }

    pub fn state_dim(&self) -> usize {
        self.hidden.out_dim()
    }

    /// One state update.
    pub fn forward(&self, x: &Matrix, h_prev: &Matrix) -> Matrix {
        let mut h = self.input.forward(x).add(&self.hidden.forward(h_prev));
        tanh::forward_matrix(&mut h);
        h
    }

    /// Backward through one update given the forward inputs `x`, `h_prev` and
    /// the produced state `h`. Returns `(dx, dh_prev)`.
    pub fn backward(
        &mut self,
        x: &Matrix,
        h_prev: &Matrix,
        h: &Matrix,
        dh: &Matrix,
    ) -> (Matrix, Matrix) {
        let mut da = dh.clone();
        tanh::backward(&mut da, h);
        let dx = self.input.backward(x, &da);
        let dh_prev = self.hidden.backward(h_prev, &da);
        (dx, dh_prev)
    }
}

impl Layer for Recurrent {
    fn parameters(&mut self) -> Vec<&mut Linear> {
        vec![&mut self.input, &mut self.hidden]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;

    fn objective(cell: &Recurrent, x: &Matrix, h_prev: &Matrix, g: &Matrix) -> f32 {
        let h = cell.forward(x, h_prev);
        h.data.iter().zip(&g.data).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn state_has_expected_width() {
        let mut rng = rng_from_seed(0);
        let cell = Recurrent::new("enc", 4, 3, Init::default(), &mut rng);
        let h = cell.forward(&Matrix::zeros(2, 4), &Matrix::zeros(2, 3));
        assert_eq!(h.shape(), (2, 3));
        assert_eq!(cell.name(), "enc");
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = rng_from_seed(11);
        let init = Init {
            weights_std: 0.4,
            bias: 0.0,
        };
        let mut cell = Recurrent::new("dec", 3, 2, init, &mut rng);
        let x = Matrix::from_vec(2, 3, vec![0.3, -0.2, 0.9, -1.0, 0.4, 0.1]);
        let h_prev = Matrix::from_vec(2, 2, vec![0.2, -0.6, 0.5, 0.05]);
        let g = Matrix::from_vec(2, 2, vec![1.0, -0.5, 0.25, 2.0]);

        let h = cell.forward(&x, &h_prev);
        let (dx, dh_prev) = cell.backward(&x, &h_prev, &h, &g);

        let eps = 1e-2;
        for i in 0..x.data.len() {
            let mut p = x.clone();
            p.data[i] += eps;
            let mut m = x.clone();
            m.data[i] -= eps;
            let numeric =
                (objective(&cell, &p, &h_prev, &g) - objective(&cell, &m, &h_prev, &g)) / (2.0 * eps);
            assert!((numeric - dx.data[i]).abs() < 1e-3);
        }
        for i in 0..h_prev.data.len() {
            let mut p = h_prev.clone();
            p.data[i] += eps;
            let mut m = h_prev.clone();
            m.data[i] -= eps;
            let numeric = (objective(&cell, &x, &p, &g) - objective(&cell, &x, &m, &g)) / (2.0 * eps);
            assert!((numeric - dh_prev.data[i]).abs() < 1e-3);
        }
        for i in 0..cell.hidden.w.data.len() {
            let w = cell.hidden.w.data[i];
            cell.hidden.w.data[i] = w + eps;
            let lp = objective(&cell, &x, &h_prev, &g);
            cell.hidden.w.data[i] = w - eps;
            let lm = objective(&cell, &x, &h_prev, &g);
            cell.hidden.w.data[i] = w;
            let numeric = (lp - lm) / (2.0 * eps);
            assert!((numeric - cell.hidden.grad_w().data[i]).abs() < 1e-3);
        }
    }
}
